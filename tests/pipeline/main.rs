#[path = "../support/mod.rs"]
mod support;

mod mock_pipeline;
mod queue_publisher;
mod runner;
