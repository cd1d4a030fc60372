//! Runtime glue: configuration, the mode orchestrator, the watchdog and
//! connection refresher tasks, fatal-error capture, telemetry, and the runner
//! that wires them together.

pub mod config;
pub mod fatal;
pub mod orchestrator;
pub mod refresher;
pub mod runner;
pub mod telemetry;
pub mod watchdog;
