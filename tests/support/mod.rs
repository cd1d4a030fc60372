#![allow(dead_code)]

pub mod helpers;
pub mod mock_queue;
pub mod mock_rpc;
