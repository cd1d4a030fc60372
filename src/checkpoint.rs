//! Durable walk progress: the backfill and frontfill records, the storage
//! seam, and the write policies the walker relies on.

pub mod file;
pub mod memory;
pub(crate) mod retry;
pub mod store;
pub mod types;

pub use file::JsonFileCheckpointStore;
pub use memory::{CheckpointWrite, MemoryCheckpointStore};
pub use store::{CheckpointStore, Checkpoints};
pub use types::{
    BackfillCheckpoint, CheckpointKey, CheckpointSnapshot, FrontfillCheckpoint,
};
