pub mod checkpoint;
pub mod publisher;
pub mod rpc;
pub mod runtime;
pub mod walker;

#[cfg(test)]
pub(crate) mod test_support;

pub use checkpoint::{
    BackfillCheckpoint, CheckpointSnapshot, CheckpointStore, Checkpoints, FrontfillCheckpoint,
    JsonFileCheckpointStore, MemoryCheckpointStore,
};
pub use publisher::{DiscardPublisher, HttpQueuePublisher, QueuePublisher, SignatureBatch};
pub use rpc::{ConnectionHandle, PageRequest, RpcError, SignatureRpcClient, SignatureSource};
pub use runtime::config::{IndexerConfig, IndexerConfigBuilder, IndexerConfigParams};
pub use runtime::fatal::IndexerError;
pub use runtime::orchestrator::{Iteration, ModeOrchestrator};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use runtime::watchdog::{LivenessWatchdog, Observation};
pub use walker::{
    ConfirmedSignature, Cursor, SignatureRecord, SignatureWalker, WalkBounds, WalkMode,
    WalkOutcome, WalkerSettings,
};
