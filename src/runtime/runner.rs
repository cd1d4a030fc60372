use crate::checkpoint::{CheckpointStore, Checkpoints, JsonFileCheckpointStore};
use crate::publisher::{DiscardPublisher, HttpQueuePublisher, QueuePublisher};
use crate::rpc::{ConnectionHandle, SignatureSource};
use crate::runtime::config::IndexerConfig;
use crate::runtime::fatal::FatalErrorHandler;
use crate::runtime::orchestrator::ModeOrchestrator;
use crate::runtime::refresher::ConnectionRefresher;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::runtime::watchdog::LivenessWatchdog;
use crate::walker::SignatureWalker;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Owns the indexer's collaborators and drives the orchestrator alongside
/// the watchdog, connection refresher and metrics reporter.
pub struct Runner {
    config: IndexerConfig,
    source: Arc<dyn SignatureSource>,
    connection: Option<Arc<ConnectionHandle>>,
    checkpoints: Checkpoints,
    publisher: Arc<dyn QueuePublisher>,
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
}

impl Runner {
    /// Builds every collaborator from `config`: a JSON file checkpoint store,
    /// an HTTP queue publisher (or a discarding one in debug mode) and a
    /// refreshable RPC connection.
    pub fn from_config(config: IndexerConfig) -> Result<Self> {
        let telemetry = Arc::new(Telemetry::default());
        let store = Arc::new(JsonFileCheckpointStore::new(
            config.checkpoint_path().clone(),
            config.network(),
        ));
        let publisher: Arc<dyn QueuePublisher> = match (config.debug_mode(), config.queue_url()) {
            (false, Some(queue_url)) => {
                Arc::new(HttpQueuePublisher::new(queue_url, telemetry.clone())?)
            }
            _ => Arc::new(DiscardPublisher),
        };
        Self::new(config, store, publisher, telemetry)
    }

    /// Connects to the configured RPC endpoints; the connection is refreshed
    /// on the configured interval while running.
    pub fn new(
        config: IndexerConfig,
        store: Arc<dyn CheckpointStore>,
        publisher: Arc<dyn QueuePublisher>,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self> {
        let connection = Arc::new(
            ConnectionHandle::connect(config.rpc_endpoints(), config.rpc_options())
                .context("failed to connect RPC client")?,
        );
        let mut runner = Self::with_source(
            config,
            connection.clone(),
            store,
            publisher,
            telemetry,
        );
        runner.connection = Some(connection);
        Ok(runner)
    }

    /// Uses `source` directly; no connection refresher is started.
    pub fn with_source(
        config: IndexerConfig,
        source: Arc<dyn SignatureSource>,
        store: Arc<dyn CheckpointStore>,
        publisher: Arc<dyn QueuePublisher>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            config,
            source,
            connection: None,
            checkpoints: Checkpoints::new(store, telemetry.clone()),
            publisher,
            telemetry,
            shutdown: CancellationToken::new(),
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    pub fn checkpoints(&self) -> &Checkpoints {
        &self.checkpoints
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn connection(&self) -> Option<Arc<ConnectionHandle>> {
        self.connection.clone()
    }

    /// Runs until the root token is cancelled or a fatal error occurs. The
    /// first fatal error (stall, persistent checkpoint failure, exhausted
    /// RPC retries) is returned.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            address = %self.config.program_address(),
            network = %self.config.network(),
            debug_mode = self.config.debug_mode(),
            frontfill_only = self.config.frontfill_only(),
            "starting signature indexer"
        );

        if self.config.reset_checkpoints() {
            tracing::warn!("resetting backfill and frontfill checkpoints");
            self.checkpoints.reset().await?;
        }

        let run = self.shutdown.child_token();
        let fatal = FatalErrorHandler::new(self.shutdown.clone(), run.clone());
        let tasks = self.spawn_background(&fatal, &run);

        let walker = SignatureWalker::new(
            self.source.clone(),
            self.checkpoints.clone(),
            self.publisher.clone(),
            self.telemetry.clone(),
            self.config.walker_settings(),
        );
        let mut orchestrator = ModeOrchestrator::new(walker)
            .with_frontfill_only(self.config.frontfill_only())
            .with_poll_interval(self.config.poll_interval())
            .with_cancellation(run.clone());

        if let Err(err) = orchestrator.run().await {
            fatal.trigger_external("orchestrator", err);
        }

        run.cancel();
        for task in tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "background task ended abnormally");
            }
        }

        match fatal.error() {
            Some(err) => Err(err),
            None => {
                tracing::info!("signature indexer stopped");
                Ok(())
            }
        }
    }

    /// Runs until a Ctrl-C (SIGINT) is received, the shutdown token is
    /// cancelled elsewhere, or a fatal error stops the run.
    pub async fn run_until_ctrl_c(&self) -> Result<()> {
        let shutdown = self.shutdown.clone();
        let signals = tokio::spawn(async move {
            tokio::select! {
                result = signal::ctrl_c() => match result {
                    Ok(()) => {
                        tracing::info!("Ctrl-C received; shutting down runner");
                        shutdown.cancel();
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "unable to listen for Ctrl-C");
                    }
                },
                _ = shutdown.cancelled() => {}
            }
        });

        let result = self.run().await;
        signals.abort();
        result
    }

    fn spawn_background(
        &self,
        fatal: &FatalErrorHandler,
        run: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let mut tasks = vec![
            spawn_metrics_reporter(
                self.telemetry.clone(),
                run.clone(),
                self.config.metrics_interval(),
            ),
            LivenessWatchdog::new(self.checkpoints.clone(), self.config.watchdog_interval())
                .spawn(fatal.clone(), run.clone()),
        ];

        if let Some(connection) = &self.connection {
            tasks.push(
                ConnectionRefresher::new(
                    connection.clone(),
                    self.telemetry.clone(),
                    self.config.refresh_interval(),
                )
                .spawn(run.clone()),
            );
        }

        tasks
    }
}
