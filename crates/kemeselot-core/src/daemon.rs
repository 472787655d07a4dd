use crate::{
    bridge::{Bridge, BridgeParts},
    config::{socket_path, MonitorConfig},
    ipc::{listen, DaemonIpcHandler},
    supervisor::RestoreReason,
};
use anyhow::Result;
use kemeselot_storage::Database;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};

/// Background host: IPC listener, monitor restore and watchdog
pub struct Daemon {
    bridge: Arc<Bridge>,
    shutdown_signal: Arc<Notify>,
    config: MonitorConfig,
    reason: RestoreReason,
}

impl Daemon {
    /// Build the daemon for the current host. Must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform adapters cannot be created
    pub fn new(db: Database, config: MonitorConfig, reason: RestoreReason) -> Result<Self> {
        let database = Arc::new(db);
        let parts = BridgeParts::for_host(&database)?;
        Ok(Self::with_parts(database, parts, config, reason))
    }

    #[must_use]
    pub fn with_parts(
        database: Arc<Database>,
        parts: BridgeParts,
        config: MonitorConfig,
        reason: RestoreReason,
    ) -> Self {
        Self {
            bridge: Arc::new(Bridge::new(database, parts, config)),
            shutdown_signal: Arc::new(Notify::new()),
            config,
            reason,
        }
    }

    /// Serve until Ctrl-C or an IPC shutdown request
    ///
    /// # Errors
    ///
    /// Returns an error if the socket path cannot be determined
    pub async fn run_with_signals(&self) -> Result<()> {
        let sock_path = socket_path()?;
        let ipc_handler = Arc::new(DaemonIpcHandler::new(
            self.bridge.clone(),
            self.shutdown_signal.clone(),
        ));

        let listen_path = sock_path.clone();
        let listener = tokio::spawn(async move {
            if let Err(e) = listen(ipc_handler, &listen_path).await {
                log::error!("IPC listener failed: {e}");
            }
        });

        match self.bridge.restore(self.reason).await {
            Ok(true) => log::info!("Monitor restored after {}", self.reason),
            Ok(false) => log::info!("Monitor left stopped after {}", self.reason),
            Err(e) => log::error!("Failed to restore monitor: {e}"),
        }

        let mut watchdog = interval(self.config.watchdog_interval);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!("Daemon started with signal handling and IPC");

        loop {
            tokio::select! {
                _ = watchdog.tick() => self.bridge.ensure_monitor().await,
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received Ctrl-C, shutting down...");
                    break;
                }
                () = self.shutdown_signal.notified() => {
                    log::info!("Shutdown requested over IPC");
                    break;
                }
            }
        }

        // Start intent is kept so the next daemon start resumes the monitor
        self.bridge.shutdown().await;
        listener.abort();
        if sock_path.exists() {
            if let Err(e) = std::fs::remove_file(&sock_path) {
                log::warn!("Failed to remove socket: {e}");
            }
        }
        log::info!("Daemon shut down gracefully.");
        Ok(())
    }
}
