//! Background monitor lifecycle.
//!
//! The supervisor is the only owner of the monitor task. The user's start
//! intent is persisted so a restarted daemon (or a boot trigger) can tell a
//! crash apart from a deliberate stop.

use anyhow::Result;
use kemeselot_storage::{Database, ServiceIntent, Settings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::MonitorConfig;
use crate::error::BridgeError;
use crate::monitor::{CycleOutcome, ForegroundAppMonitor, MonitorState, UsageSource};
use crate::overlay::{OverlayController, ShowOutcome};

/// Why the supervisor is asked to restore the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestoreReason {
    /// The hosting process came back after being killed
    ProcessRestart,
    /// Login or device boot
    Boot,
}

impl std::fmt::Display for RestoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProcessRestart => write!(f, "process restart"),
            Self::Boot => write!(f, "boot"),
        }
    }
}

#[derive(Debug)]
enum MonitorCommand {
    ReloadPolicy,
    OverlayDismissed,
    Stop,
}

struct MonitorHandle {
    commands: mpsc::UnboundedSender<MonitorCommand>,
    state: watch::Receiver<MonitorState>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Keeps the foreground monitor running while the user wants it to
pub struct ServiceSupervisor {
    database: Arc<Database>,
    usage: Arc<dyn UsageSource>,
    overlay: Arc<OverlayController>,
    config: MonitorConfig,
    monitor: Option<MonitorHandle>,
}

impl ServiceSupervisor {
    #[must_use]
    pub fn new(
        database: Arc<Database>,
        usage: Arc<dyn UsageSource>,
        overlay: Arc<OverlayController>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            database,
            usage,
            overlay,
            config,
            monitor: None,
        }
    }

    /// Record the start intent and run the monitor. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StartFailed` if the intent cannot be stored or the monitor
    /// cannot be created; the stored intent is left at `Stopped` then.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        if self.is_running() {
            return Ok(());
        }

        self.database
            .set_service_intent(ServiceIntent::Running)
            .map_err(|e| BridgeError::StartFailed(e.to_string()))?;

        if let Err(e) = self.spawn_monitor() {
            if let Err(revert) = self.database.set_service_intent(ServiceIntent::Stopped) {
                log::error!("Failed to revert start intent: {revert}");
            }
            return Err(BridgeError::StartFailed(e.to_string()));
        }

        log::info!("Monitor started");
        Ok(())
    }

    /// Record the stop intent and halt the monitor. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `StopFailed` if the stop intent cannot be stored; the monitor
    /// keeps running in that case.
    pub async fn stop(&mut self) -> Result<(), BridgeError> {
        self.database
            .set_service_intent(ServiceIntent::Stopped)
            .map_err(|e| BridgeError::StopFailed(e.to_string()))?;

        self.halt().await;
        Ok(())
    }

    /// Halt the monitor without touching the stored intent (daemon shutdown)
    pub async fn halt(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            // A send error only means the task is already gone
            let _ = monitor.commands.send(MonitorCommand::Stop);
            if let Err(e) = monitor.task.await {
                log::error!("Monitor task failed: {e}");
            }
            log::info!("Monitor stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.monitor.as_ref().is_some_and(MonitorHandle::is_live)
    }

    /// Make the running monitor re-read the block policy
    pub fn reload_policy(&self) {
        self.send(MonitorCommand::ReloadPolicy);
    }

    /// Tell the running monitor that the overlay is gone
    pub fn overlay_dismissed(&self) {
        self.send(MonitorCommand::OverlayDismissed);
    }

    fn send(&self, command: MonitorCommand) {
        if let Some(monitor) = self.monitor.as_ref().filter(|m| m.is_live()) {
            if monitor.commands.send(command).is_err() {
                log::warn!("Monitor task is not accepting commands");
            }
        }
    }

    /// Latest bookkeeping published by the running monitor
    #[must_use]
    pub fn monitor_state(&self) -> Option<MonitorState> {
        self.monitor
            .as_ref()
            .filter(|m| m.is_live())
            .map(|m| m.state.borrow().clone())
    }

    /// Resume the monitor if the user's last intent was to run it.
    ///
    /// # Errors
    ///
    /// Returns an error if the intent cannot be read or the monitor cannot
    /// be created
    pub fn restore(&mut self, reason: RestoreReason) -> Result<bool> {
        let state = self.database.get_service_state()?;
        if state.intent != ServiceIntent::Running {
            log::info!("Restore on {reason}: monitor was stopped by the user, staying stopped");
            return Ok(false);
        }

        if !self.is_running() {
            self.spawn_monitor()?;
        }
        log::info!("Restore on {reason}: monitor running");
        Ok(true)
    }

    /// Watchdog tick: bring a dead monitor back when it should be running
    pub fn ensure_running(&mut self) {
        if self.is_running() {
            return;
        }

        match self.database.get_service_state() {
            Ok(state) if state.intent == ServiceIntent::Running => {
                log::warn!("Monitor task is not running, restarting");
                if let Err(e) = self.spawn_monitor() {
                    log::error!("Failed to restart monitor: {e}");
                }
            }
            Ok(_) => {}
            Err(e) => log::error!("Failed to read start intent: {e}"),
        }
    }

    fn spawn_monitor(&mut self) -> Result<()> {
        let policy = self.database.get_blocked_apps()?;
        let monitor = ForegroundAppMonitor::new(self.usage.clone(), policy, self.config.lookback);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(MonitorState::default());

        let task = tokio::spawn(run_monitor_loop(
            monitor,
            self.database.clone(),
            self.overlay.clone(),
            self.config,
            commands_rx,
            state_tx,
        ));

        self.monitor = Some(MonitorHandle {
            commands: commands_tx,
            state: state_rx,
            task,
        });
        Ok(())
    }
}

impl Drop for ServiceSupervisor {
    fn drop(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.task.abort();
        }
    }
}

/// One cycle at a time; a slow cycle delays the next tick
async fn run_monitor_loop(
    mut monitor: ForegroundAppMonitor,
    database: Arc<Database>,
    overlay: Arc<OverlayController>,
    config: MonitorConfig,
    mut commands: mpsc::UnboundedReceiver<MonitorCommand>,
    state: watch::Sender<MonitorState>,
) {
    let mut ticker = interval(config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let CycleOutcome::ShowOverlay(app) = monitor.cycle().await {
                    show_overlay(&mut monitor, &database, &overlay, &app);
                }
            }
            command = commands.recv() => match command {
                Some(MonitorCommand::ReloadPolicy) => match database.get_blocked_apps() {
                    Ok(policy) => monitor.reload_policy(policy),
                    Err(e) => log::error!("Failed to reload block policy: {e}"),
                },
                Some(MonitorCommand::OverlayDismissed) => monitor.overlay_dismissed(),
                Some(MonitorCommand::Stop) | None => break,
            },
        }
        state.send_replace(monitor.state().clone());
    }
}

fn show_overlay(
    monitor: &mut ForegroundAppMonitor,
    database: &Database,
    overlay: &OverlayController,
    app: &str,
) {
    let settings = database.get_settings().unwrap_or_else(|e| {
        log::warn!("Failed to load settings, using defaults: {e}");
        Settings::default_settings()
    });

    match overlay.show(app, &settings) {
        Ok(ShowOutcome::Shown(_)) => {}
        Ok(ShowOutcome::AlreadyShowing(handle)) => {
            log::debug!("Overlay {} already showing", handle.id);
        }
        Err(e) => {
            log::error!("Failed to raise overlay for {app}: {e}");
            monitor.overlay_failed();
        }
    }
}

#[cfg(test)]
mod tests;
