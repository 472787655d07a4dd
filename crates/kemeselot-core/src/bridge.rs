//! Call/event surface between the background core and the presentation layer

use anyhow::Result;
use kemeselot_storage::{BlockPolicy, Database, ServiceIntent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::MonitorConfig;
use crate::error::BridgeError;
use crate::monitor::{create_usage_source, MonitorState, UsageSource};
use crate::overlay::{
    create_surface, ActionDisposition, OverlayController, OverlayDismissed, OverlayStatus,
    OverlaySurface, SystemAction,
};
use crate::permissions::{DesktopPermissionGate, PermissionGate, PermissionState};
use crate::speech::{self, SpeechSource};
use crate::supervisor::{RestoreReason, ServiceSupervisor};

type DismissListener = Arc<Mutex<Option<mpsc::UnboundedSender<OverlayDismissed>>>>;

/// Snapshot answered to status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStatus {
    pub monitor_running: bool,
    pub intent: ServiceIntent,
    pub monitor_state: Option<MonitorState>,
    pub overlay: Option<OverlayStatus>,
    pub blocked_count: usize,
}

/// Platform collaborators wired into a [`Bridge`]
pub struct BridgeParts {
    pub usage: Arc<dyn UsageSource>,
    pub permissions: Arc<dyn PermissionGate>,
    pub surface: Arc<dyn OverlaySurface>,
    pub speech: Arc<dyn SpeechSource>,
}

impl BridgeParts {
    /// Adapters for the current host
    ///
    /// # Errors
    ///
    /// Returns an error if the platform is unsupported or settings cannot be read
    pub fn for_host(database: &Database) -> Result<Self> {
        let usage = create_usage_source()?;
        let settings = database.get_settings()?;
        Ok(Self {
            permissions: Arc::new(DesktopPermissionGate::new(usage.clone())),
            usage,
            surface: create_surface(&settings),
            speech: speech::default_source(),
        })
    }
}

pub struct Bridge {
    database: Arc<Database>,
    permissions: Arc<dyn PermissionGate>,
    overlay: Arc<OverlayController>,
    supervisor: Arc<tokio::sync::Mutex<ServiceSupervisor>>,
    listener: DismissListener,
    pump: JoinHandle<()>,
}

impl Bridge {
    /// Wire the core together. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(database: Arc<Database>, parts: BridgeParts, config: MonitorConfig) -> Self {
        let (dismissed_tx, dismissed_rx) = mpsc::unbounded_channel();
        let overlay = Arc::new(OverlayController::new(
            parts.surface,
            parts.speech,
            dismissed_tx,
            config.ritual_tick,
        ));
        let supervisor = Arc::new(tokio::sync::Mutex::new(ServiceSupervisor::new(
            database.clone(),
            parts.usage,
            overlay.clone(),
            config,
        )));
        let listener: DismissListener = Arc::new(Mutex::new(None));

        let pump = tokio::spawn(pump_dismissals(
            dismissed_rx,
            supervisor.clone(),
            listener.clone(),
        ));

        Self {
            database,
            permissions: parts.permissions,
            overlay,
            supervisor,
            listener,
            pump,
        }
    }

    pub async fn can_draw_overlays(&self) -> bool {
        self.permissions.can_draw_overlays().await
    }

    pub async fn has_usage_access(&self) -> bool {
        self.permissions.has_usage_access().await
    }

    pub async fn permission_state(&self) -> PermissionState {
        self.permissions.check().await
    }

    pub fn request_overlay_permission(&self) {
        self.permissions.request_overlay_permission();
    }

    pub fn request_usage_access_permission(&self) {
        self.permissions.request_usage_access_permission();
    }

    /// # Errors
    ///
    /// Returns `StartFailed` if the monitor could not be started
    pub async fn start_monitor(&self) -> Result<bool, BridgeError> {
        self.supervisor.lock().await.start()?;
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns `StopFailed` if the monitor could not be stopped
    pub async fn stop_monitor(&self) -> Result<bool, BridgeError> {
        self.supervisor.lock().await.stop().await?;
        Ok(true)
    }

    pub async fn is_monitor_running(&self) -> bool {
        self.supervisor.lock().await.is_running()
    }

    /// Replace the block policy and make a running monitor pick it up
    ///
    /// # Errors
    ///
    /// Returns `Persistence` if the policy could not be written; the stored
    /// policy is unchanged then
    pub async fn set_blocked_apps<I, S>(&self, apps: I) -> Result<bool, BridgeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let policy = BlockPolicy::new(apps);
        self.database
            .set_blocked_apps(&policy)
            .map_err(|e| BridgeError::Persistence(e.to_string()))?;
        log::info!("Block policy updated: {} apps", policy.len());

        self.supervisor.lock().await.reload_policy();
        Ok(true)
    }

    /// # Errors
    ///
    /// Returns `Persistence` if the policy could not be read
    pub fn get_blocked_apps(&self) -> Result<BTreeSet<String>, BridgeError> {
        self.database
            .get_blocked_apps()
            .map(BlockPolicy::into_apps)
            .map_err(|e| BridgeError::Persistence(e.to_string()))
    }

    /// Ask the overlay to go away; a no-op unless its ritual has completed
    pub fn dismiss_overlay(&self) {
        if !self.overlay.request_dismiss() {
            log::debug!("Dismiss requested but no overlay is showing");
        }
    }

    /// Receive the next dismissals. Replaces any previous subscriber.
    pub fn subscribe_overlay_dismissed(&self) -> mpsc::UnboundedReceiver<OverlayDismissed> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.listener.lock() {
            Ok(mut listener) => *listener = Some(tx),
            Err(_) => log::error!("Dismiss listener lock poisoned"),
        }
        rx
    }

    pub fn report_speech_started(&self) -> bool {
        self.overlay.report_speech_started()
    }

    pub fn report_speech_ended(&self) -> bool {
        self.overlay.report_speech_ended()
    }

    pub fn pause_listening(&self) -> bool {
        self.overlay.pause_listening()
    }

    pub fn resume_listening(&self) -> bool {
        self.overlay.resume_listening()
    }

    #[must_use]
    pub fn system_action(&self, action: SystemAction) -> ActionDisposition {
        self.overlay.intercept(action)
    }

    /// # Errors
    ///
    /// Returns an error if persisted state cannot be read
    pub async fn status(&self) -> Result<BridgeStatus> {
        let intent = self.database.get_service_state()?.intent;
        let blocked_count = self.database.get_blocked_apps()?.len();
        let supervisor = self.supervisor.lock().await;

        Ok(BridgeStatus {
            monitor_running: supervisor.is_running(),
            intent,
            monitor_state: supervisor.monitor_state(),
            overlay: self.overlay.status(),
            blocked_count,
        })
    }

    /// Resume the monitor according to the stored start intent
    ///
    /// # Errors
    ///
    /// Returns an error if the intent cannot be read or the monitor cannot
    /// be created
    pub async fn restore(&self, reason: RestoreReason) -> Result<bool> {
        self.supervisor.lock().await.restore(reason)
    }

    /// Watchdog entry point
    pub async fn ensure_monitor(&self) {
        self.supervisor.lock().await.ensure_running();
    }

    /// Stop everything without changing the stored start intent
    pub async fn shutdown(&self) {
        self.supervisor.lock().await.halt().await;
        self.overlay.shutdown().await;
        self.pump.abort();
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Delivers each dismissal to the monitor first, then to the subscriber
async fn pump_dismissals(
    mut dismissed: mpsc::UnboundedReceiver<OverlayDismissed>,
    supervisor: Arc<tokio::sync::Mutex<ServiceSupervisor>>,
    listener: DismissListener,
) {
    while let Some(event) = dismissed.recv().await {
        supervisor.lock().await.overlay_dismissed();

        let Ok(mut listener) = listener.lock() else {
            log::error!("Dismiss listener lock poisoned");
            continue;
        };
        if let Some(tx) = listener.as_ref() {
            if tx.send(event).is_err() {
                *listener = None;
            }
        }
    }
}

#[cfg(test)]
mod tests;
