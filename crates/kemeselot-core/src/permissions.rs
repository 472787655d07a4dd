//! Host permission checks and request flows.
//!
//! Checks are side-effect free. Requests only open the host's settings UI
//! and return immediately; the grant is observed on the next check.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::monitor::UsageSource;

/// Result of a permission probe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionState {
    pub overlay: bool,
    pub usage_access: bool,
}

impl PermissionState {
    #[must_use]
    pub fn all_granted(&self) -> bool {
        self.overlay && self.usage_access
    }
}

#[async_trait]
pub trait PermissionGate: Send + Sync {
    /// Whether the process may draw above other applications
    async fn can_draw_overlays(&self) -> bool;

    /// Whether the process may read recent application usage
    async fn has_usage_access(&self) -> bool;

    /// Open the host's overlay permission settings
    fn request_overlay_permission(&self);

    /// Open the host's usage access settings
    fn request_usage_access_permission(&self);

    async fn check(&self) -> PermissionState {
        PermissionState {
            overlay: self.can_draw_overlays().await,
            usage_access: self.has_usage_access().await,
        }
    }
}

/// Permission gate for desktop hosts.
///
/// Usage access is whatever the usage source can actually read.
pub struct DesktopPermissionGate {
    usage: Arc<dyn UsageSource>,
}

impl DesktopPermissionGate {
    #[must_use]
    pub fn new(usage: Arc<dyn UsageSource>) -> Self {
        Self { usage }
    }
}

#[cfg(target_os = "macos")]
fn open_settings_pane(pane: &str) {
    let url = format!("x-apple.systempreferences:com.apple.preference.security?{pane}");
    match std::process::Command::new("open").arg(&url).spawn() {
        Ok(_) => log::info!("Opened system settings: {pane}"),
        Err(e) => log::warn!("Failed to open system settings: {e}"),
    }
}

#[async_trait]
impl PermissionGate for DesktopPermissionGate {
    async fn can_draw_overlays(&self) -> bool {
        #[cfg(target_os = "macos")]
        {
            true
        }

        #[cfg(not(target_os = "macos"))]
        {
            std::env::var_os("DISPLAY").is_some() || std::env::var_os("WAYLAND_DISPLAY").is_some()
        }
    }

    async fn has_usage_access(&self) -> bool {
        self.usage.probe().await
    }

    fn request_overlay_permission(&self) {
        #[cfg(target_os = "macos")]
        open_settings_pane("Privacy_ScreenCapture");

        #[cfg(not(target_os = "macos"))]
        log::info!("Overlay requires a graphical session (DISPLAY or WAYLAND_DISPLAY)");
    }

    fn request_usage_access_permission(&self) {
        #[cfg(target_os = "macos")]
        open_settings_pane("Privacy_Automation");

        #[cfg(not(target_os = "macos"))]
        log::info!("Usage access requires xdotool on an X11 session");
    }
}
