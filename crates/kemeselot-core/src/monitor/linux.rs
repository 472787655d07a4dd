use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::process::Command;

use super::{UsageSample, UsageSource};

/// Reads the focused window's process through `xdotool` and `/proc`.
///
/// X11 only reports the current focus, so every query yields at most one
/// sample stamped with the sampling time.
pub struct LinuxUsageSource;

impl LinuxUsageSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn focused_pid() -> Result<Option<u32>> {
        let output = Command::new("xdotool")
            .args(["getactivewindow", "getwindowpid"])
            .output()
            .await
            .context("Failed to run xdotool")?;

        if !output.status.success() {
            // No focused window (e.g. desktop or lock screen)
            return Ok(None);
        }

        let pid = String::from_utf8_lossy(&output.stdout).trim().parse::<u32>()?;
        Ok(Some(pid))
    }
}

impl Default for LinuxUsageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageSource for LinuxUsageSource {
    async fn query_usage(&self, _lookback: Duration) -> Result<Vec<UsageSample>> {
        let Some(pid) = Self::focused_pid().await? else {
            return Ok(Vec::new());
        };

        let comm = tokio::fs::read_to_string(format!("/proc/{pid}/comm"))
            .await
            .with_context(|| format!("Failed to read process name of PID {pid}"))?;
        let app_id = comm.trim();
        if app_id.is_empty() {
            return Ok(Vec::new());
        }

        Ok(vec![UsageSample::new(app_id, Utc::now().timestamp_millis())])
    }

    async fn probe(&self) -> bool {
        Command::new("xdotool")
            .arg("version")
            .output()
            .await
            .is_ok_and(|output| output.status.success())
    }
}
