use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::process::Command;

use super::{UsageSample, UsageSource};

const FRONTMOST_BUNDLE_SCRIPT: &str = r#"
    tell application "System Events"
        set frontProc to first application process whose frontmost is true
        return bundle identifier of frontProc
    end tell
"#;

/// Reads the frontmost application's bundle identifier through System Events
pub struct MacOSUsageSource;

impl MacOSUsageSource {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn frontmost_bundle_id() -> Result<Option<String>> {
        let output = Command::new("osascript")
            .arg("-e")
            .arg(FRONTMOST_BUNDLE_SCRIPT)
            .output()
            .await
            .context("Failed to run osascript")?;

        if !output.status.success() {
            return Ok(None);
        }

        let bundle_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!bundle_id.is_empty() && bundle_id != "missing value").then_some(bundle_id))
    }
}

impl Default for MacOSUsageSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UsageSource for MacOSUsageSource {
    async fn query_usage(&self, _lookback: Duration) -> Result<Vec<UsageSample>> {
        Ok(Self::frontmost_bundle_id()
            .await?
            .map(|bundle_id| vec![UsageSample::new(bundle_id, Utc::now().timestamp_millis())])
            .unwrap_or_default())
    }

    /// Automation access to System Events is what the host gates
    async fn probe(&self) -> bool {
        Self::frontmost_bundle_id()
            .await
            .is_ok_and(|bundle_id| bundle_id.is_some())
    }
}
