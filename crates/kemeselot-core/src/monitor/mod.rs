use anyhow::Result;
use async_trait::async_trait;
use kemeselot_storage::BlockPolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(target_os = "linux")]
pub mod linux;

/// One entry of the host's recent-usage accounting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSample {
    pub app_id: String,
    /// Milliseconds since the Unix epoch; 0 when the host has no timestamp
    pub last_used_ms: i64,
}

impl UsageSample {
    #[must_use]
    pub fn new(app_id: impl Into<String>, last_used_ms: i64) -> Self {
        Self {
            app_id: app_id.into(),
            last_used_ms,
        }
    }
}

/// Platform-specific source of recent application usage
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Applications used within the trailing `lookback` window
    async fn query_usage(&self, lookback: Duration) -> Result<Vec<UsageSample>>;

    /// Whether the host currently grants access to usage data
    async fn probe(&self) -> bool;
}

/// Create platform-specific usage source
///
/// # Errors
///
/// Returns an error if the current platform is not supported
pub fn create_usage_source() -> Result<Arc<dyn UsageSource>> {
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(macos::MacOSUsageSource::new()))
    }

    #[cfg(target_os = "linux")]
    {
        Ok(Arc::new(linux::LinuxUsageSource::new()))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        anyhow::bail!("Unsupported platform")
    }
}

/// Most recently used application among samples with a timestamp.
///
/// Equal timestamps resolve to the last one enumerated.
#[must_use]
pub fn select_foreground(samples: &[UsageSample]) -> Option<&str> {
    samples
        .iter()
        .filter(|s| s.last_used_ms > 0)
        .max_by_key(|s| s.last_used_ms)
        .map(|s| s.app_id.as_str())
}

/// Monitor bookkeeping, reset whenever the monitor is recreated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorState {
    pub last_foreground_app: Option<String>,
    /// Only this flag decides whether a new overlay may be requested
    pub overlay_showing: bool,
}

/// What one polling cycle concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Usage data was empty or unavailable; nothing changed
    NoData,
    /// Same foreground app as the previous cycle
    Unchanged,
    /// Foreground moved to a different app
    Switched(String),
    /// Foreground moved to a blocked app while an overlay already owns the screen
    BlockedWhileShowing(String),
    /// Foreground moved to a blocked app; the overlay must be raised
    ShowOverlay(String),
}

/// Polls the foreground application and decides when to raise the overlay
pub struct ForegroundAppMonitor {
    usage: Arc<dyn UsageSource>,
    policy: BlockPolicy,
    state: MonitorState,
    lookback: Duration,
}

impl ForegroundAppMonitor {
    #[must_use]
    pub fn new(usage: Arc<dyn UsageSource>, policy: BlockPolicy, lookback: Duration) -> Self {
        log::info!("Monitoring {} blocked apps", policy.len());
        Self {
            usage,
            policy,
            state: MonitorState::default(),
            lookback,
        }
    }

    /// Run one polling cycle. Failures are absorbed; the next cycle retries.
    pub async fn cycle(&mut self) -> CycleOutcome {
        match self.usage.query_usage(self.lookback).await {
            Ok(samples) => self.observe(&samples),
            Err(e) => {
                log::warn!("Usage query failed, skipping cycle: {e}");
                CycleOutcome::NoData
            }
        }
    }

    /// Apply one usage sample set to the monitor state
    pub fn observe(&mut self, samples: &[UsageSample]) -> CycleOutcome {
        let Some(foreground) = select_foreground(samples) else {
            log::warn!("Usage data empty, is usage access granted?");
            return CycleOutcome::NoData;
        };

        if self.state.last_foreground_app.as_deref() == Some(foreground) {
            return CycleOutcome::Unchanged;
        }
        self.state.last_foreground_app = Some(foreground.to_string());
        log::debug!("Foreground app: {foreground}");

        if !self.policy.is_blocked(foreground) {
            return CycleOutcome::Switched(foreground.to_string());
        }

        if self.state.overlay_showing {
            log::debug!("Blocked app {foreground} while overlay already showing");
            return CycleOutcome::BlockedWhileShowing(foreground.to_string());
        }

        log::info!("Blocked app detected: {foreground}, launching overlay");
        self.state.overlay_showing = true;
        CycleOutcome::ShowOverlay(foreground.to_string())
    }

    /// Swap in a freshly loaded policy without touching the cycle
    pub fn reload_policy(&mut self, policy: BlockPolicy) {
        log::info!("Reloaded block policy: {} apps", policy.len());
        self.policy = policy;
    }

    /// The overlay was dismissed; monitoring resumes
    pub fn overlay_dismissed(&mut self) {
        self.state.overlay_showing = false;
        log::info!("Overlay dismissed, monitoring resumed");
    }

    /// The overlay could not be raised; allow a later transition to retry
    pub fn overlay_failed(&mut self) {
        self.state.overlay_showing = false;
    }

    #[must_use]
    pub fn state(&self) -> &MonitorState {
        &self.state
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{UsageSample, UsageSource};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted samples; keeps returning the last script once drained
    #[derive(Default)]
    pub struct ScriptedUsage {
        script: Mutex<VecDeque<anyhow::Result<Vec<UsageSample>>>>,
        last: Mutex<Vec<UsageSample>>,
        queries: AtomicUsize,
    }

    impl ScriptedUsage {
        /// Number of usage queries answered so far
        pub fn queries(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }

        pub fn push(&self, samples: Vec<UsageSample>) {
            self.script.lock().unwrap().push_back(Ok(samples));
        }

        pub fn push_foreground(&self, app_id: &str) {
            self.push(vec![UsageSample::new(app_id, 1_700_000_000_000)]);
        }

        pub fn push_error(&self) {
            self.script
                .lock()
                .unwrap()
                .push_back(Err(anyhow::anyhow!("usage service unavailable")));
        }
    }

    #[async_trait]
    impl UsageSource for ScriptedUsage {
        async fn query_usage(&self, _lookback: Duration) -> anyhow::Result<Vec<UsageSample>> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(Ok(samples)) => {
                    *self.last.lock().unwrap() = samples.clone();
                    Ok(samples)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last.lock().unwrap().clone()),
            }
        }

        async fn probe(&self) -> bool {
            true
        }
    }
}
