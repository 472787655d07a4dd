use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Shortest ritual the settings accept, in seconds
pub const MIN_TIMER_DURATION_SECONDS: u32 = 1;
/// Longest ritual the settings accept, in seconds
pub const MAX_TIMER_DURATION_SECONDS: u32 = 3600;

/// How the lock ritual gates its countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerMode {
    /// Timer runs continuously
    #[default]
    Silent,
    /// Timer only runs while the user is praying aloud
    Voice,
}

impl PrayerMode {
    /// Parse a prayer mode from its stored name
    #[must_use]
    pub fn parse_mode(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "silent" => Some(Self::Silent),
            "voice" => Some(Self::Voice),
            _ => None,
        }
    }
}

impl fmt::Display for PrayerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => write!(f, "silent"),
            Self::Voice => write!(f, "voice"),
        }
    }
}

/// Ritual settings copied into every new lock session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub prayer_mode: PrayerMode,
    pub timer_duration_seconds: u32,
    /// External program that draws the lockout surface (headless when unset)
    pub overlay_command: Option<String>,
}

impl Settings {
    #[must_use]
    pub fn default_settings() -> Self {
        Self {
            prayer_mode: PrayerMode::Silent,
            timer_duration_seconds: 300, // 5 minutes
            overlay_command: None,
        }
    }

    /// Check that the settings can be persisted
    ///
    /// # Errors
    ///
    /// Returns an error if the timer duration is outside the accepted range
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(MIN_TIMER_DURATION_SECONDS..=MAX_TIMER_DURATION_SECONDS)
            .contains(&self.timer_duration_seconds)
        {
            anyhow::bail!(
                "Timer duration must be between {MIN_TIMER_DURATION_SECONDS} and {MAX_TIMER_DURATION_SECONDS} seconds (got {})",
                self.timer_duration_seconds
            );
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::default_settings()
    }
}

/// The last start/stop decision the user made for the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ServiceIntent {
    Running,
    #[default]
    Stopped,
}

impl ServiceIntent {
    #[must_use]
    pub fn parse_intent(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Persisted start intent with the time it was recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceState {
    pub intent: ServiceIntent,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Set of application identifiers that trigger the lockout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPolicy {
    apps: BTreeSet<String>,
}

impl BlockPolicy {
    /// Build a policy from identifiers, kept exactly as given
    pub fn new<I, S>(apps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let apps = apps
            .into_iter()
            .map(|app| app.as_ref().to_string())
            .collect();
        Self { apps }
    }

    #[must_use]
    pub fn is_blocked(&self, app_id: &str) -> bool {
        self.apps.contains(app_id)
    }

    #[must_use]
    pub fn apps(&self) -> &BTreeSet<String> {
        &self.apps
    }

    #[must_use]
    pub fn into_apps(self) -> BTreeSet<String> {
        self.apps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.apps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}
