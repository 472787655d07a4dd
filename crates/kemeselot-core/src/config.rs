use anyhow::Result;
use std::path::PathBuf;
use std::time::Duration;

/// Get the local data directory for kemeselot.
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn get_data_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_local_dir().ok_or_else(|| anyhow::anyhow!("Failed to get local data dir"))?;
    path.push("kemeselot");
    Ok(path)
}

/// Bridge socket inside the data directory
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn socket_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("kemeselot.sock"))
}

/// Daemon PID file inside the data directory
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn pid_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("kemeselot.pid"))
}

/// Daemon log file inside the data directory
///
/// # Errors
///
/// Returns an error if the local data directory cannot be determined.
pub fn log_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("kemeselot.log"))
}

/// Timing knobs of the background monitor.
///
/// The lookback window and the poll interval are empirical; nothing depends
/// on their exact values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Time between two foreground samples
    pub poll_interval: Duration,
    /// Trailing window of usage data considered by each sample
    pub lookback: Duration,
    /// How often the daemon checks that the monitor task is still alive
    pub watchdog_interval: Duration,
    /// Countdown granularity of the lock ritual
    pub ritual_tick: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            lookback: Duration::from_secs(5),
            watchdog_interval: Duration::from_secs(10),
            ritual_tick: Duration::from_secs(1),
        }
    }
}
