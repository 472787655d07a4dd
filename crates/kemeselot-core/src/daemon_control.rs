use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{pid_path, socket_path};

/// PID file and socket bookkeeping of the background daemon
pub struct DaemonControl {
    pid_file: PathBuf,
    sock_path: PathBuf,
}

impl DaemonControl {
    /// Control files in the default data directory
    ///
    /// # Errors
    ///
    /// Returns an error if the local data directory cannot be determined
    pub fn new() -> Result<Self> {
        Ok(Self::with_paths(pid_path()?, socket_path()?))
    }

    #[must_use]
    pub fn with_paths(pid_file: PathBuf, sock_path: PathBuf) -> Self {
        Self {
            pid_file,
            sock_path,
        }
    }

    #[must_use]
    pub fn sock_path(&self) -> &Path {
        &self.sock_path
    }

    /// PID recorded by the last daemon start, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the PID file exists but cannot be read or parsed
    pub fn get_pid(&self) -> Result<Option<u32>> {
        if !self.pid_file.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.pid_file)?;
        let pid = contents
            .trim()
            .parse::<u32>()
            .with_context(|| format!("Invalid PID file {}", self.pid_file.display()))?;
        Ok(Some(pid))
    }

    /// # Errors
    ///
    /// Returns an error if the PID file cannot be written
    pub fn write_pid(&self, pid: u32) -> Result<()> {
        if let Some(parent) = self.pid_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.pid_file, pid.to_string())?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the PID file exists but cannot be removed
    pub fn remove_pid(&self) -> Result<()> {
        if self.pid_file.exists() {
            std::fs::remove_file(&self.pid_file)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the socket exists but cannot be removed
    pub fn remove_socket(&self) -> Result<()> {
        if self.sock_path.exists() {
            std::fs::remove_file(&self.sock_path)?;
        }
        Ok(())
    }
}
