//! Helper utility functions for CLI commands

use anyhow::Result;
use kemeselot_core::{
    config::socket_path,
    ipc::{IpcClient, IpcRequest, IpcResponse},
};
use sysinfo::{Pid, System};

/// Safely truncate a string to a maximum number of characters (not bytes).
pub fn truncate_str(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_chars {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{truncated}...")
    } else {
        s.to_string()
    }
}

pub fn is_process_alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_process(Pid::from_u32(pid))
}

/// Whether a daemon is listening on the socket
pub async fn daemon_reachable() -> bool {
    matches!(send(IpcRequest::IsMonitorRunning).await, Ok(IpcResponse::Bool(_)))
}

async fn send(request: IpcRequest) -> Result<IpcResponse> {
    let sock_path = socket_path()?;
    if !sock_path.exists() {
        anyhow::bail!("Daemon is not running. Start it with `kemeselot start`.");
    }
    IpcClient::new(&sock_path).send_command(request).await
}

/// Send a request; typed bridge failures become errors
pub async fn request(request: IpcRequest) -> Result<IpcResponse> {
    match send(request).await? {
        IpcResponse::Error(e) => Err(e.into()),
        response => Ok(response),
    }
}

pub fn expect_bool(response: IpcResponse) -> Result<bool> {
    match response {
        IpcResponse::Bool(value) => Ok(value),
        other => anyhow::bail!("Unexpected response from daemon: {other:?}"),
    }
}

pub fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
