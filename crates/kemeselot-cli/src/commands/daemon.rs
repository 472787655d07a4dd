/// Daemon lifecycle management commands
use anyhow::Result;
use kemeselot_core::{
    config::{log_path, MonitorConfig},
    daemon_control::DaemonControl,
    ipc::{IpcClient, IpcRequest, IpcResponse},
    BridgeStatus, Daemon, RestoreReason,
};
use kemeselot_storage::{Database, ServiceIntent};
use std::{
    env,
    fs::{create_dir_all, File, OpenOptions},
    path::Path,
    process::Command,
    time::Duration,
};
use sysinfo::{Pid, System};
use tabled::{settings::Style, Table, Tabled};

use super::helpers::{
    daemon_reachable, expect_bool, is_process_alive, request, truncate_str, yes_no,
};

const SOCKET_WAIT_ATTEMPTS: u32 = 50;

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Item")]
    item: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

impl StatusRow {
    fn new(item: &'static str, value: impl Into<String>) -> Self {
        Self {
            item,
            value: value.into(),
        }
    }
}

/// Spawn the daemon process unless one is alive. Returns true if spawned.
fn spawn_daemon(control: &DaemonControl, reason: RestoreReason) -> Result<bool> {
    // 1. Check if daemon is already running
    match control.get_pid() {
        Ok(Some(pid)) if is_process_alive(pid) => {
            log::info!("Daemon is already running (PID: {pid}).");
            return Ok(false);
        }
        Ok(Some(_)) | Err(_) => {
            log::warn!("Removing stale PID file.");
            control.remove_pid()?;
        }
        Ok(None) => {}
    }

    // 2. Clean up old socket if it exists
    if control.sock_path().exists() {
        log::warn!("Removing stale socket file.");
        control.remove_socket()?;
    }

    log::info!("Starting Kemeselot daemon...");

    // 3. Spawn a new process for the daemon
    let mut command = Command::new(env::current_exe()?);
    command.arg("daemon-internal-start").current_dir(env::current_dir()?);
    if reason == RestoreReason::Boot {
        command.arg("--boot");
    }
    let child = command.spawn()?;

    // 4. In parent process, write PID and exit
    log::info!("Daemon process started with PID: {}", child.id());
    control.write_pid(child.id())?;
    Ok(true)
}

async fn ensure_daemon() -> Result<()> {
    // Possibly started by the login service rather than by us
    if daemon_reachable().await {
        return Ok(());
    }
    let control = DaemonControl::new()?;
    spawn_daemon(&control, RestoreReason::ProcessRestart)?;

    for _ in 0..SOCKET_WAIT_ATTEMPTS {
        if daemon_reachable().await {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    anyhow::bail!("Daemon did not come up; see {}", log_path()?.display())
}

pub async fn start_monitor() -> Result<()> {
    ensure_daemon().await?;
    expect_bool(request(IpcRequest::StartMonitor).await?)?;
    println!("Monitor started.");

    if let IpcResponse::Permissions(state) = request(IpcRequest::CheckPermissions).await? {
        if !state.all_granted() {
            println!("Some permissions are missing; run `kemeselot permissions` for details.");
        }
    }
    Ok(())
}

pub async fn stop_monitor() -> Result<()> {
    if daemon_reachable().await {
        expect_bool(request(IpcRequest::StopMonitor).await?)?;
    } else {
        // Nothing is running; record the decision for the next daemon start
        Database::new(None)?.set_service_intent(ServiceIntent::Stopped)?;
    }
    println!("Monitor stopped.");
    Ok(())
}

/// Login/boot hook
pub fn boot() -> Result<()> {
    let db = Database::new(None)?;
    if db.get_service_state()?.intent != ServiceIntent::Running {
        log::info!("Monitor was stopped by the user; not starting the daemon.");
        return Ok(());
    }
    spawn_daemon(&DaemonControl::new()?, RestoreReason::Boot)?;
    Ok(())
}

pub async fn run_daemon_process(reason: RestoreReason) -> Result<()> {
    // This is the detached daemon process
    setup_daemon_logging()?;
    log::info!("Daemon process started internally ({reason}).");

    // The login service starts us directly, so record our own PID
    let control = DaemonControl::new()?;
    control.write_pid(std::process::id())?;

    let result = daemon_main_logic(reason).await;
    if let Err(e) = &result {
        log::error!("Daemon main logic exited with a fatal error: {e:#}");
    }
    if let Err(e) = control.remove_pid() {
        log::warn!("Failed to remove PID file: {e}");
    }
    result
}

fn setup_daemon_logging() -> Result<()> {
    let log_file = open_log_file(&log_path()?)?;

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(Box::new(log_file)))
        .filter_level(log::LevelFilter::Debug)
        .format_timestamp_secs()
        .init();

    Ok(())
}

/// Open the daemon log for appending, creating its directory if needed
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

async fn daemon_main_logic(reason: RestoreReason) -> Result<()> {
    let db = Database::new(None)?;
    let daemon = Daemon::new(db, MonitorConfig::default(), reason)?;
    daemon.run_with_signals().await
}

pub async fn stop_daemon() -> Result<()> {
    let control = DaemonControl::new()?;

    let Some(pid) = control.get_pid()? else {
        log::info!("Daemon is not running (no PID file).");
        // Also remove socket if it exists for consistency
        control.remove_socket()?;
        return Ok(());
    };

    log::info!("Stopping Kemeselot daemon (PID: {pid})...");
    let client = IpcClient::new(control.sock_path());

    match client.send_command(IpcRequest::Shutdown).await {
        Ok(IpcResponse::Shutdown) => {
            log::info!("Daemon shutdown signal sent. Waiting for process to exit...");
            tokio::time::sleep(Duration::from_secs(2)).await;

            if is_process_alive(pid) {
                log::warn!("Daemon did not stop gracefully. Force killing...");
                kill(pid);
            } else {
                log::info!("Daemon stopped successfully.");
            }
        }
        Ok(resp) => log::error!("Received unexpected response from daemon: {resp:?}"),
        Err(e) => {
            log::error!("Failed to send shutdown command: {e}. Forcing cleanup.");
            kill(pid);
        }
    }

    // Cleanup
    control.remove_pid()?;
    control.remove_socket()?;
    Ok(())
}

fn kill(pid: u32) {
    let mut sys = System::new();
    let pid = Pid::from_u32(pid);
    if sys.refresh_process(pid) {
        if let Some(process) = sys.process(pid) {
            process.kill();
            log::info!("Process killed.");
        }
    }
}

pub async fn show_status() -> Result<()> {
    if !daemon_reachable().await {
        let intent = Database::new(None)?.get_service_state()?.intent;
        println!("Daemon Status: Not running");
        println!("Monitor setting: {intent}");
        if intent == ServiceIntent::Running {
            println!("Run `kemeselot start` (or `kemeselot boot`) to resume monitoring.");
        }
        return Ok(());
    }

    match request(IpcRequest::Status).await? {
        IpcResponse::Status(status) => {
            let mut table = Table::new(status_rows(&status));
            table.with(Style::rounded());
            println!("{table}");
        }
        other => anyhow::bail!("Unexpected response from daemon: {other:?}"),
    }

    if let IpcResponse::Permissions(state) = request(IpcRequest::CheckPermissions).await? {
        println!(
            "\nPermissions: overlay {}, usage access {}",
            yes_no(state.overlay),
            yes_no(state.usage_access)
        );
    }
    Ok(())
}

fn status_rows(status: &BridgeStatus) -> Vec<StatusRow> {
    let mut rows = vec![
        StatusRow::new("Monitor", if status.monitor_running { "running" } else { "stopped" }),
        StatusRow::new("Monitor setting", status.intent.to_string()),
        StatusRow::new("Blocked apps", status.blocked_count.to_string()),
    ];

    if let Some(state) = &status.monitor_state {
        let foreground = state.last_foreground_app.as_deref().unwrap_or("-");
        rows.push(StatusRow::new("Foreground app", truncate_str(foreground, 40)));
    }

    match &status.overlay {
        Some(overlay) => {
            let session = &overlay.session;
            rows.push(StatusRow::new(
                "Overlay",
                format!("showing for {}", overlay.handle.triggering_app),
            ));
            rows.push(StatusRow::new("Prayer mode", session.mode.to_string()));
            rows.push(StatusRow::new(
                "Remaining",
                format!(
                    "{}s of {}s ({:?})",
                    session.remaining, session.total_duration, session.state
                ),
            ));
            if let Some(warning) = &session.warning {
                rows.push(StatusRow::new("Warning", warning.clone()));
            }
        }
        None => rows.push(StatusRow::new("Overlay", "not showing")),
    }
    rows
}
