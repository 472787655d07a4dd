use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{UnixListener, UnixStream},
    sync::Notify,
};

use crate::bridge::{Bridge, BridgeStatus};
use crate::error::BridgeError;
use crate::overlay::{ActionDisposition, OverlayDismissed, SystemAction};
use crate::permissions::PermissionState;

/// IPC request from CLI to daemon
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum IpcRequest {
    CanDrawOverlays,
    HasUsageAccess,
    CheckPermissions,
    RequestOverlayPermission,
    RequestUsageAccessPermission,
    StartMonitor,
    StopMonitor,
    IsMonitorRunning,
    SetBlockedApps(Vec<String>),
    GetBlockedApps,
    DismissOverlay,
    /// Held open until the next overlay dismissal
    WaitOverlayDismissed,
    SpeechStarted,
    SpeechEnded,
    PauseListening,
    ResumeListening,
    SystemAction(SystemAction),
    Status,
    Shutdown,
}

/// IPC response from daemon to CLI
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum IpcResponse {
    Bool(bool),
    Apps(Vec<String>),
    Permissions(PermissionState),
    Disposition(ActionDisposition),
    Dismissed(OverlayDismissed),
    Status(Box<BridgeStatus>),
    Ack,
    Error(BridgeError),
    Shutdown,
}

#[derive(Debug)]
pub struct IpcClient {
    sock_path: PathBuf,
}

impl IpcClient {
    #[must_use]
    pub fn new(sock_path: &Path) -> Self {
        Self {
            sock_path: sock_path.to_path_buf(),
        }
    }

    /// Send one request and wait for its response
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable or the reply is malformed
    pub async fn send_command(&self, request: IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.sock_path).await?;

        let encoded = bincode::serialize(&request)?;
        stream.write_all(&encoded).await?;
        stream.shutdown().await?;

        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).await?;
        let response: IpcResponse = bincode::deserialize(&buffer)?;

        Ok(response)
    }
}

pub struct DaemonIpcHandler {
    bridge: Arc<Bridge>,
    shutdown: Arc<Notify>,
}

impl DaemonIpcHandler {
    #[must_use]
    pub fn new(bridge: Arc<Bridge>, shutdown: Arc<Notify>) -> Self {
        Self { bridge, shutdown }
    }

    /// Run one request against the bridge
    pub async fn respond(&self, request: IpcRequest) -> IpcResponse {
        match request {
            IpcRequest::CanDrawOverlays => IpcResponse::Bool(self.bridge.can_draw_overlays().await),
            IpcRequest::HasUsageAccess => IpcResponse::Bool(self.bridge.has_usage_access().await),
            IpcRequest::CheckPermissions => {
                IpcResponse::Permissions(self.bridge.permission_state().await)
            }
            IpcRequest::RequestOverlayPermission => {
                self.bridge.request_overlay_permission();
                IpcResponse::Ack
            }
            IpcRequest::RequestUsageAccessPermission => {
                self.bridge.request_usage_access_permission();
                IpcResponse::Ack
            }
            IpcRequest::StartMonitor => bool_or_error(self.bridge.start_monitor().await),
            IpcRequest::StopMonitor => bool_or_error(self.bridge.stop_monitor().await),
            IpcRequest::IsMonitorRunning => {
                IpcResponse::Bool(self.bridge.is_monitor_running().await)
            }
            IpcRequest::SetBlockedApps(apps) => {
                bool_or_error(self.bridge.set_blocked_apps(apps).await)
            }
            IpcRequest::GetBlockedApps => match self.bridge.get_blocked_apps() {
                Ok(apps) => IpcResponse::Apps(apps.into_iter().collect()),
                Err(e) => IpcResponse::Error(e),
            },
            IpcRequest::DismissOverlay => {
                self.bridge.dismiss_overlay();
                IpcResponse::Ack
            }
            IpcRequest::WaitOverlayDismissed => {
                let mut events = self.bridge.subscribe_overlay_dismissed();
                match events.recv().await {
                    Some(event) => IpcResponse::Dismissed(event),
                    None => IpcResponse::Error(BridgeError::Unavailable(
                        "Replaced by a newer listener".to_string(),
                    )),
                }
            }
            IpcRequest::SpeechStarted => IpcResponse::Bool(self.bridge.report_speech_started()),
            IpcRequest::SpeechEnded => IpcResponse::Bool(self.bridge.report_speech_ended()),
            IpcRequest::PauseListening => IpcResponse::Bool(self.bridge.pause_listening()),
            IpcRequest::ResumeListening => IpcResponse::Bool(self.bridge.resume_listening()),
            IpcRequest::SystemAction(action) => {
                IpcResponse::Disposition(self.bridge.system_action(action))
            }
            IpcRequest::Status => match self.bridge.status().await {
                Ok(status) => IpcResponse::Status(Box::new(status)),
                Err(e) => IpcResponse::Error(BridgeError::Unavailable(e.to_string())),
            },
            IpcRequest::Shutdown => {
                self.shutdown.notify_one();
                IpcResponse::Shutdown
            }
        }
    }

    pub async fn handle(&self, stream: &mut UnixStream, request: IpcRequest) -> Result<()> {
        let response = self.respond(request).await;
        let encoded = bincode::serialize(&response)?;
        stream.write_all(&encoded).await?;
        Ok(())
    }
}

fn bool_or_error(result: Result<bool, BridgeError>) -> IpcResponse {
    match result {
        Ok(value) => IpcResponse::Bool(value),
        Err(e) => {
            log::warn!("{e}");
            IpcResponse::Error(e)
        }
    }
}

pub async fn listen(handler: Arc<DaemonIpcHandler>, sock_path: &Path) -> io::Result<()> {
    if sock_path.exists() {
        fs::remove_file(sock_path)?;
    }
    let listener = UnixListener::bind(sock_path)?;

    loop {
        match listener.accept().await {
            Ok((mut stream, _)) => {
                let handler = handler.clone();
                tokio::spawn(async move {
                    // Clients shut down their write half after the request
                    let mut buf = Vec::new();
                    match stream.read_to_end(&mut buf).await {
                        Ok(n) if n > 0 => match bincode::deserialize::<IpcRequest>(&buf) {
                            Ok(request) => {
                                if let Err(e) = handler.handle(&mut stream, request).await {
                                    log::error!("IPC handle error: {e}");
                                }
                            }
                            Err(e) => {
                                log::error!("IPC deserialize error: {e}");
                            }
                        },
                        Ok(_) => {} // Connection closed
                        Err(e) => {
                            log::error!("IPC read error: {e}");
                        }
                    }
                });
            }
            Err(e) => {
                log::error!("IPC accept error: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeParts;
    use crate::config::MonitorConfig;
    use crate::monitor::test_support::ScriptedUsage;
    use crate::overlay::test_support::FakeSurface;
    use crate::permissions::test_support::FakePermissions;
    use crate::speech::test_support::FakeSpeech;
    use kemeselot_storage::Database;

    fn bridge(dir: &tempfile::TempDir) -> Arc<Bridge> {
        let database = Arc::new(Database::new(Some(dir.path().join("test.db"))).unwrap());
        let parts = BridgeParts {
            usage: Arc::new(ScriptedUsage::default()),
            permissions: Arc::new(FakePermissions::granted()),
            surface: Arc::new(FakeSurface::default()),
            speech: Arc::new(FakeSpeech::default()),
        };
        Arc::new(Bridge::new(database, parts, MonitorConfig::default()))
    }

    #[tokio::test]
    async fn test_round_trip_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let sock_path = dir.path().join("test.sock");
        let shutdown = Arc::new(Notify::new());
        let handler = Arc::new(DaemonIpcHandler::new(bridge(&dir), shutdown.clone()));

        let listen_path = sock_path.clone();
        let server = tokio::spawn(async move { listen(handler, &listen_path).await });
        while !sock_path.exists() {
            tokio::task::yield_now().await;
        }

        let client = IpcClient::new(&sock_path);
        let response = client
            .send_command(IpcRequest::SetBlockedApps(vec![
                "app.y".to_string(),
                "app.x".to_string(),
                "app.x".to_string(),
            ]))
            .await
            .unwrap();
        assert_eq!(response, IpcResponse::Bool(true));

        let response = client.send_command(IpcRequest::GetBlockedApps).await.unwrap();
        assert_eq!(
            response,
            IpcResponse::Apps(vec!["app.x".to_string(), "app.y".to_string()])
        );

        let response = client.send_command(IpcRequest::Shutdown).await.unwrap();
        assert_eq!(response, IpcResponse::Shutdown);
        shutdown.notified().await;

        server.abort();
    }

    #[tokio::test]
    async fn test_permissions_and_actions() {
        let dir = tempfile::tempdir().unwrap();
        let handler = DaemonIpcHandler::new(bridge(&dir), Arc::new(Notify::new()));

        assert_eq!(
            handler.respond(IpcRequest::CheckPermissions).await,
            IpcResponse::Permissions(PermissionState {
                overlay: true,
                usage_access: true,
            })
        );
        assert_eq!(
            handler
                .respond(IpcRequest::SystemAction(SystemAction::Back))
                .await,
            IpcResponse::Disposition(ActionDisposition::PassThrough)
        );
        assert_eq!(
            handler.respond(IpcRequest::DismissOverlay).await,
            IpcResponse::Ack
        );
    }

    #[tokio::test]
    async fn test_status_reports_stopped_monitor() {
        let dir = tempfile::tempdir().unwrap();
        let handler = DaemonIpcHandler::new(bridge(&dir), Arc::new(Notify::new()));

        let IpcResponse::Status(status) = handler.respond(IpcRequest::Status).await else {
            panic!("expected status");
        };
        assert!(!status.monitor_running);
        assert!(status.overlay.is_none());
        assert_eq!(status.blocked_count, 0);
    }
}
