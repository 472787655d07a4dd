/// Commands acting on the overlay's prayer ritual
use anyhow::Result;
use kemeselot_core::ipc::{IpcRequest, IpcResponse};

use super::helpers::{expect_bool, request};
use crate::SpeechAction;

pub async fn dismiss() -> Result<()> {
    request(IpcRequest::DismissOverlay).await?;
    // Fire-and-forget: the overlay ignores this until the prayer is complete
    println!("Dismiss requested.");
    Ok(())
}

pub async fn speech(action: SpeechAction) -> Result<()> {
    let req = match action {
        SpeechAction::Start => IpcRequest::SpeechStarted,
        SpeechAction::End => IpcRequest::SpeechEnded,
        SpeechAction::Pause => IpcRequest::PauseListening,
        SpeechAction::Resume => IpcRequest::ResumeListening,
    };
    if !expect_bool(request(req).await?)? {
        println!("No overlay is showing.");
    }
    Ok(())
}

pub async fn watch() -> Result<()> {
    println!("Waiting for overlay dismissals (Ctrl-C to quit)...");
    loop {
        tokio::select! {
            response = request(IpcRequest::WaitOverlayDismissed) => match response? {
                IpcResponse::Dismissed(event) => println!(
                    "{} prayer completed for {} (overlay {})",
                    event.dismissed_at.with_timezone(&chrono::Local).format("%H:%M:%S"),
                    event.handle.triggering_app,
                    event.handle.id
                ),
                other => anyhow::bail!("Unexpected response from daemon: {other:?}"),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
