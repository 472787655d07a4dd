//! Lockout overlay lifecycle.
//!
//! At most one overlay exists at a time. Each overlay runs its ritual on a
//! dedicated task that owns the [`LockSession`], the countdown timer and the
//! microphone; everything else talks to it through a channel.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use kemeselot_storage::{PrayerMode, Settings};
use serde::{Deserialize, Serialize};
use std::process::{Child, Command};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::lock_gate::{LockSession, RitualEvent, Transition};
use crate::speech::{ListeningGuard, SpeechSource, VoiceActivity};

/// Identifies one raised overlay; valid only while that overlay exists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayHandle {
    pub id: Uuid,
    pub triggering_app: String,
    pub raised_at: DateTime<Utc>,
}

impl OverlayHandle {
    fn new(triggering_app: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            triggering_app: triggering_app.to_string(),
            raised_at: Utc::now(),
        }
    }
}

/// Fired once for every ritual that completed and was dismissed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayDismissed {
    pub handle: OverlayHandle,
    pub dismissed_at: DateTime<Utc>,
}

/// Host navigation actions the overlay intercepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SystemAction {
    Back,
    TaskSwitch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionDisposition {
    /// Swallowed by the overlay
    Consumed,
    /// No overlay is showing; the action belongs to the host
    PassThrough,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShowOutcome {
    Shown(OverlayHandle),
    AlreadyShowing(OverlayHandle),
}

/// Snapshot of the current overlay for status queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayStatus {
    pub handle: OverlayHandle,
    pub session: LockSession,
}

/// The window system side of the overlay
pub trait OverlaySurface: Send + Sync {
    /// Put the lockout surface above everything else
    ///
    /// # Errors
    ///
    /// Returns an error if the surface could not be created
    fn raise(&self, handle: &OverlayHandle, settings: &Settings) -> Result<()>;

    /// Remove the lockout surface
    ///
    /// # Errors
    ///
    /// Returns an error if the surface could not be removed
    fn tear_down(&self) -> Result<()>;

    /// Whether the last raised surface is still on screen
    fn is_raised(&self) -> bool {
        true
    }
}

/// Surface used when no overlay program is configured
pub struct HeadlessSurface;

impl OverlaySurface for HeadlessSurface {
    fn raise(&self, handle: &OverlayHandle, _settings: &Settings) -> Result<()> {
        log::info!(
            "Overlay {} raised for {} (headless)",
            handle.id,
            handle.triggering_app
        );
        Ok(())
    }

    fn tear_down(&self) -> Result<()> {
        log::info!("Overlay torn down (headless)");
        Ok(())
    }
}

/// Runs an external fullscreen program as the overlay
pub struct CommandSurface {
    command: String,
    child: Mutex<Option<Child>>,
}

impl CommandSurface {
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            child: Mutex::new(None),
        }
    }

    fn child(&self) -> Result<MutexGuard<'_, Option<Child>>> {
        self.child
            .lock()
            .map_err(|_| anyhow::anyhow!("Overlay process lock poisoned"))
    }
}

impl OverlaySurface for CommandSurface {
    fn raise(&self, handle: &OverlayHandle, settings: &Settings) -> Result<()> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("Overlay command is empty"))?;

        let child = Command::new(program)
            .args(parts)
            .arg(&handle.triggering_app)
            .env("KEMESELOT_OVERLAY_ID", handle.id.to_string())
            .env("KEMESELOT_PRAYER_MODE", settings.prayer_mode.to_string())
            .env(
                "KEMESELOT_TIMER_SECONDS",
                settings.timer_duration_seconds.to_string(),
            )
            .spawn()
            .with_context(|| format!("Failed to launch overlay program '{program}'"))?;

        log::info!("Overlay process started with PID: {}", child.id());
        if let Some(mut previous) = self.child()?.replace(child) {
            // Reap the exited process being replaced
            if let Err(e) = previous.try_wait() {
                log::warn!("Failed to reap previous overlay process: {e}");
            }
        }
        Ok(())
    }

    fn tear_down(&self) -> Result<()> {
        if let Some(mut child) = self.child()?.take() {
            if child.try_wait()?.is_none() {
                child.kill().context("Failed to stop overlay process")?;
            }
            child.wait()?;
        }
        Ok(())
    }

    fn is_raised(&self) -> bool {
        let Ok(mut child) = self.child() else {
            return false;
        };
        match child.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                log::debug!("Overlay process exited: {status}");
                false
            }
            Some(Err(e)) => {
                log::warn!("Failed to query overlay process: {e}");
                false
            }
            None => false,
        }
    }
}

/// Pick the surface matching the settings
#[must_use]
pub fn create_surface(settings: &Settings) -> Arc<dyn OverlaySurface> {
    match settings.overlay_command.as_deref().map(str::trim) {
        Some(command) if !command.is_empty() => Arc::new(CommandSurface::new(command)),
        _ => Arc::new(HeadlessSurface),
    }
}

/// Inputs accepted by a running ritual
#[derive(Debug)]
enum OverlayInput {
    Event(RitualEvent),
    PauseListening,
    ResumeListening,
}

struct ActiveOverlay {
    handle: OverlayHandle,
    inputs: mpsc::UnboundedSender<OverlayInput>,
    progress: watch::Receiver<LockSession>,
    task: JoinHandle<()>,
}

impl ActiveOverlay {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Owns the single overlay
pub struct OverlayController {
    surface: Arc<dyn OverlaySurface>,
    speech: Arc<dyn SpeechSource>,
    dismissed: mpsc::UnboundedSender<OverlayDismissed>,
    tick: Duration,
    active: Mutex<Option<ActiveOverlay>>,
}

impl OverlayController {
    #[must_use]
    pub fn new(
        surface: Arc<dyn OverlaySurface>,
        speech: Arc<dyn SpeechSource>,
        dismissed: mpsc::UnboundedSender<OverlayDismissed>,
        tick: Duration,
    ) -> Self {
        Self {
            surface,
            speech,
            dismissed,
            tick,
            active: Mutex::new(None),
        }
    }

    fn active(&self) -> Result<MutexGuard<'_, Option<ActiveOverlay>>> {
        self.active
            .lock()
            .map_err(|_| anyhow::anyhow!("Overlay state lock poisoned"))
    }

    /// Raise the overlay for `triggering_app` unless one is already showing.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface could not be raised
    pub fn show(&self, triggering_app: &str, settings: &Settings) -> Result<ShowOutcome> {
        let mut active = self.active()?;
        if let Some(current) = active.as_ref().filter(|a| a.is_live()) {
            return Ok(ShowOutcome::AlreadyShowing(current.handle.clone()));
        }

        let handle = OverlayHandle::new(triggering_app);
        self.surface.raise(&handle, settings)?;

        let mut session = LockSession::from_settings(settings);
        let (voice_tx, voice_rx) = mpsc::unbounded_channel();
        let listener = if settings.prayer_mode == PrayerMode::Voice && !session.completed {
            acquire_listener(&self.speech, &mut session, &voice_tx)
        } else {
            None
        };

        let (progress_tx, progress_rx) = watch::channel(session.clone());
        let (input_tx, input_rx) = mpsc::unbounded_channel();

        let ritual = Ritual {
            handle: handle.clone(),
            settings: settings.clone(),
            session,
            listener,
            speech: self.speech.clone(),
            voice: voice_tx,
            surface: self.surface.clone(),
            dismissed: self.dismissed.clone(),
            progress: progress_tx,
        };
        let task = tokio::spawn(ritual.run(input_rx, voice_rx, self.tick));

        log::info!(
            "Overlay {} shown for {} ({} mode, {}s)",
            handle.id,
            handle.triggering_app,
            settings.prayer_mode,
            settings.timer_duration_seconds
        );

        *active = Some(ActiveOverlay {
            handle: handle.clone(),
            inputs: input_tx,
            progress: progress_rx,
            task,
        });
        Ok(ShowOutcome::Shown(handle))
    }

    fn send(&self, input: OverlayInput) -> bool {
        let Ok(active) = self.active() else {
            return false;
        };
        match active.as_ref().filter(|a| a.is_live()) {
            Some(current) => current.inputs.send(input).is_ok(),
            None => false,
        }
    }

    /// Ask the ritual to dismiss; ignored unless it has completed
    pub fn request_dismiss(&self) -> bool {
        self.send(OverlayInput::Event(RitualEvent::DismissRequest))
    }

    pub fn report_speech_started(&self) -> bool {
        self.send(OverlayInput::Event(RitualEvent::SpeechStart))
    }

    pub fn report_speech_ended(&self) -> bool {
        self.send(OverlayInput::Event(RitualEvent::SpeechEnd))
    }

    pub fn pause_listening(&self) -> bool {
        self.send(OverlayInput::PauseListening)
    }

    pub fn resume_listening(&self) -> bool {
        self.send(OverlayInput::ResumeListening)
    }

    /// Back and task-switch are always swallowed while an overlay shows
    #[must_use]
    pub fn intercept(&self, action: SystemAction) -> ActionDisposition {
        if self.is_showing() {
            log::debug!("Consumed {action:?} while overlay is showing");
            ActionDisposition::Consumed
        } else {
            ActionDisposition::PassThrough
        }
    }

    #[must_use]
    pub fn is_showing(&self) -> bool {
        self.active()
            .map(|active| active.as_ref().is_some_and(ActiveOverlay::is_live))
            .unwrap_or(false)
    }

    #[must_use]
    pub fn status(&self) -> Option<OverlayStatus> {
        let active = self.active().ok()?;
        let current = active.as_ref().filter(|a| a.is_live())?;
        let session = current.progress.borrow().clone();
        Some(OverlayStatus {
            handle: current.handle.clone(),
            session,
        })
    }

    /// Tear the overlay down without completing it (daemon shutdown)
    pub async fn shutdown(&self) {
        let current = match self.active() {
            Ok(mut active) => active.take(),
            Err(e) => {
                log::error!("{e}");
                None
            }
        };
        if let Some(current) = current {
            drop(current.inputs);
            if let Err(e) = current.task.await {
                log::error!("Overlay task failed: {e}");
            }
        }
    }
}

fn acquire_listener(
    speech: &Arc<dyn SpeechSource>,
    session: &mut LockSession,
    voice: &mpsc::UnboundedSender<VoiceActivity>,
) -> Option<ListeningGuard> {
    match ListeningGuard::acquire(speech.clone(), voice.clone()) {
        Ok(guard) => {
            session.listening_started();
            Some(guard)
        }
        Err(e) => {
            log::warn!("Voice gating disabled: {e}");
            session.listening_failed(e.to_string());
            None
        }
    }
}

/// Everything a running ritual owns
struct Ritual {
    handle: OverlayHandle,
    settings: Settings,
    session: LockSession,
    listener: Option<ListeningGuard>,
    speech: Arc<dyn SpeechSource>,
    voice: mpsc::UnboundedSender<VoiceActivity>,
    surface: Arc<dyn OverlaySurface>,
    dismissed: mpsc::UnboundedSender<OverlayDismissed>,
    progress: watch::Sender<LockSession>,
}

impl Ritual {
    async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<OverlayInput>,
        mut voice: mpsc::UnboundedReceiver<VoiceActivity>,
        tick: Duration,
    ) {
        let mut ticker = interval_at(Instant::now() + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let input = tokio::select! {
                _ = ticker.tick() => {
                    if self.closed_after_completion() {
                        OverlayInput::Event(RitualEvent::DismissRequest)
                    } else {
                        OverlayInput::Event(RitualEvent::Tick)
                    }
                }
                input = inputs.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
                Some(activity) = voice.recv() => OverlayInput::Event(activity.into()),
            };

            if self.handle_input(input) {
                self.tear_down();
                let event = OverlayDismissed {
                    handle: self.handle.clone(),
                    dismissed_at: Utc::now(),
                };
                if self.dismissed.send(event).is_err() {
                    log::warn!("No one is listening for overlay dismissal");
                }
                log::info!("Overlay {} dismissed", self.handle.id);
                return;
            }
        }

        // Controller went away before the ritual was dismissed
        self.tear_down();
        log::info!("Overlay {} closed without dismissal", self.handle.id);
    }

    /// Returns true when the overlay should be dismissed
    fn handle_input(&mut self, input: OverlayInput) -> bool {
        let dismiss = match input {
            OverlayInput::Event(event) => match self.session.apply(event) {
                Transition::Completed { release_microphone } => {
                    if release_microphone {
                        self.listener = None;
                    }
                    log::info!("Ritual for {} completed", self.handle.triggering_app);
                    false
                }
                Transition::DismissAccepted => true,
                Transition::DismissRejected => {
                    log::info!(
                        "Dismiss rejected: {}s of prayer remaining",
                        self.session.remaining
                    );
                    false
                }
                Transition::Paused => {
                    log::debug!("Speech ended, countdown paused");
                    false
                }
                Transition::Resumed => {
                    log::debug!("Speech detected, countdown running");
                    false
                }
                Transition::Progressed { .. } | Transition::Ignored => false,
            },
            OverlayInput::PauseListening => {
                self.listener = None;
                self.session.listening_stopped();
                false
            }
            OverlayInput::ResumeListening => {
                if self.session.mode == PrayerMode::Voice
                    && !self.session.completed
                    && self.listener.is_none()
                {
                    self.listener =
                        acquire_listener(&self.speech, &mut self.session, &self.voice);
                }
                false
            }
        };

        self.progress.send_replace(self.session.clone());
        dismiss
    }

    /// Re-raise a surface that went away before the ritual completed.
    /// Returns true when it was closed after completion.
    fn closed_after_completion(&mut self) -> bool {
        if self.surface.is_raised() {
            return false;
        }
        if self.session.completed {
            log::info!("Overlay {} closed after completion", self.handle.id);
            return true;
        }

        log::warn!(
            "Overlay {} closed before the prayer completed, raising it again",
            self.handle.id
        );
        if let Err(e) = self.surface.raise(&self.handle, &self.settings) {
            log::error!("Failed to raise overlay {} again: {e}", self.handle.id);
        }
        false
    }

    fn tear_down(&mut self) {
        self.listener = None;
        if let Err(e) = self.surface.tear_down() {
            log::error!("Failed to tear down overlay {}: {e}", self.handle.id);
        }
    }
}
