//! Completion ritual that gates overlay dismissal.
//!
//! The session reacts to a closed set of inputs (tick, speech start, speech
//! end, dismiss request) plus microphone lifecycle notifications. It never
//! touches timers or devices itself; the overlay runner owns those and acts
//! on the returned [`Transition`].

use kemeselot_storage::{PrayerMode, Settings};
use serde::{Deserialize, Serialize};

/// Where the ritual currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateState {
    /// Countdown advances on every tick
    Counting,
    /// Voice mode only: countdown paused until speech is detected
    WaitingForSpeech,
    /// Terminal; dismissal is allowed
    Completed,
}

/// Inputs driving the ritual
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RitualEvent {
    Tick,
    SpeechStart,
    SpeechEnd,
    DismissRequest,
}

/// Observable result of applying an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changed
    Ignored,
    /// One second elapsed
    Progressed { remaining: u32 },
    /// Speech ended; countdown paused
    Paused,
    /// Speech started; countdown running
    Resumed,
    /// Countdown reached zero. Fires exactly once per session.
    Completed { release_microphone: bool },
    DismissAccepted,
    DismissRejected,
}

/// State of one ritual, created when the overlay is raised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSession {
    pub mode: PrayerMode,
    pub total_duration: u32,
    pub remaining: u32,
    pub completed: bool,
    pub listening: bool,
    pub speech_active: bool,
    pub state: GateState,
    /// Non-fatal problem shown to the user, e.g. microphone unavailable
    pub warning: Option<String>,
}

impl LockSession {
    #[must_use]
    pub fn new(mode: PrayerMode, total_duration: u32) -> Self {
        let state = match (total_duration, mode) {
            (0, _) => GateState::Completed,
            (_, PrayerMode::Silent) => GateState::Counting,
            (_, PrayerMode::Voice) => GateState::WaitingForSpeech,
        };
        Self {
            mode,
            total_duration,
            remaining: total_duration,
            completed: state == GateState::Completed,
            listening: false,
            speech_active: false,
            state,
            warning: None,
        }
    }

    /// Copy mode and duration from the current settings
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.prayer_mode, settings.timer_duration_seconds)
    }

    #[must_use]
    pub fn can_dismiss(&self) -> bool {
        self.state == GateState::Completed
    }

    #[must_use]
    pub fn elapsed(&self) -> u32 {
        self.total_duration.saturating_sub(self.remaining)
    }

    /// Apply one input and report what happened
    pub fn apply(&mut self, event: RitualEvent) -> Transition {
        match event {
            RitualEvent::DismissRequest => {
                if self.can_dismiss() {
                    Transition::DismissAccepted
                } else {
                    Transition::DismissRejected
                }
            }
            RitualEvent::Tick => self.tick(),
            RitualEvent::SpeechStart => self.speech_started(),
            RitualEvent::SpeechEnd => self.speech_ended(),
        }
    }

    fn tick(&mut self) -> Transition {
        if self.state != GateState::Counting {
            return Transition::Ignored;
        }

        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return Transition::Progressed {
                remaining: self.remaining,
            };
        }

        let release_microphone = self.listening;
        self.state = GateState::Completed;
        self.completed = true;
        self.listening = false;
        self.speech_active = false;
        Transition::Completed { release_microphone }
    }

    fn speech_started(&mut self) -> Transition {
        if self.mode != PrayerMode::Voice || !self.listening {
            return Transition::Ignored;
        }
        match self.state {
            GateState::WaitingForSpeech => {
                self.state = GateState::Counting;
                self.speech_active = true;
                Transition::Resumed
            }
            GateState::Counting | GateState::Completed => Transition::Ignored,
        }
    }

    fn speech_ended(&mut self) -> Transition {
        if self.mode != PrayerMode::Voice || self.state != GateState::Counting {
            return Transition::Ignored;
        }
        self.state = GateState::WaitingForSpeech;
        self.speech_active = false;
        Transition::Paused
    }

    /// The microphone was acquired
    pub fn listening_started(&mut self) {
        if self.mode == PrayerMode::Voice && !self.completed {
            self.listening = true;
            self.warning = None;
        }
    }

    /// The microphone could not be acquired. Gating stays closed but the
    /// overlay keeps running.
    pub fn listening_failed(&mut self, reason: impl Into<String>) {
        self.stop_listening();
        if !self.completed {
            self.warning = Some(reason.into());
        }
    }

    /// The user paused the microphone
    pub fn listening_stopped(&mut self) {
        self.stop_listening();
    }

    fn stop_listening(&mut self) {
        self.listening = false;
        self.speech_active = false;
        if self.mode == PrayerMode::Voice && self.state == GateState::Counting {
            self.state = GateState::WaitingForSpeech;
        }
    }
}
