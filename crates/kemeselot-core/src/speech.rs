//! Microphone access and voice activity for voice-mode rituals.
//!
//! A [`SpeechSource`] owns the capture device while a [`ListeningGuard`] is
//! alive and reports speech start/end on the channel it was given. The
//! Bridge's speech reports remain available as a manual override.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::lock_gate::RitualEvent;

#[cfg(feature = "microphone")]
mod capture;
mod detector;

#[cfg(feature = "microphone")]
pub use capture::MicrophoneSource;
pub use detector::{DetectorConfig, VoiceDetector};

/// Speech boundary detected on the microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VoiceActivity {
    Started,
    Ended,
}

impl From<VoiceActivity> for RitualEvent {
    fn from(activity: VoiceActivity) -> Self {
        match activity {
            VoiceActivity::Started => RitualEvent::SpeechStart,
            VoiceActivity::Ended => RitualEvent::SpeechEnd,
        }
    }
}

/// Capture device used by voice-mode rituals
pub trait SpeechSource: Send + Sync {
    /// Open the capture device and start reporting voice activity to
    /// `activity` until [`SpeechSource::release`] is called
    ///
    /// # Errors
    ///
    /// Returns an error if no microphone could be opened
    fn acquire(&self, activity: mpsc::UnboundedSender<VoiceActivity>) -> Result<()>;

    /// Close the capture device
    fn release(&self);
}

/// Stands in for the microphone on builds without audio capture
pub struct NoMicrophone;

impl SpeechSource for NoMicrophone {
    fn acquire(&self, _activity: mpsc::UnboundedSender<VoiceActivity>) -> Result<()> {
        anyhow::bail!("Microphone support is not built in")
    }

    fn release(&self) {}
}

/// Speech source for this host
#[must_use]
pub fn default_source() -> Arc<dyn SpeechSource> {
    #[cfg(feature = "microphone")]
    {
        Arc::new(MicrophoneSource::default())
    }

    #[cfg(not(feature = "microphone"))]
    {
        Arc::new(NoMicrophone)
    }
}

/// Scoped microphone acquisition; released on drop
pub struct ListeningGuard {
    source: Arc<dyn SpeechSource>,
}

impl ListeningGuard {
    /// Acquire the microphone from `source`
    ///
    /// # Errors
    ///
    /// Returns the acquisition error of the source
    pub fn acquire(
        source: Arc<dyn SpeechSource>,
        activity: mpsc::UnboundedSender<VoiceActivity>,
    ) -> Result<Self> {
        source.acquire(activity)?;
        Ok(Self { source })
    }
}

impl Drop for ListeningGuard {
    fn drop(&mut self) {
        self.source.release();
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{SpeechSource, VoiceActivity};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Counts acquisitions and releases; can be told to fail
    #[derive(Default)]
    pub struct FakeSpeech {
        pub fail: AtomicBool,
        pub acquired: AtomicUsize,
        pub released: AtomicUsize,
        activity: Mutex<Option<mpsc::UnboundedSender<VoiceActivity>>>,
    }

    impl FakeSpeech {
        pub fn failing() -> Self {
            let fake = Self::default();
            fake.fail.store(true, Ordering::SeqCst);
            fake
        }

        pub fn held(&self) -> usize {
            self.acquired.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
        }

        /// Report `activity` as if the detector heard it. False while released.
        pub fn detect(&self, activity: VoiceActivity) -> bool {
            self.activity
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|tx| tx.send(activity).is_ok())
        }
    }

    impl SpeechSource for FakeSpeech {
        fn acquire(&self, activity: mpsc::UnboundedSender<VoiceActivity>) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("Microphone unavailable");
            }
            self.acquired.fetch_add(1, Ordering::SeqCst);
            *self.activity.lock().unwrap() = Some(activity);
            Ok(())
        }

        fn release(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
            *self.activity.lock().unwrap() = None;
        }
    }
}
