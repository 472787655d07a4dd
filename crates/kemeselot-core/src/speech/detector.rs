//! Energy-based voice activity detection.

use std::time::Duration;

use super::VoiceActivity;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Chunks louder than this count as speech
    pub threshold_dbfs: f32,
    /// Speech must last this long before it is reported
    pub min_speech: Duration,
    /// Silence must last this long before the speech is reported as ended
    pub redemption: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold_dbfs: -45.0,
            min_speech: Duration::from_millis(100),
            redemption: Duration::from_millis(500),
        }
    }
}

/// Turns mono sample chunks into speech start/end boundaries
#[derive(Debug)]
pub struct VoiceDetector {
    config: DetectorConfig,
    sample_rate: u32,
    in_speech: bool,
    loud_samples: u64,
    quiet_samples: u64,
}

impl VoiceDetector {
    #[must_use]
    pub fn new(config: DetectorConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            in_speech: false,
            loud_samples: 0,
            quiet_samples: 0,
        }
    }

    #[must_use]
    pub fn in_speech(&self) -> bool {
        self.in_speech
    }

    /// Feed one chunk; returns the boundary it completes, if any
    pub fn process(&mut self, chunk: &[f32]) -> Option<VoiceActivity> {
        if chunk.is_empty() {
            return None;
        }
        let len = chunk.len() as u64;

        if rms_dbfs(chunk) > self.config.threshold_dbfs {
            self.quiet_samples = 0;
            if self.in_speech {
                return None;
            }
            self.loud_samples += len;
            if self.loud_samples >= self.samples_for(self.config.min_speech) {
                self.in_speech = true;
                self.loud_samples = 0;
                return Some(VoiceActivity::Started);
            }
        } else if self.in_speech {
            self.quiet_samples += len;
            if self.quiet_samples >= self.samples_for(self.config.redemption) {
                self.in_speech = false;
                self.quiet_samples = 0;
                return Some(VoiceActivity::Ended);
            }
        } else {
            // Short noise bursts never add up to speech
            self.loud_samples = 0;
        }
        None
    }

    fn samples_for(&self, duration: Duration) -> u64 {
        let samples = u128::from(self.sample_rate) * duration.as_millis() / 1000;
        u64::try_from(samples).unwrap_or(u64::MAX)
    }
}

#[allow(clippy::cast_precision_loss)]
fn rms_dbfs(samples: &[f32]) -> f32 {
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum_sq / samples.len() as f32).sqrt();
    if rms > 0.0 {
        20.0 * rms.log10()
    } else {
        f32::NEG_INFINITY
    }
}
