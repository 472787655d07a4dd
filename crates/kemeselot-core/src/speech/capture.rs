//! Default input device capture.
//!
//! A cpal stream cannot move between threads, so each capture gets a worker
//! thread that owns the stream and runs the detector. Dropping the stop
//! sender ends the worker, which closes the device.

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{InputCallbackInfo, SampleFormat, Stream, StreamError};
use crossbeam_channel::{Receiver, Sender};
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;

use super::detector::{DetectorConfig, VoiceDetector};
use super::{SpeechSource, VoiceActivity};

struct Capture {
    stop: Sender<()>,
    worker: JoinHandle<()>,
}

impl Capture {
    fn close(self) {
        drop(self.stop);
        if self.worker.join().is_err() {
            log::error!("Microphone thread panicked");
        }
    }
}

/// The host's default microphone
pub struct MicrophoneSource {
    config: DetectorConfig,
    capture: Mutex<Option<Capture>>,
}

impl Default for MicrophoneSource {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

impl MicrophoneSource {
    #[must_use]
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            capture: Mutex::new(None),
        }
    }

    fn capture(&self) -> Result<MutexGuard<'_, Option<Capture>>> {
        self.capture
            .lock()
            .map_err(|_| anyhow::anyhow!("Microphone lock poisoned"))
    }
}

impl SpeechSource for MicrophoneSource {
    fn acquire(&self, activity: mpsc::UnboundedSender<VoiceActivity>) -> Result<()> {
        let mut capture = self.capture()?;
        if let Some(previous) = capture.take() {
            previous.close();
        }
        *capture = Some(spawn_capture(self.config, activity)?);
        log::debug!("Microphone acquired");
        Ok(())
    }

    fn release(&self) {
        match self.capture() {
            Ok(mut capture) => {
                if let Some(current) = capture.take() {
                    current.close();
                    log::debug!("Microphone released");
                }
            }
            Err(e) => log::error!("{e}"),
        }
    }
}

/// Start the worker and wait until the device is open or has failed
fn spawn_capture(
    config: DetectorConfig,
    activity: mpsc::UnboundedSender<VoiceActivity>,
) -> Result<Capture> {
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<()>>(1);
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

    let worker = thread::Builder::new()
        .name("kemeselot-microphone".to_string())
        .spawn(move || {
            let (samples_tx, samples_rx) = crossbeam_channel::unbounded();
            let (stream, sample_rate) = match open_default_input(samples_tx) {
                Ok(opened) => opened,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            let mut detector = VoiceDetector::new(config, sample_rate);
            run_detector(&mut detector, &samples_rx, &stop_rx, &activity);
            drop(stream);
        })
        .context("Failed to start microphone thread")?;

    let opened = ready_rx
        .recv()
        .unwrap_or_else(|_| Err(anyhow::anyhow!("Microphone thread exited early")));
    match opened {
        Ok(()) => Ok(Capture {
            stop: stop_tx,
            worker,
        }),
        Err(e) => {
            if worker.join().is_err() {
                log::error!("Microphone thread panicked");
            }
            Err(e)
        }
    }
}

fn run_detector(
    detector: &mut VoiceDetector,
    samples: &Receiver<Vec<f32>>,
    stop: &Receiver<()>,
    activity: &mpsc::UnboundedSender<VoiceActivity>,
) {
    loop {
        crossbeam_channel::select! {
            recv(samples) -> chunk => {
                let Ok(chunk) = chunk else { break };
                if let Some(change) = detector.process(&chunk) {
                    log::debug!("Voice activity: {change:?}");
                    if activity.send(change).is_err() {
                        break;
                    }
                }
            }
            recv(stop) -> _ => break,
        }
    }
}

/// Open and start the default input device; chunks arrive downmixed to mono
fn open_default_input(samples: Sender<Vec<f32>>) -> Result<(Stream, u32)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .context("No microphone found")?;
    let supported = device
        .default_input_config()
        .context("Failed to read microphone configuration")?;

    let sample_rate = supported.sample_rate().0;
    let channels = usize::from(supported.channels());
    let config = supported.config();

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &InputCallbackInfo| {
                let _ = samples.send(downmix(data, channels, |s| s));
            },
            report_stream_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &InputCallbackInfo| {
                let _ = samples.send(downmix(data, channels, |s| f32::from(s) / 32768.0));
            },
            report_stream_error,
            None,
        ),
        SampleFormat::U16 => device.build_input_stream(
            &config,
            move |data: &[u16], _: &InputCallbackInfo| {
                let _ = samples.send(downmix(data, channels, |s| {
                    (f32::from(s) - 32768.0) / 32768.0
                }));
            },
            report_stream_error,
            None,
        ),
        format => anyhow::bail!("Unsupported microphone sample format: {format:?}"),
    }
    .context("Failed to open microphone")?;

    stream.play().context("Failed to start microphone")?;
    log::info!(
        "Microphone open: {} ({sample_rate} Hz, {channels} channels)",
        device.name().unwrap_or_else(|_| "unknown device".to_string())
    );
    Ok((stream, sample_rate))
}

fn report_stream_error(e: StreamError) {
    log::error!("Microphone stream error: {e}");
}

#[allow(clippy::cast_precision_loss)]
fn downmix<T: Copy>(data: &[T], channels: usize, to_f32: impl Fn(T) -> f32) -> Vec<f32> {
    data.chunks(channels.max(1))
        .map(|frame| frame.iter().map(|&s| to_f32(s)).sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_averages_channels() {
        let stereo = [0.5_f32, -0.5, 1.0, 0.0];
        assert_eq!(downmix(&stereo, 2, |s| s), vec![0.0, 0.5]);

        let mono = [i16::MAX, 0];
        let converted = downmix(&mono, 1, |s| f32::from(s) / 32768.0);
        assert!((converted[0] - 1.0).abs() < 0.001);
        assert_eq!(converted[1], 0.0);
    }

    #[test]
    fn test_run_detector_stops_when_released() {
        let (samples_tx, samples_rx) = crossbeam_channel::unbounded();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let (activity_tx, mut activity_rx) = mpsc::unbounded_channel();

        let loud: Vec<f32> = (0..1600)
            .map(|i| if i % 2 == 0 { 0.3 } else { -0.3 })
            .collect();
        samples_tx.send(loud).unwrap();

        let worker = thread::spawn(move || {
            let mut detector = VoiceDetector::new(DetectorConfig::default(), 16_000);
            run_detector(&mut detector, &samples_rx, &stop_rx, &activity_tx);
        });
        assert_eq!(activity_rx.blocking_recv(), Some(VoiceActivity::Started));

        drop(stop_tx);
        worker.join().unwrap();
        drop(samples_tx);
    }
}
