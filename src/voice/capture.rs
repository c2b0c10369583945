//! Audio capture from microphone

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::mpsc;

use crate::audio::PcmBuffer;
use crate::{Error, Result};

/// One instantaneous level reading from the capture collaborator
#[derive(Debug, Clone, Copy)]
pub struct LevelSample {
    /// RMS level of the audio delivered since the previous sample
    pub level: f32,
    /// Time covered by that audio
    pub elapsed: Duration,
}

/// Source of level samples and, once stopped, the captured audio.
///
/// Level samples are delivered one at a time; delivery is serialized with
/// respect to itself. Implementations are driven from a single task, so the
/// trait does not require `Send` futures (the default microphone capture
/// holds a `cpal` stream, which is not `Send`).
#[async_trait(?Send)]
pub trait CaptureSource {
    /// Begin capturing. Returns once the device stream is running.
    ///
    /// # Errors
    ///
    /// Returns error if the capture device cannot be started.
    fn start(&mut self) -> Result<()>;

    /// Next level sample, or `None` when the source is exhausted
    async fn next_level(&mut self) -> Option<LevelSample>;

    /// Stop capturing and hand over everything captured since `start`
    ///
    /// # Errors
    ///
    /// Returns error if the captured audio cannot be assembled.
    fn stop_and_retrieve(&mut self) -> Result<PcmBuffer>;
}

/// Captures 16-bit mono audio from the default input device
pub struct MicCapture {
    #[allow(dead_code)]
    device: Device,
    config: StreamConfig,
    sample_rate: u32,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
    levels: Option<mpsc::UnboundedReceiver<LevelSample>>,
}

impl MicCapture {
    /// Create a capture instance at the given sample rate
    ///
    /// # Errors
    ///
    /// Returns error if no input device supports mono capture at the rate.
    pub fn new(sample_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
            .ok_or_else(|| Error::Audio("no suitable audio config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            sample_rate,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
            levels: None,
        })
    }

    /// Sample rate the device was opened at
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Captured samples so far, without stopping
    #[must_use]
    pub fn peek_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }
}

#[async_trait(?Send)]
impl CaptureSource for MicCapture {
    #[allow(clippy::cast_precision_loss)]
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.levels = Some(rx);

        let buffer = Arc::clone(&self.buffer);
        let sample_rate = f64::from(self.sample_rate);
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device".to_string()))?;

        let config = self.config.clone();

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                    let sample = LevelSample {
                        level: rms_level(data),
                        elapsed: Duration::from_secs_f64(data.len() as f64 / sample_rate),
                    };
                    // Receiver dropped means the session stopped listening.
                    let _ = tx.send(sample);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        // play() returns once the stream is running; no readiness polling.
        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    async fn next_level(&mut self) -> Option<LevelSample> {
        match self.levels.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    fn stop_and_retrieve(&mut self) -> Result<PcmBuffer> {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
        self.levels = None;

        let samples = self
            .buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();

        PcmBuffer::new(self.sample_rate, 1, 16, samples)
    }
}

/// RMS level of a block of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
