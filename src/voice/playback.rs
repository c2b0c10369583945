//! Audio playback to speakers

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleRate;

use crate::audio::PcmBuffer;
use crate::{Error, Result};

/// Sink for decoded audio. Driven from a single task, same as capture.
#[async_trait(?Send)]
pub trait Playback {
    /// Play the buffer to completion
    ///
    /// # Errors
    ///
    /// Returns error if the output device cannot play the buffer.
    async fn play(&mut self, buffer: PcmBuffer) -> Result<()>;
}

/// Plays audio to the default output device
pub struct SpeakerPlayback {
    _private: (),
}

impl SpeakerPlayback {
    /// Create a playback instance
    ///
    /// # Errors
    ///
    /// Returns error if no output device is available.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            "audio playback initialized"
        );

        Ok(Self { _private: () })
    }
}

#[async_trait(?Send)]
impl Playback for SpeakerPlayback {
    async fn play(&mut self, buffer: PcmBuffer) -> Result<()> {
        if buffer.is_empty() {
            return Ok(());
        }

        let sample_rate = buffer.sample_rate();
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        // Prefer a config matching the buffer's channel count, fall back to
        // whatever supports the sample rate.
        let in_range = |c: &cpal::SupportedStreamConfigRange| {
            c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };
        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| c.channels() == buffer.channels() && in_range(c))
            .or_else(|| {
                device
                    .supported_output_configs()
                    .ok()?
                    .find(in_range)
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();
        let out_channels = config.channels as usize;

        // Mix each source frame down to one value, then fan it out to every
        // device channel.
        let src_channels = usize::from(buffer.channels());
        #[allow(clippy::cast_precision_loss)]
        let frames: Vec<f32> = buffer
            .samples()
            .chunks(src_channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        let frame_count = frames.len();

        let frames = Arc::new(frames);
        let position = Arc::new(Mutex::new(0usize));
        let finished = Arc::new(Mutex::new(false));

        let frames_cb = Arc::clone(&frames);
        let position_cb = Arc::clone(&position);
        let finished_cb = Arc::clone(&finished);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let Ok(mut pos) = position_cb.lock() else {
                        return;
                    };

                    for out_frame in data.chunks_mut(out_channels) {
                        let value = if *pos < frames_cb.len() {
                            let v = frames_cb[*pos];
                            *pos += 1;
                            v
                        } else {
                            if let Ok(mut done) = finished_cb.lock() {
                                *done = true;
                            }
                            0.0
                        };

                        for out in out_frame.iter_mut() {
                            *out = value;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        // Poll for completion, bounded by the buffer duration plus slack.
        let timeout = buffer.duration() + Duration::from_millis(500);
        let start = std::time::Instant::now();

        loop {
            if finished.lock().map(|done| *done).unwrap_or(true) {
                break;
            }
            if start.elapsed() > timeout {
                tracing::warn!("playback did not signal completion before timeout");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Let the device drain its last buffer.
        tokio::time::sleep(Duration::from_millis(100)).await;

        drop(stream);
        tracing::debug!(frames = frame_count, "playback complete");

        Ok(())
    }
}
