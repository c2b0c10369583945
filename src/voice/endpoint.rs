//! Utterance endpointing
//!
//! Converts a stream of instantaneous level samples into a single
//! "utterance ended" boundary per listening session, using a rolling
//! silence timer with a configurable threshold.

use std::time::Duration;

/// Endpointing parameters
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    /// Levels above this still count as speech; at or below is silence
    pub minimum_level: f32,
    /// Accumulated silence that ends the utterance. A zero threshold fires
    /// on the first sample observed at or below `minimum_level`.
    pub silence_threshold: Duration,
}

/// State of the endpoint detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Consuming level samples, boundary not yet reached
    Listening,
    /// Boundary fired; stays here until [`EndpointDetector::reset`]
    Ended,
}

/// Detects the end of an utterance from a level-sample stream.
///
/// Each sample carries the level and the time elapsed since the previous
/// sample. Level delivery is serialized with respect to itself; the detector
/// is not shared across threads.
#[derive(Debug)]
pub struct EndpointDetector {
    config: EndpointConfig,
    accumulated_silence: Duration,
    state: EndpointState,
}

impl EndpointDetector {
    /// Create a detector in the `Listening` state
    #[must_use]
    pub const fn new(config: EndpointConfig) -> Self {
        Self {
            config,
            accumulated_silence: Duration::ZERO,
            state: EndpointState::Listening,
        }
    }

    /// Consume one level sample.
    ///
    /// Returns true exactly once, on the call where accumulated silence
    /// reaches the threshold (boundary inclusive). Never fires again until
    /// [`reset`](Self::reset).
    pub fn on_level(&mut self, level: f32, elapsed: Duration) -> bool {
        if self.state == EndpointState::Ended {
            return false;
        }

        if level > self.config.minimum_level {
            self.accumulated_silence = Duration::ZERO;
            return false;
        }

        self.accumulated_silence += elapsed;
        tracing::trace!(level, silence = ?self.accumulated_silence, "silence accumulating");

        if self.accumulated_silence >= self.config.silence_threshold {
            self.state = EndpointState::Ended;
            tracing::debug!(silence = ?self.accumulated_silence, "utterance ended");
            return true;
        }

        false
    }

    /// Rearm for the next utterance
    pub fn reset(&mut self) {
        self.accumulated_silence = Duration::ZERO;
        self.state = EndpointState::Listening;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> EndpointState {
        self.state
    }

    /// Silence accumulated since the last loud sample
    #[must_use]
    pub const fn accumulated_silence(&self) -> Duration {
        self.accumulated_silence
    }
}
