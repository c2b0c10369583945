//! Voice capture, playback, and utterance endpointing

pub mod capture;
pub mod endpoint;
pub mod playback;

pub use capture::{CaptureSource, LevelSample, MicCapture, rms_level};
pub use endpoint::{EndpointConfig, EndpointDetector, EndpointState};
pub use playback::{Playback, SpeakerPlayback};
