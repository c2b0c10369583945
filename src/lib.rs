//! Parlance - speech session client for cloud speech services
//!
//! This library captures a spoken utterance, ships it to a remote
//! speech-to-text endpoint, and plays remote text-to-speech audio back
//! locally, holding an expiring bearer credential in between:
//! - WAVE/PCM container codec (decode arbitrary-depth PCM, encode uploads)
//! - utterance endpointing via a rolling silence timer
//! - bearer token cache with single-flight refresh
//! - session orchestration over injected collaborators
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   SpeechSession                      │
//! │   recognize: capture → endpoint → encode → POST      │
//! │   synthesize: SSML → POST → decode → playback        │
//! └──────────┬──────────────┬──────────────┬─────────────┘
//!            │              │              │
//!      CaptureSource    Transport      Playback
//!      (cpal mic)       (reqwest)      (cpal speakers)
//!                           │
//!                     TokenProvider
//!                     (cached bearer)
//! ```

pub mod audio;
pub mod auth;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;
pub mod voice;

pub use audio::PcmBuffer;
pub use auth::{TokenCache, TokenProvider};
pub use config::Config;
pub use error::{Error, Result};
pub use session::{RecognitionResult, RecognitionStatus, SpeechSession};
pub use transport::{HttpTransport, Transport};
pub use voice::{
    CaptureSource, EndpointConfig, EndpointDetector, EndpointState, LevelSample, MicCapture,
    Playback, SpeakerPlayback,
};
