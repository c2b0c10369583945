//! Speech session orchestration
//!
//! Composes the codec, endpoint detector, and token cache with the
//! transport/capture/playback collaborators into the two user-facing flows.
//! Collaborators are injected at construction; there is no process-wide
//! session. Both flows take `&mut self`, so a second flow cannot start
//! while one is in flight.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::audio::wave;
use crate::auth::TokenProvider;
use crate::config::Config;
use crate::transport::Transport;
use crate::voice::{CaptureSource, EndpointConfig, EndpointDetector, Playback};
use crate::Result;

/// Header carrying the subscription key
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Outcome reported by the recognition service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionStatus {
    /// Speech was recognized
    Success,
    /// Audio contained speech the service could not match
    NoMatch,
    /// The utterance started with too much silence
    InitialSilenceTimeout,
    /// The utterance contained only noise
    BabbleTimeout,
    /// Service-side error, or a status this client does not know
    Error,
}

/// Result of one recognize flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionResult {
    /// Enumerated outcome
    pub status: RecognitionStatus,
    /// Recognized text; empty unless `status` is `Success`
    pub display_text: String,
}

/// Wire shape of the recognition response body
#[derive(serde::Deserialize)]
struct RawRecognition {
    #[serde(rename = "RecognitionStatus")]
    status: String,
    #[serde(rename = "DisplayText", default)]
    display_text: String,
}

impl RecognitionResult {
    /// Parse a recognition response body
    ///
    /// # Errors
    ///
    /// Returns error if the body is not the expected JSON shape.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let raw: RawRecognition = serde_json::from_slice(body)?;
        let status = match raw.status.as_str() {
            "Success" => RecognitionStatus::Success,
            "NoMatch" => RecognitionStatus::NoMatch,
            "InitialSilenceTimeout" => RecognitionStatus::InitialSilenceTimeout,
            "BabbleTimeout" => RecognitionStatus::BabbleTimeout,
            other => {
                if other != "Error" {
                    tracing::warn!(status = other, "unknown recognition status");
                }
                RecognitionStatus::Error
            }
        };
        Ok(Self {
            status,
            display_text: raw.display_text,
        })
    }
}

/// One speech session: owns its collaborators and the token provider.
///
/// A failed flow leaves the token cache and detector state ready for the
/// next invocation; callers may simply re-invoke.
pub struct SpeechSession {
    config: Config,
    transport: Arc<dyn Transport>,
    tokens: TokenProvider,
    subscription_key: SecretString,
    capture: Box<dyn CaptureSource>,
    playback: Box<dyn Playback>,
}

impl SpeechSession {
    /// Create a session from configuration and injected collaborators
    ///
    /// # Errors
    ///
    /// Returns error if no subscription key is configured.
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        capture: Box<dyn CaptureSource>,
        playback: Box<dyn Playback>,
    ) -> Result<Self> {
        let subscription_key = config.subscription_key()?;
        let tokens = TokenProvider::new(
            Arc::clone(&transport),
            config.service.token_url.clone(),
            subscription_key.clone(),
            config.token_ttl(),
        );

        Ok(Self {
            config,
            transport,
            tokens,
            subscription_key,
            capture,
            playback,
        })
    }

    /// Record one utterance and recognize it.
    ///
    /// Captures until the silence threshold ends the utterance, encodes the
    /// audio as WAVE, and submits it to the recognition endpoint. Both
    /// success and failure travel the returned `Result`.
    ///
    /// # Errors
    ///
    /// Returns error if capture, credential refresh, transport, or response
    /// parsing fails.
    pub async fn recognize(&mut self) -> Result<RecognitionResult> {
        tracing::info!("recording");
        self.capture.start()?;

        let mut detector = EndpointDetector::new(EndpointConfig {
            minimum_level: self.config.listening.minimum_level,
            silence_threshold: self.config.silence_threshold(),
        });

        while let Some(sample) = self.capture.next_level().await {
            if detector.on_level(sample.level, sample.elapsed) {
                break;
            }
        }

        let buffer = self.capture.stop_and_retrieve()?;
        tracing::info!(
            frames = buffer.frame_count(),
            duration = ?buffer.duration(),
            "utterance captured"
        );

        let token = self.tokens.bearer().await?;
        let wav = wave::encode(&buffer);

        let url = format!(
            "{}?language={}",
            self.config.service.stt_url, self.config.stt.language
        );
        let headers = [
            (SUBSCRIPTION_KEY_HEADER, self.subscription_key.expose_secret().to_string()),
            ("Authorization", format!("Bearer {token}")),
            (
                "Content-Type",
                format!(
                    "audio/wav; codec=audio/pcm; samplerate={}",
                    buffer.sample_rate()
                ),
            ),
        ];

        let body = self.transport.post(&url, &headers, wav).await?;
        let result = RecognitionResult::from_json(&body)?;

        tracing::info!(status = ?result.status, text = %result.display_text, "recognition complete");
        Ok(result)
    }

    /// Synthesize `text` and play it back.
    ///
    /// # Errors
    ///
    /// Returns error if credential refresh, transport, decoding, or
    /// playback fails.
    pub async fn synthesize(&mut self, text: &str) -> Result<()> {
        let token = self.tokens.bearer().await?;

        let ssml = build_ssml(text, &self.config.tts.language, &self.config.tts.voice);
        let headers = [
            ("Authorization", format!("Bearer {token}")),
            ("Content-Type", "application/ssml+xml".to_string()),
            (
                "X-Microsoft-OutputFormat",
                self.config.tts.output_format.clone(),
            ),
            ("User-Agent", self.config.tts.user_agent.clone()),
        ];

        let body = self
            .transport
            .post(&self.config.service.tts_url, &headers, ssml.into_bytes())
            .await?;

        let buffer = wave::decode(&body)?;
        tracing::info!(
            duration = ?buffer.duration(),
            sample_rate = buffer.sample_rate(),
            "synthesized audio decoded"
        );

        self.playback.play(buffer).await
    }
}

/// Build the synthesis request body around the escaped input text
fn build_ssml(text: &str, language: &str, voice: &str) -> String {
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='{language}'>\
         <voice name='{voice}'>{}</voice></speak>",
        escape_xml(text)
    )
}

/// Escape the five XML special characters
fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
