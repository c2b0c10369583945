//! Configuration for the parlance speech client

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable consulted before the config file for the key
const KEY_ENV_VAR: &str = "SPEECH_SUBSCRIPTION_KEY";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Remote speech service endpoints and credential settings
    pub service: ServiceConfig,
    /// Speech-to-text settings
    pub stt: SttConfig,
    /// Text-to-speech settings
    pub tts: TtsConfig,
    /// Utterance endpointing settings
    pub listening: ListeningConfig,
}

/// Speech service endpoints and credential settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Subscription key for the token endpoint; the `SPEECH_SUBSCRIPTION_KEY`
    /// environment variable takes precedence over this field
    pub subscription_key: Option<String>,
    /// Token issuance endpoint URL
    pub token_url: String,
    /// Speech-to-text endpoint URL
    pub stt_url: String,
    /// Text-to-speech endpoint URL
    pub tts_url: String,
    /// How long a fetched token is considered fresh, in seconds.
    /// The service issues 10-minute tokens; refresh at half that.
    pub token_ttl_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            subscription_key: None,
            token_url: "https://westeurope.api.cognitive.microsoft.com/sts/v1.0/issuetoken"
                .to_string(),
            stt_url:
                "https://westeurope.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1"
                    .to_string(),
            tts_url: "https://westeurope.tts.speech.microsoft.com/cognitiveservices/v1"
                .to_string(),
            token_ttl_secs: 300,
        }
    }
}

/// Speech-to-text settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Recognition language (BCP-47, e.g. "en-US")
    pub language: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
        }
    }
}

/// Text-to-speech settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Synthesis language (BCP-47)
    pub language: String,
    /// Service voice name
    pub voice: String,
    /// Output container format requested from the service
    pub output_format: String,
    /// User-Agent header sent with synthesis requests
    pub user_agent: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            language: "en-US".to_string(),
            voice: "Microsoft Server Speech Text to Speech Voice (en-US, AriaRUS)".to_string(),
            output_format: "riff-24khz-16bit-mono-pcm".to_string(),
            user_agent: "parlance".to_string(),
        }
    }
}

/// Utterance endpointing settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ListeningConfig {
    /// Minimum level still counted as speech; at or below is silence
    pub minimum_level: f32,
    /// Silence duration that ends the utterance, in milliseconds
    pub silence_threshold_ms: u64,
    /// Capture sample rate in Hz
    pub sample_rate: u32,
}

impl Default for ListeningConfig {
    fn default() -> Self {
        Self {
            minimum_level: 0.000_05,
            silence_threshold_ms: 1500,
            sample_rate: 16_000,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default config location
    /// when `path` is `None`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(default_config_path, Path::to_path_buf);

        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            tracing::debug!(path = %path.display(), "loaded config file");
            toml::from_str(&raw)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        if let Ok(key) = std::env::var(KEY_ENV_VAR) {
            config.service.subscription_key = Some(key);
        }

        Ok(config)
    }

    /// Subscription key for the token endpoint
    ///
    /// # Errors
    ///
    /// Returns error if neither the config file nor the environment provides
    /// a key.
    pub fn subscription_key(&self) -> Result<SecretString> {
        self.service
            .subscription_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| {
                Error::Config(format!(
                    "no subscription key configured (set {KEY_ENV_VAR} or service.subscription_key)"
                ))
            })
    }

    /// Token freshness window
    #[must_use]
    pub const fn token_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.service.token_ttl_secs)
    }

    /// Silence duration that ends an utterance
    #[must_use]
    pub const fn silence_threshold(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.listening.silence_threshold_ms)
    }
}

/// Default config file path under the platform config directory
fn default_config_path() -> PathBuf {
    directories::ProjectDirs::from("dev", "parlance", "parlance").map_or_else(
        || PathBuf::from("parlance.toml"),
        |d| d.config_dir().join("config.toml"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.service.token_ttl_secs, 300);
        assert_eq!(config.listening.sample_rate, 16_000);
        assert!(config.listening.minimum_level > 0.0);
        assert_eq!(config.silence_threshold().as_millis(), 1500);
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            [service]
            subscription_key = "abc123"
            token_ttl_secs = 60

            [stt]
            language = "it-IT"
        "#;
        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.service.subscription_key.as_deref(), Some("abc123"));
        assert_eq!(config.service.token_ttl_secs, 60);
        assert_eq!(config.stt.language, "it-IT");
        // Untouched sections fall back to defaults
        assert_eq!(config.listening.silence_threshold_ms, 1500);
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let config = Config::default();
        if std::env::var(KEY_ENV_VAR).is_ok() {
            return; // environment provides one; nothing to assert
        }
        assert!(config.subscription_key().is_err());
    }
}
