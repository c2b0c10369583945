//! Session orchestration tests with mock collaborators
//!
//! No audio hardware or network: capture, playback, and transport are
//! scripted implementations of the collaborator traits.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use parlance::audio::{PcmBuffer, wave};
use parlance::voice::{CaptureSource, LevelSample, Playback};
use parlance::{
    Config, Error, RecognitionStatus, Result, SpeechSession, TokenProvider, Transport,
};
use secrecy::SecretString;

mod common;
use common::{read_u16, read_u32, sine_samples};

const TEST_KEY: &str = "test-key";
const TOKEN_BODY: &str = "token-abc";
const SUCCESS_JSON: &str = r#"{"RecognitionStatus":"Success","DisplayText":"hello world"}"#;

// --- mock transport ---

#[derive(Debug, Clone)]
struct RecordedRequest {
    url: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl RecordedRequest {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Scripted response: a body, or a transport failure with optional status
type ScriptedResponse = std::result::Result<Vec<u8>, (Option<u16>, String)>;

#[derive(Default)]
struct MockTransport {
    requests: Mutex<Vec<RecordedRequest>>,
    responses: Mutex<VecDeque<ScriptedResponse>>,
}

impl MockTransport {
    fn scripted(responses: Vec<ScriptedResponse>) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            responses: Mutex::new(responses.into()),
        })
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post(
        &self,
        url: &str,
        headers: &[(&str, String)],
        body: Vec<u8>,
    ) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(n, v)| ((*n).to_string(), v.clone()))
                .collect(),
            body,
        });

        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(body)) => Ok(body),
            Some(Err((status, message))) => Err(Error::Transport { status, message }),
            None => Err(Error::Transport {
                status: None,
                message: "no scripted response".to_string(),
            }),
        }
    }
}

// --- mock capture ---

struct MockCapture {
    levels: Arc<Mutex<VecDeque<LevelSample>>>,
    buffer: PcmBuffer,
    started: Arc<Mutex<bool>>,
}

impl MockCapture {
    fn new(levels: Vec<LevelSample>, buffer: PcmBuffer) -> Self {
        Self {
            levels: Arc::new(Mutex::new(levels.into())),
            buffer,
            started: Arc::new(Mutex::new(false)),
        }
    }

    fn level_handle(&self) -> Arc<Mutex<VecDeque<LevelSample>>> {
        Arc::clone(&self.levels)
    }
}

#[async_trait(?Send)]
impl CaptureSource for MockCapture {
    fn start(&mut self) -> Result<()> {
        *self.started.lock().unwrap() = true;
        Ok(())
    }

    async fn next_level(&mut self) -> Option<LevelSample> {
        self.levels.lock().unwrap().pop_front()
    }

    fn stop_and_retrieve(&mut self) -> Result<PcmBuffer> {
        Ok(self.buffer.clone())
    }
}

// --- mock playback ---

#[derive(Default)]
struct MockPlayback {
    played: Arc<Mutex<Vec<PcmBuffer>>>,
}

impl MockPlayback {
    fn played_handle(&self) -> Arc<Mutex<Vec<PcmBuffer>>> {
        Arc::clone(&self.played)
    }
}

#[async_trait(?Send)]
impl Playback for MockPlayback {
    async fn play(&mut self, buffer: PcmBuffer) -> Result<()> {
        self.played.lock().unwrap().push(buffer);
        Ok(())
    }
}

// --- helpers ---

fn test_config() -> Config {
    let mut config = Config::default();
    config.service.subscription_key = Some(TEST_KEY.to_string());
    config
}

/// Level samples at a constant level, one per 100 ms interval
fn constant_levels(level: f32, count: usize) -> Vec<LevelSample> {
    (0..count)
        .map(|_| LevelSample {
            level,
            elapsed: Duration::from_millis(100),
        })
        .collect()
}

/// One second of 16 kHz mono audio as the captured utterance
fn captured_second() -> PcmBuffer {
    PcmBuffer::new(16_000, 1, 16, sine_samples(16_000, 440.0, 1.0, 0.5)).unwrap()
}

// --- tests ---

#[tokio::test]
async fn recognize_flow_end_to_end() {
    let transport = MockTransport::scripted(vec![
        Ok(TOKEN_BODY.as_bytes().to_vec()),
        Ok(SUCCESS_JSON.as_bytes().to_vec()),
    ]);

    // Constant level below the 0.00005 default threshold for longer than
    // the 1.5 s silence window: the detector must fire once, mid-stream.
    let capture = MockCapture::new(constant_levels(0.000_01, 20), captured_second());
    let leftover = capture.level_handle();

    let mut session = SpeechSession::new(
        test_config(),
        transport.clone(),
        Box::new(capture),
        Box::new(MockPlayback::default()),
    )
    .unwrap();

    let result = session.recognize().await.unwrap();
    assert_eq!(result.status, RecognitionStatus::Success);
    assert_eq!(result.display_text, "hello world");

    // Boundary fired at 1.5 s = 15 intervals; the rest were never consumed
    assert_eq!(leftover.lock().unwrap().len(), 5);

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);

    // Token request carries the subscription key
    let token_req = &requests[0];
    assert!(token_req.url.contains("issuetoken"));
    assert_eq!(token_req.header("Ocp-Apim-Subscription-Key"), Some(TEST_KEY));

    // Recognition request: language query, bearer auth, WAV body whose
    // format chunk reports mono 16 kHz 16-bit
    let stt_req = &requests[1];
    assert!(stt_req.url.ends_with("?language=en-US"));
    assert_eq!(
        stt_req.header("Authorization"),
        Some(format!("Bearer {TOKEN_BODY}").as_str())
    );
    assert_eq!(
        stt_req.header("Content-Type"),
        Some("audio/wav; codec=audio/pcm; samplerate=16000")
    );
    assert_eq!(&stt_req.body[0..4], b"RIFF");
    assert_eq!(read_u16(&stt_req.body, 22), 1);
    assert_eq!(read_u32(&stt_req.body, 24), 16_000);
    assert_eq!(read_u16(&stt_req.body, 34), 16);
}

#[tokio::test]
async fn synthesize_flow_decodes_and_plays() {
    let spoken = PcmBuffer::new(24_000, 1, 16, sine_samples(24_000, 300.0, 0.2, 0.4)).unwrap();
    let transport = MockTransport::scripted(vec![
        Ok(TOKEN_BODY.as_bytes().to_vec()),
        Ok(wave::encode(&spoken)),
    ]);

    let playback = MockPlayback::default();
    let played = playback.played_handle();

    let mut session = SpeechSession::new(
        test_config(),
        transport.clone(),
        Box::new(MockCapture::new(Vec::new(), captured_second())),
        Box::new(playback),
    )
    .unwrap();

    session.synthesize("hello <world> & friends").await.unwrap();

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);

    let tts_req = &requests[1];
    assert_eq!(tts_req.header("Content-Type"), Some("application/ssml+xml"));
    assert_eq!(
        tts_req.header("X-Microsoft-OutputFormat"),
        Some("riff-24khz-16bit-mono-pcm")
    );
    assert_eq!(tts_req.header("User-Agent"), Some("parlance"));
    let ssml = String::from_utf8(tts_req.body.clone()).unwrap();
    assert!(ssml.contains("hello &lt;world&gt; &amp; friends"));

    let played = played.lock().unwrap();
    assert_eq!(played.len(), 1);
    assert_eq!(played[0].sample_rate(), 24_000);
    assert_eq!(played[0].samples().len(), spoken.samples().len());
}

#[tokio::test]
async fn token_is_reused_while_fresh() {
    let transport = MockTransport::scripted(vec![
        Ok(TOKEN_BODY.as_bytes().to_vec()),
        Ok(SUCCESS_JSON.as_bytes().to_vec()),
        Ok(SUCCESS_JSON.as_bytes().to_vec()),
    ]);

    let capture = MockCapture::new(constant_levels(0.000_01, 30), captured_second());
    let mut session = SpeechSession::new(
        test_config(),
        transport.clone(),
        Box::new(capture),
        Box::new(MockPlayback::default()),
    )
    .unwrap();

    session.recognize().await.unwrap();
    session.recognize().await.unwrap();

    // One token fetch, two recognition posts
    let urls: Vec<String> = transport.requests().iter().map(|r| r.url.clone()).collect();
    assert_eq!(urls.iter().filter(|u| u.contains("issuetoken")).count(), 1);
    assert_eq!(urls.iter().filter(|u| u.contains("stt")).count(), 2);
}

#[tokio::test]
async fn transport_failure_leaves_session_reusable() {
    let transport = MockTransport::scripted(vec![
        Ok(TOKEN_BODY.as_bytes().to_vec()),
        Err((Some(503), "service busy".to_string())),
        Ok(SUCCESS_JSON.as_bytes().to_vec()),
    ]);

    let capture = MockCapture::new(constant_levels(0.000_01, 30), captured_second());
    let mut session = SpeechSession::new(
        test_config(),
        transport.clone(),
        Box::new(capture),
        Box::new(MockPlayback::default()),
    )
    .unwrap();

    let err = session.recognize().await.unwrap_err();
    assert!(matches!(err, Error::Transport { status: Some(503), .. }));

    // The cached token survives the failed flow; the retry goes straight to
    // the recognition endpoint.
    let result = session.recognize().await.unwrap();
    assert_eq!(result.status, RecognitionStatus::Success);

    let urls: Vec<String> = transport.requests().iter().map(|r| r.url.clone()).collect();
    assert_eq!(urls.iter().filter(|u| u.contains("issuetoken")).count(), 1);
}

#[tokio::test]
async fn failed_token_refresh_is_credential_unavailable() {
    let transport = MockTransport::scripted(vec![Err((Some(401), "bad key".to_string()))]);

    let capture = MockCapture::new(constant_levels(0.000_01, 20), captured_second());
    let mut session = SpeechSession::new(
        test_config(),
        transport,
        Box::new(capture),
        Box::new(MockPlayback::default()),
    )
    .unwrap();

    let err = session.recognize().await.unwrap_err();
    assert!(matches!(err, Error::CredentialUnavailable(_)));
}

#[tokio::test]
async fn empty_token_body_is_credential_unavailable() {
    let transport = MockTransport::scripted(vec![Ok(b"   \n".to_vec())]);

    let mut session = SpeechSession::new(
        test_config(),
        transport,
        Box::new(MockCapture::new(Vec::new(), captured_second())),
        Box::new(MockPlayback::default()),
    )
    .unwrap();

    let err = session.synthesize("hi").await.unwrap_err();
    assert!(matches!(err, Error::CredentialUnavailable(_)));
}

#[tokio::test]
async fn synthesis_of_malformed_audio_does_not_reach_playback() {
    let transport = MockTransport::scripted(vec![
        Ok(TOKEN_BODY.as_bytes().to_vec()),
        Ok(b"this is not a wave container".to_vec()),
    ]);

    let playback = MockPlayback::default();
    let played = playback.played_handle();

    let mut session = SpeechSession::new(
        test_config(),
        transport,
        Box::new(MockCapture::new(Vec::new(), captured_second())),
        Box::new(playback),
    )
    .unwrap();

    let err = session.synthesize("hi").await.unwrap_err();
    assert!(matches!(err, Error::MalformedContainer(_)));
    assert!(played.lock().unwrap().is_empty());
}

// --- single-flight refresh ---

/// Transport that counts posts and is slow enough for calls to overlap
struct SlowCountingTransport {
    posts: AtomicUsize,
}

#[async_trait]
impl Transport for SlowCountingTransport {
    async fn post(
        &self,
        _url: &str,
        _headers: &[(&str, String)],
        _body: Vec<u8>,
    ) -> Result<Vec<u8>> {
        self.posts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(TOKEN_BODY.as_bytes().to_vec())
    }
}

#[tokio::test]
async fn overlapping_bearer_calls_refresh_once() {
    let transport = Arc::new(SlowCountingTransport {
        posts: AtomicUsize::new(0),
    });
    let provider = TokenProvider::new(
        transport.clone(),
        "https://example.test/issuetoken".to_string(),
        SecretString::from(TEST_KEY),
        Duration::from_secs(300),
    );

    let (a, b) = tokio::join!(provider.bearer(), provider.bearer());
    assert_eq!(a.unwrap(), TOKEN_BODY);
    assert_eq!(b.unwrap(), TOKEN_BODY);
    assert_eq!(transport.posts.load(Ordering::SeqCst), 1);
}
