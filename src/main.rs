use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use parlance::voice::{CaptureSource, MicCapture, Playback, SpeakerPlayback, rms_level};
use parlance::{Config, HttpTransport, PcmBuffer, RecognitionStatus, SpeechSession};

/// Parlance - speech session client for cloud speech services
#[derive(Parser)]
#[command(name = "parlance", version, about)]
struct Cli {
    /// Path to the config file (defaults to the platform config directory)
    #[arg(short, long, env = "PARLANCE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record one utterance and print the recognized text
    Recognize,
    /// Synthesize text and play it through the speakers
    Speak {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,parlance=info",
        1 => "info,parlance=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Recognize => recognize(cli.config.as_deref()).await,
        Command::Speak { text } => speak(cli.config.as_deref(), &text).await,
        Command::TestMic { duration } => test_mic(cli.config.as_deref(), duration).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

/// Build a session with the real microphone, speakers, and HTTP transport
fn build_session(config_path: Option<&std::path::Path>) -> anyhow::Result<SpeechSession> {
    let config = Config::load(config_path)?;
    let capture = MicCapture::new(config.listening.sample_rate)?;
    let playback = SpeakerPlayback::new()?;
    let session = SpeechSession::new(
        config,
        Arc::new(HttpTransport::new()),
        Box::new(capture),
        Box::new(playback),
    )?;
    Ok(session)
}

/// Record one utterance and print the recognition result
#[allow(clippy::future_not_send)]
async fn recognize(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let mut session = build_session(config_path)?;

    println!("Listening... speak, then pause to finish.");
    let result = session.recognize().await?;

    match result.status {
        RecognitionStatus::Success => println!("Recognized: {}", result.display_text),
        status => println!("No text recognized ({status:?})"),
    }

    Ok(())
}

/// Synthesize text and play it
#[allow(clippy::future_not_send)]
async fn speak(config_path: Option<&std::path::Path>, text: &str) -> anyhow::Result<()> {
    let mut session = build_session(config_path)?;

    println!("Synthesizing: \"{text}\"");
    session.synthesize(text).await?;
    println!("Done.");

    Ok(())
}

/// Test microphone input with a level meter
#[allow(clippy::future_not_send)]
async fn test_mic(config_path: Option<&std::path::Path>, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let config = Config::load(config_path)?;
    let sample_rate = config.listening.sample_rate;
    let mut capture = MicCapture::new(sample_rate)?;
    capture.start()?;

    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        // Meter the most recent second only
        let window_start = samples.len().saturating_sub(sample_rate as usize);
        let window = &samples[window_start..];
        let energy = rms_level(window);
        let peak = window.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    let buffer = capture.stop_and_retrieve()?;

    println!("\n---");
    println!(
        "Captured {} frames ({:?}).",
        buffer.frame_count(),
        buffer.duration()
    );
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24_000u32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let buffer = PcmBuffer::new(sample_rate, 1, 16, samples)?;
    println!(
        "Playing {} frames at {} Hz...",
        buffer.frame_count(),
        sample_rate
    );

    let mut playback = SpeakerPlayback::new()?;
    playback.play(buffer).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}
