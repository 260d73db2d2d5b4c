//! wykit CLI — framed TTS server and its client tooling.
//!
//! ```text
//! wykit serve  [--host 0.0.0.0] [--port 10200] [--backend tone|kokoro]
//! wykit speak  "hello world" out.wav [--voice expr-voice-5-m] [--sample-rate 24000]
//! wykit voices [--host 127.0.0.1] [--port 10200]
//! wykit health [--host 127.0.0.1] [--port 10200] [--timeout 10]
//! ```
//!
//! `health` exits 0 when healthy, 1 on a protocol or unexpected response,
//! 2 on a connection error or timeout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wykit_lib::backend::kokoro::DEFAULT_KOKORO_URL;
use wykit_lib::backend::{KokoroSynthesizer, ToneSynthesizer};
use wykit_lib::client::Client;
use wykit_lib::server::Server;
use wykit_lib::session::SessionContext;
use wykit_lib::synth::{SynthService, Synthesizer};
use wykit_lib::wykit_core::types::{
    ServerConfig, SessionLimits, TtsRequest, DEFAULT_HOST, DEFAULT_MAX_FRAME_LEN,
    DEFAULT_MAX_TEXT_CHARS, DEFAULT_PORT, DEFAULT_SAMPLE_RATE, DEFAULT_SPEED, DEFAULT_VOICE,
};
use wykit_lib::wykit_core::VoiceRegistry;

/// wykit — length-prefixed TCP text-to-speech server
#[derive(Parser)]
#[command(name = "wykit", version, about)]
struct Cli {
    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the TTS server
    Serve(ServeArgs),
    /// Synthesize text on a running server and save the WAV
    Speak(SpeakArgs),
    /// List the voices a running server accepts
    Voices(ConnectArgs),
    /// End-to-end readiness check against a running server
    Health(ConnectArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum BackendKind {
    /// Built-in deterministic tone renderer
    Tone,
    /// Remote Kokoro server over HTTP
    Kokoro,
}

#[derive(Args)]
struct ServeArgs {
    /// Listen host
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    host: String,
    /// Listen port
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Default voice; must be offered by the backend
    #[arg(long, env = "VOICE", default_value = DEFAULT_VOICE)]
    voice: String,
    /// Default speech speed
    #[arg(long, env = "SPEED", default_value_t = DEFAULT_SPEED)]
    speed: f64,
    /// Default output sample rate
    #[arg(long, env = "SAMPLE_RATE", default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,
    /// Largest accepted request frame
    #[arg(long, env = "MAX_FRAME_BYTES", default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_bytes: usize,
    /// Longest accepted text, in characters
    #[arg(long, env = "MAX_TEXT_CHARS", default_value_t = DEFAULT_MAX_TEXT_CHARS)]
    max_text_chars: usize,
    /// Per-frame read deadline; 0 waits forever
    #[arg(long, env = "READ_TIMEOUT_SECS", default_value_t = 30)]
    read_timeout_secs: u64,
    /// How long in-flight sessions may run after a shutdown signal
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = 10)]
    shutdown_grace_secs: u64,
    /// Synthesis calls allowed to run at once
    #[arg(long, env = "SYNTH_CONCURRENCY", default_value_t = 1)]
    synth_concurrency: usize,
    /// Synthesis backend
    #[arg(long, env = "BACKEND", value_enum, default_value_t = BackendKind::Tone)]
    backend: BackendKind,
    /// Kokoro server URL, for --backend kokoro
    #[arg(long, env = "KOKORO_URL", default_value = DEFAULT_KOKORO_URL)]
    kokoro_url: String,
}

impl ServeArgs {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            host: self.host.clone(),
            port: self.port,
            default_voice: self.voice.clone(),
            default_speed: self.speed,
            default_sample_rate: self.sample_rate,
            limits: SessionLimits {
                max_frame_len: self.max_frame_bytes,
                max_text_chars: self.max_text_chars,
                read_timeout: (self.read_timeout_secs > 0)
                    .then(|| Duration::from_secs(self.read_timeout_secs)),
            },
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
            synth_concurrency: self.synth_concurrency,
        }
    }
}

#[derive(Args)]
struct ConnectArgs {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Seconds to wait for the whole exchange
    #[arg(long, default_value_t = 10.0)]
    timeout: f64,
}

impl ConnectArgs {
    fn client(&self) -> Result<Client> {
        let timeout = Duration::try_from_secs_f64(self.timeout)
            .with_context(|| format!("invalid --timeout {}", self.timeout))?;
        Ok(Client::new(format!("{}:{}", self.host, self.port)).with_timeout(timeout))
    }
}

#[derive(Args)]
struct SpeakArgs {
    /// Text to synthesize
    #[arg(default_value = "This is a test of the wykit server.")]
    text: String,
    /// Where to save the WAV
    #[arg(default_value = "out.wav")]
    output: PathBuf,
    /// Voice id
    #[arg(long, env = "VOICE", default_value = DEFAULT_VOICE)]
    voice: String,
    /// Speech speed
    #[arg(long, env = "SPEED", default_value_t = DEFAULT_SPEED)]
    speed: f64,
    /// Output sample rate
    #[arg(long, env = "SAMPLE_RATE", default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,
    #[command(flatten)]
    connect: ConnectArgs,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Speak(args) => speak(args).await,
        Command::Voices(args) => voices(args).await,
        Command::Health(args) => health(args).await,
    }
}

/// Logs go to stderr so `speak`/`voices` output stays clean.
fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

async fn serve(args: ServeArgs) -> Result<ExitCode> {
    let config = args.server_config();

    let backend: Arc<dyn Synthesizer> = match args.backend {
        BackendKind::Tone => Arc::new(ToneSynthesizer::new()),
        BackendKind::Kokoro => Arc::new(
            KokoroSynthesizer::connect(&args.kokoro_url)
                .await
                .with_context(|| format!("failed to load kokoro backend at {}", args.kokoro_url))?,
        ),
    };
    let synth = SynthService::new(backend, config.synth_concurrency);

    let registry = VoiceRegistry::from_capabilities(synth.capabilities())
        .with_context(|| format!("{} backend offers no voices", synth.backend_name()))?;
    info!(
        backend = synth.backend_name(),
        concurrency = synth.concurrency(),
        "{} voices: {}",
        registry.len(),
        registry.list_voices().join(", ")
    );
    if !registry.contains(&config.default_voice) {
        warn!(
            "default voice {} is not offered by the {} backend",
            config.default_voice,
            synth.backend_name()
        );
    }
    info!(
        voice = %config.default_voice,
        speed = config.default_speed,
        sample_rate = config.default_sample_rate,
        "client defaults"
    );

    let ctx = SessionContext::new(Arc::new(registry), synth, config.limits);
    let addr = config.bind_addr();
    let server = Server::bind(&addr, ctx)
        .await
        .with_context(|| format!("failed to bind {addr}"))?
        .with_shutdown_grace(config.shutdown_grace);

    server.run().await.context("server error")?;
    Ok(ExitCode::SUCCESS)
}

async fn speak(args: SpeakArgs) -> Result<ExitCode> {
    let client = args.connect.client()?;
    let request = TtsRequest::new(&args.voice, args.speed, args.sample_rate);
    let audio = client
        .synthesize(&request, &args.text)
        .await
        .with_context(|| format!("TTS request to {} failed", client.addr()))?;

    tokio::fs::write(&args.output, &audio.wav)
        .await
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    println!(
        "Saved WAV to {} (sr={}, voice={}, bytes={})",
        args.output.display(),
        audio.header.sample_rate,
        audio.header.voice,
        audio.wav.len()
    );
    Ok(ExitCode::SUCCESS)
}

async fn voices(args: ConnectArgs) -> Result<ExitCode> {
    let client = args.client()?;
    let voices = client
        .voices()
        .await
        .with_context(|| format!("voice query to {} failed", client.addr()))?;
    for voice in voices {
        println!("{voice}");
    }
    Ok(ExitCode::SUCCESS)
}

async fn health(args: ConnectArgs) -> Result<ExitCode> {
    let client = args.client()?;
    match client.health_check().await {
        Ok(report) if report.is_healthy() => {
            println!(
                "healthy: sr={}, voice={}, wav_bytes={}, elapsed_ms={}",
                report.header.sample_rate,
                report.header.voice,
                report.wav_bytes,
                report.elapsed.as_millis()
            );
            Ok(ExitCode::SUCCESS)
        }
        Ok(report) => {
            eprintln!(
                "unhealthy: unexpected header or payload (header={:?}, bytes={})",
                report.header, report.wav_bytes
            );
            Ok(ExitCode::from(1))
        }
        Err(e) if e.is_connection() => {
            eprintln!("unhealthy: connection error: {e}");
            Ok(ExitCode::from(2))
        }
        Err(e) => {
            eprintln!("unhealthy: {e}");
            Ok(ExitCode::from(1))
        }
    }
}
