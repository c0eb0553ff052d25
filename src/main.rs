use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use yui_voice::voice::{
    Received, SAMPLE_RATE, UdpIngest, pcm_rms, pcm_to_f32, resample, samples_to_wav,
};
use yui_voice::{Config, Daemon};

/// Sample rate of XTTS voice references
const REFERENCE_SAMPLE_RATE: u32 = 22_050;

/// Yui voice front-end - UDP audio in, streamed speech out
#[derive(Parser)]
#[command(name = "yui-voice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// UDP port the capture device streams to
    #[arg(long, env = "VOICE_UDP_PORT")]
    udp_port: Option<u16>,

    /// Port of the local HTTP server
    #[arg(long, env = "HTTP_PORT")]
    http_port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print input levels from the UDP stream to tune VAD thresholds
    Levels {
        /// Duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
    },
    /// Record a voice reference from the UDP stream
    Record {
        /// Duration in seconds
        #[arg(short, long, default_value = "10")]
        duration: u64,
        /// Output WAV file
        #[arg(short, long, default_value = "reference.wav")]
        output: PathBuf,
    },
    /// Speak a text through the configured engine and device
    Say {
        /// Text to speak
        #[arg(default_value = "Bonjour, je suis Yui.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,yui_voice=info",
        1 => "info,yui_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(port) = cli.udp_port {
        config.ingest.udp_port = port;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }

    match cli.command {
        Some(Command::Levels { duration }) => levels(&config, duration).await,
        Some(Command::Record { duration, output }) => record(&config, duration, &output).await,
        Some(Command::Say { text }) => {
            let report = Daemon::new(config)?.say(&text).await?;
            println!("played {} clip(s), skipped {}", report.played, report.skipped);
            Ok(())
        }
        None => {
            let daemon = Daemon::new(config)?;
            daemon.run().await?;
            Ok(())
        }
    }
}

async fn bind_ingest(config: &Config) -> anyhow::Result<UdpIngest> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.ingest.udp_port));
    Ok(UdpIngest::bind(addr, config.ingest.recv_timeout).await?)
}

/// Print a per-second RMS and peak meter
async fn levels(config: &Config, duration: u64) -> anyhow::Result<()> {
    let mut ingest = bind_ingest(config).await?;

    println!(
        "Listening on UDP {} for {duration} seconds...",
        config.ingest.udp_port
    );
    println!(
        "speech_threshold = {} | silence_threshold = {}",
        config.vad.speech_threshold, config.vad.silence_threshold
    );
    println!("---");

    for second in 1..=duration {
        let pcm = collect(&mut ingest, Duration::from_secs(1)).await?;
        let rms = pcm_rms(&pcm);
        let peak = pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]).unsigned_abs())
            .max()
            .unwrap_or(0);

        // Visual meter, full scale at twice the speech threshold
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = ((rms / (config.vad.speech_threshold * 2.0)) * 50.0).clamp(0.0, 50.0) as usize;
        let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);
        let marker = if rms >= config.vad.speech_threshold {
            "speech"
        } else {
            ""
        };

        println!("[{second:2}s] RMS: {rms:7.1} | Peak: {peak:5} | [{meter}] {marker}");
    }

    println!("---");
    println!("No movement? Check the capture device is streaming to this host.");
    Ok(())
}

/// Capture a voice reference WAV for XTTS cloning
async fn record(config: &Config, duration: u64, output: &Path) -> anyhow::Result<()> {
    let mut ingest = bind_ingest(config).await?;

    println!("Recording {duration} seconds from UDP {}...", config.ingest.udp_port);
    println!("Speak naturally!\n");

    let pcm = collect(&mut ingest, Duration::from_secs(duration)).await?;
    if pcm.is_empty() {
        anyhow::bail!("no audio received on UDP {}", config.ingest.udp_port);
    }

    let samples = resample(&pcm_to_f32(&pcm), SAMPLE_RATE, REFERENCE_SAMPLE_RATE)?;
    let wav = samples_to_wav(&samples, REFERENCE_SAMPLE_RATE)?;
    tokio::fs::write(output, &wav).await?;

    println!(
        "Wrote {} ({} bytes, {REFERENCE_SAMPLE_RATE} Hz)",
        output.display(),
        wav.len()
    );
    println!("Set XTTS_SPEAKER_WAV to this path to use it.");
    Ok(())
}

/// Gather every datagram received within `window`
async fn collect(ingest: &mut UdpIngest, window: Duration) -> anyhow::Result<Vec<u8>> {
    let deadline = Instant::now() + window;
    let mut pcm = Vec::new();

    while Instant::now() < deadline {
        match ingest.recv().await? {
            Received::Data(bytes) => pcm.extend_from_slice(bytes),
            Received::Timeout => {}
        }
    }

    Ok(pcm)
}
