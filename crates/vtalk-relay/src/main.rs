//! `vtalk` - relay server and offline mouth tracks

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use vtalk_lipsync::{decode_wav, render_track, EnvelopeConfig, FrameLoopConfig, TapConfig};
use vtalk_relay::{init_logging, parse_expressions, serve, LogFormat, RelayConfig};

#[derive(Parser)]
#[command(name = "vtalk")]
#[command(about = "Virtual character backend: TTS and chat relays with lip-sync", long_about = None)]
struct Cli {
    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP relay. Flags override VTALK_* environment variables.
    Serve {
        #[arg(long)]
        bind: Option<SocketAddr>,
        #[arg(long)]
        tts_url: Option<String>,
        #[arg(long)]
        chat_url: Option<String>,
        #[arg(long)]
        chat_model: Option<String>,
        #[arg(long)]
        speaker: Option<u32>,
        /// Upstream timeout, e.g. "30s"
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
        /// Expression overrides, e.g. "happy=exp_01,sad=exp_02"
        #[arg(long)]
        expressions: Option<String>,
    },
    /// Print the mouth track of a WAV file, one level per line
    Mouth {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value_t = 60.0)]
        fps: f32,
        #[arg(long)]
        attack: Option<f32>,
        #[arg(long)]
        decay: Option<f32>,
        #[arg(long)]
        gain: Option<f32>,
        #[arg(long)]
        gate: Option<f32>,
        /// Samples per RMS block
        #[arg(long)]
        block_size: Option<usize>,
        /// RMS to level scale
        #[arg(long)]
        level_scale: Option<f32>,
        /// Print the track as JSON instead
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    match cli.command {
        Commands::Serve {
            bind,
            tts_url,
            chat_url,
            chat_model,
            speaker,
            timeout,
            expressions,
        } => {
            let mut config = RelayConfig::from_env()?;
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            if let Some(url) = tts_url {
                config.tts_url = url;
            }
            if let Some(url) = chat_url {
                config.chat_url = url;
            }
            if let Some(model) = chat_model {
                config.chat_model = model;
            }
            if let Some(speaker) = speaker {
                config.default_speaker = speaker;
            }
            if let Some(timeout) = timeout {
                config.request_timeout = timeout;
            }
            if let Some(expressions) = expressions {
                config.expressions = parse_expressions(&expressions)?;
            }

            serve(config, shutdown_signal()).await?;
        }
        Commands::Mouth {
            input,
            fps,
            attack,
            decay,
            gain,
            gate,
            block_size,
            level_scale,
            json,
        } => {
            let defaults = EnvelopeConfig::default();
            let envelope = EnvelopeConfig {
                attack: attack.unwrap_or(defaults.attack),
                decay: decay.unwrap_or(defaults.decay),
                gain: gain.unwrap_or(defaults.gain),
                gate: gate.unwrap_or(defaults.gate),
            };
            let tap_defaults = TapConfig::default();
            let tap = TapConfig {
                block_size: block_size.unwrap_or(tap_defaults.block_size),
                level_scale: level_scale.unwrap_or(tap_defaults.level_scale),
            };

            let bytes = std::fs::read(&input)?;
            let audio = decode_wav(&bytes)?;
            let track = render_track(&audio, FrameLoopConfig { fps }, tap, &envelope)?;
            tracing::info!(
                input = %input.display(),
                frames = track.levels.len(),
                open = track.open_frames(),
                peak = track.peak(),
                "mouth track rendered"
            );

            if json {
                println!("{}", serde_json::to_string(&track)?);
            } else {
                for level in &track.levels {
                    println!("{level:.4}");
                }
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        // Without a signal handler, run until killed.
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
