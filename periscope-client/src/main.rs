//! Periscope stream probe — entry point.
//!
//! ```text
//! periscope-client                     Probe 127.0.0.1:9876
//! periscope-client --host 10.0.0.5    Probe a specific server
//! periscope-client --config <path>    Use custom config TOML
//! periscope-client --gen-config       Dump default config and exit
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use periscope_core::ScreenSession;

use periscope_client::config::ClientConfig;
use periscope_client::probe::{
    DiscardAudioSink, ProbeAudioFactory, ProbeVideoFactory, TraceRenderSink,
};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "periscope-client",
    about = "Headless probe for remote-screen stream servers"
)]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "periscope-client.toml")]
    config: PathBuf,

    /// Server to probe (overrides config). Port defaults to 9876.
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.network.host = host;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("periscope-client v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Build the session ────────────────────────────────────

    let session = ScreenSession::new(
        &config.network.host,
        config.session_config(),
        Arc::new(ProbeVideoFactory),
        Arc::new(ProbeAudioFactory),
        Box::new(TraceRenderSink::default()),
        Box::new(DiscardAudioSink::default()),
    );
    let handles = session.handles();
    let mut state_rx = handles.state.clone();

    info!(host = %config.network.host, "probing stream server");
    let mut session_task = tokio::spawn(session.run());

    // ── 2. Status loop ──────────────────────────────────────────

    let mut stats_tick = tokio::time::interval(Duration::from_secs(5));
    let outcome = loop {
        tokio::select! {
            res = &mut session_task => break res,

            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping");
                handles.stop();
            }

            Ok(()) = state_rx.changed() => {
                let state = state_rx.borrow_and_update().clone();
                info!(%state, "connection state");
            }

            _ = stats_tick.tick() => {
                let stats = handles.stats.borrow().clone();
                if stats.total_frames > 0 {
                    info!(
                        fps = format_args!("{:.1}", stats.fps),
                        frames = stats.total_frames,
                        kib = stats.total_bytes / 1024,
                        size = format_args!("{}x{}", stats.width, stats.height),
                        resyncs = stats.resyncs,
                        decode_failures = stats.decode_failures,
                        "stream stats"
                    );
                }
            }
        }
    };

    // ── 3. Shutdown ─────────────────────────────────────────────

    let stats = handles.stats.borrow().clone();
    info!(
        frames = stats.total_frames,
        kib = stats.total_bytes / 1024,
        resyncs = stats.resyncs,
        dropped_audio = stats.dropped_audio_bytes,
        "final stream totals"
    );

    match outcome {
        Ok(Ok(())) => {
            info!("probe finished");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "session failed");
            Err(e.into())
        }
        Err(join) => {
            error!(error = %join, "session task panicked");
            Err(join.into())
        }
    }
}
