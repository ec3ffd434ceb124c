//! relaygl-probe: entry point.
//!
//! ```text
//! relaygl-probe                   Run with relaygl-probe.toml (or defaults)
//! relaygl-probe --config <path>   Load a custom config TOML
//! relaygl-probe --gen-config      Write default config to stdout
//! relaygl-probe --json            Print the run report as JSON
//! ```

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relaygl_probe::config::ProbeConfig;
use relaygl_probe::service::ProbeService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "relaygl-probe", about = "Exercise the relaygl readback pipeline")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "relaygl-probe.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Override the number of simulated windows.
    #[arg(short, long)]
    windows: Option<u32>,

    /// Override the number of frames per window.
    #[arg(short, long)]
    frames: Option<u32>,

    /// Print the report as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ProbeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ProbeConfig::load(&cli.config);
    if let Some(windows) = cli.windows {
        config.probe.windows = windows;
    }
    if let Some(frames) = cli.frames {
        config.probe.frames = frames;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("relaygl-probe v{}", env!("CARGO_PKG_VERSION"));
    info!("compress: {:?}", config.relay.compress);
    info!("stereo: {:?}", config.relay.stereo);

    let service = ProbeService::new(config);
    let stop = service.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, stopping");
        stop.store(false, Ordering::SeqCst);
    });

    let report = service.run().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{:<12} {:>6} {:>6} {:>6} {:>8} {:>8} {:>8} {:>10}",
        "window", "local", "net", "thin", "fellback", "spoiled", "skipped", "size"
    );
    for w in &report.windows {
        let size = w
            .final_size
            .map(|(width, height)| format!("{width}x{height}"))
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<12} {:>6} {:>6} {:>6} {:>8} {:>8} {:>8} {:>10}",
            w.window, w.sent_local, w.sent_network, w.sent_thin, w.fell_back, w.spoiled, w.skipped, size
        );
        if let Some(err) = &w.error {
            println!("  error: {err}");
        }
    }
    println!("network frames received: {}", report.network_frames_received);
    Ok(())
}
