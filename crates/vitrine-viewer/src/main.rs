//! Vitrine - Headless viewer host
//!
//! Loads a glTF bundle into a viewer session, drives it from a simulated
//! display refresh, and optionally captures a still of the first draw.

mod config;
mod harvest;
mod renderer;

use anyhow::{Context, Result};
use clap::Parser;
use renderer::{HeadlessRenderer, SnapshotSlot};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use vitrine_core::{apply_assignment, Framing, ViewerSession};
use vitrine_gltf::GltfDecoder;

#[derive(Parser, Debug)]
#[command(name = "vitrine")]
#[command(about = "Headless glTF viewer session with auto-framing and clip playback")]
#[command(version)]
struct Args {
    /// glTF/GLB file, directory bundle, or http(s) URL
    bundle: Option<String>,

    /// Path to configuration file
    #[arg(short, long, default_value = "vitrine.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Refresh ticks to run (overrides the config file)
    #[arg(long)]
    frames: Option<u32>,

    /// Presentation option as name=value, applied after the config file
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Write the first completed draw after loading as JSON
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Vitrine v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::load_config(&args.config)?;
    if let Some(frames) = args.frames {
        config.host.frames = frames;
    }

    let renderer = HeadlessRenderer::new();
    let snapshot_slot = renderer.snapshot_slot();
    let decoder = GltfDecoder::new().context("Failed to create HTTP client")?;
    let mut session = ViewerSession::new(Arc::new(decoder), renderer, config.camera);

    session.set_viewport(config.host.width, config.host.height);
    session.set_overlay_color(config.overlay.color);
    config
        .viewer
        .apply_to(&mut session)
        .context("Invalid [viewer] configuration")?;
    for assignment in &args.set {
        let outcome = apply_assignment(&mut session, assignment)
            .with_context(|| format!("Invalid --set {assignment}"))?;
        info!(assignment = %assignment, ?outcome, "Applied option");
    }

    info!(
        refresh_hz = config.host.refresh_hz,
        frames = config.host.frames,
        width = config.host.width,
        height = config.host.height,
        "Configuration loaded"
    );

    if let Some(source) = &args.bundle {
        let bundle = harvest::harvest(source)?;
        session
            .load_asset(bundle)
            .await
            .with_context(|| format!("Failed to load {source}"))?;
    }

    if let Some(path) = args.snapshot.clone() {
        let slot = snapshot_slot.clone();
        let _ = session.on_post_draw(move || {
            if let Err(e) = write_snapshot(&slot, &path) {
                warn!(path = %path.display(), error = %e, "Failed to write snapshot");
            }
        });
    }

    run_refresh_loop(&mut session, config.host.refresh_hz, config.host.frames).await;
    print_summary(&session);
    Ok(())
}

/// Feed refresh timestamps (milliseconds since start) at the configured rate
async fn run_refresh_loop(
    session: &mut ViewerSession<GltfDecoder, HeadlessRenderer>,
    refresh_hz: u32,
    frames: u32,
) {
    let period = Duration::from_secs_f64(1.0 / f64::from(refresh_hz.max(1)));
    let mut interval = tokio::time::interval(period);
    let start = Instant::now();
    for _ in 0..frames {
        interval.tick().await;
        let timestamp = start.elapsed().as_secs_f64() * 1000.0;
        session.on_refresh(timestamp);
    }
    info!(ticks = frames, draws = session.draws(), "Refresh loop finished");
}

fn write_snapshot(slot: &SnapshotSlot, path: &Path) -> Result<()> {
    let snapshot = slot
        .borrow()
        .clone()
        .context("No frame has been drawn")?;
    let json = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(path, json)?;
    info!(path = %path.display(), "Wrote snapshot");
    Ok(())
}

fn print_summary(session: &ViewerSession<GltfDecoder, HeadlessRenderer>) {
    match session.asset() {
        Some(asset) => {
            println!("Asset: {} ({})", asset.source, asset.id);
            let clips = asset.clip_names();
            if clips.is_empty() {
                println!("  Clips: none");
            } else {
                println!("  Clips: {}", clips.join(", "));
            }
            let active = session.active_clips();
            if !active.is_empty() {
                println!("  Playing: {}", active.join(", "));
            }
        }
        None => println!("Asset: none"),
    }
    match session.last_framing() {
        Framing::Placed(p) => {
            println!(
                "  Camera: position ({:.3}, {:.3}, {:.3}) target ({:.3}, {:.3}, {:.3})",
                p.position.x, p.position.y, p.position.z, p.target.x, p.target.y, p.target.z
            );
            println!(
                "  Clip planes: near {:.4} far {:.2}, distance {:.4}..{:.2}",
                p.near, p.far, p.min_distance, p.max_distance
            );
        }
        Framing::NotApplicable => println!("  Camera: not framed"),
    }
    let stats = session.handle_stats();
    println!(
        "Draws: {} (renderer {}), released assets: {}, handles minted {} revoked {}",
        session.draws(),
        session.renderer().draws(),
        session.renderer().released().len(),
        stats.minted,
        stats.revoked
    );
}
