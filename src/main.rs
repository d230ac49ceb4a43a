use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use trajectory_capture::sources::{SimulatedFrameSource, SimulatedLocation, SimulatedMotion};
use trajectory_capture::{
    CaptureConfig, CaptureEvent, CaptureScheduler, CaptureSources, PayloadAssembler, PoseEncoding,
    RouteOverlay, Session, SessionWriters, Uploader,
};

/// How long to wait for queued appends before assembling anyway
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "trajectory_capture")]
#[command(
    about = "Capture pose, IMU, GPS and compass streams into a session folder",
    long_about = None
)]
struct Args {
    /// Capture duration in seconds (0 = until Ctrl-C)
    #[arg(long, default_value = "10")]
    duration: u64,

    /// Base directory for session folders
    #[arg(long, default_value = "capture_sessions")]
    output_dir: PathBuf,

    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reconstruction service endpoint (enables upload)
    #[arg(long)]
    endpoint: Option<String>,

    /// Pose file encoding (ndjson, json-array)
    #[arg(long)]
    pose_encoding: Option<PoseEncoding>,

    /// Keep writing while paused
    #[arg(long)]
    legacy_pause: bool,
}

fn load_config(args: &Args) -> Result<CaptureConfig> {
    let mut config = match &args.config {
        Some(path) => CaptureConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => CaptureConfig::default(),
    };
    if let Some(endpoint) = &args.endpoint {
        config.upload.endpoint = Some(endpoint.clone());
    }
    if let Some(encoding) = args.pose_encoding {
        config.pose_encoding = encoding;
    }
    if args.legacy_pause {
        config.pause_suppresses_writes = false;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;

    std::fs::create_dir_all(&args.output_dir)?;
    let session = Arc::new(Session::create(&args.output_dir)?);
    let layout = session.layout().clone();
    let writers = Arc::new(SessionWriters::open(&layout, &config)?);

    let sources = CaptureSources {
        frames: Arc::new(SimulatedFrameSource::default()),
        motion: Arc::new(SimulatedMotion::default()),
        location: Arc::new(SimulatedLocation::default()),
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let scheduler = CaptureScheduler::new(
        config.clone(),
        session.clone(),
        writers.clone(),
        sources,
        Some(tx),
    );

    // The overlay lives on the consuming side only
    let ui = tokio::spawn(async move {
        let mut overlay = RouteOverlay::new();
        while let Some(event) = rx.recv().await {
            match event {
                CaptureEvent::Started { session_id } => {
                    log::info!("Session {} collecting", session_id)
                }
                CaptureEvent::FrameCaptured { frame_count, position } => {
                    overlay.push_point(position);
                    log::debug!("Frame {} at ({:.2}, {:.2})", frame_count, position.x, position.y);
                }
                CaptureEvent::PauseChanged { paused } => log::info!("Paused: {}", paused),
                CaptureEvent::Stopped { frame_count } => {
                    log::info!("Stopped after {} frames", frame_count);
                    break;
                }
            }
        }
        overlay
    });

    scheduler.start()?;
    if args.duration == 0 {
        log::info!("Capturing until Ctrl-C");
        tokio::signal::ctrl_c().await?;
    } else {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.duration)) => {}
            _ = tokio::signal::ctrl_c() => log::info!("Interrupted"),
        }
    }
    scheduler.stop()?;
    drop(scheduler);

    let mut overlay = ui.await.context("route overlay task failed")?;

    if !writers.flush(FLUSH_TIMEOUT) {
        log::warn!("Writers still busy after {:?}, assembling what is on disk", FLUSH_TIMEOUT);
    }

    let assembler = PayloadAssembler::new(layout.clone());
    let (payload, report) = assembler.assemble();
    let payload_path = assembler.write_payload(&payload)?;

    println!("Session: {}", layout.root().display());
    println!(
        "  poses: {}  imu: {}  gps: {}  compass: {}  (dropped {})",
        payload.transform.len(),
        payload.imu.len(),
        payload.gps.len(),
        payload.compass.len(),
        report.dropped()
    );
    println!("  payload: {}", payload_path.display());
    println!("  local route: {} points", overlay.local_route().len());

    if config.upload.endpoint.is_some() {
        let uploader = Uploader::new(&config.upload)?;
        match uploader.upload(&payload).await {
            Ok(trajectory) => match overlay.apply_server_trajectory(trajectory) {
                Some(alignment) if alignment.is_aligned() => {
                    println!("  server route: {} points (aligned)", alignment.points().len())
                }
                Some(alignment) => println!(
                    "  server route: {} points (as returned)",
                    alignment.points().len()
                ),
                None => println!("  server route: none"),
            },
            Err(e) if e.is_user_visible() => eprintln!("Upload failed: {}", e),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}
