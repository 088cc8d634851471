//! live_detect - live webcam detection against a remote detection service
//!
//! This tool:
//! 1. Acquires the camera (video only, 640x480 ideal)
//! 2. Submits one JPEG frame at a time and renders the annotated reply
//! 3. Alerts and notifies on newly seen detections
//! 4. Runs until Ctrl-C or the cycle limit, then releases the camera

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use sharp_sentinel::render::{PreviewFile, RenderSink};
use sharp_sentinel::{
    open_camera, HttpEndpoint, LiveSession, SentinelConfig, SessionSettings, SessionState,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Live webcam detection against a remote detection service")]
struct Args {
    /// JSON config file.
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,
    /// Camera device (/dev/videoN or stub://name).
    #[arg(long)]
    camera: Option<String>,
    /// Base URL of the detection service.
    #[arg(long)]
    endpoint: Option<String>,
    /// Minimum detection confidence (0..1).
    #[arg(long)]
    confidence: Option<f32>,
    /// Stop after this many completed cycles.
    #[arg(long)]
    max_cycles: Option<u64>,
    /// Write the latest annotated frame to this JPEG file.
    #[arg(long)]
    preview: Option<PathBuf>,
    /// Export the detection gallery to this directory on exit.
    #[arg(long)]
    gallery_dir: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = SentinelConfig::load_from(args.config.as_deref())?;
    if let Some(camera) = args.camera {
        cfg.camera.device = camera;
    }
    if let Some(endpoint) = args.endpoint {
        cfg.endpoint = endpoint;
    }
    if let Some(confidence) = args.confidence {
        cfg.confidence = confidence;
    }
    cfg.validate()?;

    let endpoint = Arc::new(HttpEndpoint::new(&cfg.endpoint, cfg.timeout)?);
    let camera = open_camera(&cfg.camera.device)?;
    let mut settings = SessionSettings::from_config(&cfg);
    settings.loop_settings.max_cycles = args.max_cycles;
    log::info!(
        "live_detect: camera={} endpoint={} notify={}",
        cfg.camera.device,
        cfg.endpoint,
        settings.notification.kind()
    );

    let mut session = LiveSession::new(camera, endpoint, settings)?;
    if let Some(path) = &args.preview {
        let sink: Box<dyn RenderSink> = Box::new(PreviewFile::new(path));
        session = session.with_sink(sink);
    }

    {
        let mut stage = ui.stage("Open camera");
        if let Err(err) = session.start() {
            stage.fail(err.to_string());
            return Err(anyhow!("failed to start capture session: {}", err));
        }
        stage.detail(cfg.camera.device.clone());
    }

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    ui.note("detecting; press Ctrl-C to stop");
    let mut shown_alert = None;
    while session.state() == SessionState::Active {
        if let Some(report) = session.last_report() {
            if shown_alert != Some(report.alert) {
                shown_alert = Some(report.alert);
                ui.note(if report.alert.is_detected() {
                    "ALERT: sharp object detected"
                } else {
                    "no detections"
                });
            }
        }
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(()) => {
                log::info!("shutdown signal received, stopping capture session...");
                break;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    let summary = {
        let _stage = ui.stage("Stop capture session");
        session.stop().or_else(|| session.last_summary().cloned())
    };

    if let Some(dir) = &args.gallery_dir {
        let mut stage = ui.stage("Export gallery");
        let gallery = session
            .gallery()
            .ok_or_else(|| anyhow!("gallery unavailable after stop"))?;
        std::fs::create_dir_all(dir)
            .map_err(|e| anyhow!("failed to create {}: {}", dir.display(), e))?;
        let written = gallery.export_to_dir(dir)?;
        stage.detail(format!(
            "{} image(s), {}",
            written.len(),
            ui::format_bytes(gallery.memory_bytes() as u64)
        ));
    }

    match summary {
        Some(summary) => {
            let stats = summary.stats;
            println!("Session ended: {:?}", summary.exit);
            println!("  cycles:          {}", stats.cycles);
            println!("  frames submitted: {}", stats.submitted);
            println!("  failures:        {}", stats.failures);
            println!("  new detections:  {}", stats.new_detections);
            println!("  gallery appends: {}", stats.gallery_appends);
            println!(
                "  notifications:   {} sent, {} failed, {} dropped",
                stats.notifications, stats.notification_failures, stats.notifications_dropped
            );
        }
        None => log::warn!("no session statistics available"),
    }

    Ok(())
}
