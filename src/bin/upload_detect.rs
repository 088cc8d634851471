//! upload_detect - detect objects in a single image or video file

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use sharp_sentinel::upload::detect_upload;
use sharp_sentinel::{HttpEndpoint, Notifier, SentinelConfig, UploadError, UploadRequest};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Detect objects in an image or video file")]
struct Args {
    /// Image or video to submit.
    file: PathBuf,
    /// JSON config file.
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,
    /// Base URL of the detection service.
    #[arg(long)]
    endpoint: Option<String>,
    /// Minimum detection confidence (0..1).
    #[arg(long)]
    confidence: Option<f32>,
    /// Output file or directory for the annotated media.
    #[arg(long, default_value = ".")]
    output: PathBuf,
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
    if let Some(endpoint) = args.endpoint {
        cfg.endpoint = endpoint;
    }
    if let Some(confidence) = args.confidence {
        cfg.confidence = confidence;
    }
    cfg.validate()?;

    let request = {
        let mut stage = ui.stage("Read file");
        match UploadRequest::from_path(&args.file, cfg.upload_limit_bytes) {
            Ok(request) => {
                stage.detail(ui::format_bytes(request.size() as u64));
                request
            }
            Err(err) => {
                stage.fail(err.to_string());
                if let UploadError::TooLarge { .. } = err {
                    log::warn!("upload rejected locally; nothing was sent");
                }
                return Err(anyhow!(err));
            }
        }
    };

    let endpoint = Arc::new(HttpEndpoint::new(&cfg.endpoint, cfg.timeout)?);
    let notifier = Notifier::new(cfg.notification.channel(), endpoint.clone());

    let outcome = {
        let mut stage = ui.stage("Detect");
        let outcome = detect_upload(endpoint.as_ref(), &notifier, &request, cfg.confidence);
        if let Err(err) = &outcome {
            stage.fail(format!("{:#}", err));
        }
        outcome?
    };

    let written = {
        let _stage = ui.stage("Write annotated output");
        outcome.write_media(&args.output)?
    };

    if outcome.alert.is_detected() {
        ui.note(&format!(
            "ALERT: {} object(s) detected in {}",
            outcome.manifest.detections.len(),
            request.file_name
        ));
    } else {
        ui.note("no objects detected");
    }
    if outcome.notification_sent {
        ui.note(&format!("{} notification sent", cfg.notification.kind));
    }
    println!("{}", written.display());

    Ok(())
}
