//! pan_trackd - pan servo tracking daemon
//!
//! Captures frames, runs the detector, and drives the pan servo and the
//! status indicator until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pan_tracker::config::HardwareBackend;
use pan_tracker::ingest;
use pan_tracker::{
    ActuationInterface, SimIndicator, SimServo, SimTrace, TrackerConfig, TrackingController,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path of the object detection model.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Max number of detection results.
    #[arg(long)]
    max_results: Option<usize>,
    /// The score threshold of detection results.
    #[arg(long)]
    score_threshold: Option<f32>,
    /// Id of camera.
    #[arg(long)]
    camera_id: Option<u32>,
    /// Width of frame to capture from camera.
    #[arg(long)]
    frame_width: Option<u32>,
    /// Height of frame to capture from camera.
    #[arg(long)]
    frame_height: Option<u32>,
    /// Detector backend (cpu, stub, tract).
    #[arg(long)]
    backend: Option<String>,
    /// Frame source (`stub://…`, a device path, or `v4l2`).
    #[arg(long)]
    source: Option<String>,
    /// Servo/indicator outputs (sysfs or sim).
    #[arg(long, env = "PAN_TRACKER_HARDWARE")]
    hardware: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = TrackerConfig::load()?;
    apply_args(&mut cfg, &args)?;
    cfg.validate()?;

    let mut source = ingest::open_source(&cfg.camera)?;
    source.connect()?;

    let actuation = open_actuation(&cfg)?;
    let mut controller = TrackingController::from_config(&cfg, actuation)?;

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    match cfg.model_in_use() {
        Some(model) => log::info!(
            "pan_trackd running. backend={} model={} camera={} ({}x{})",
            cfg.detector.backend,
            model.display(),
            cfg.camera.source,
            cfg.camera.width,
            cfg.camera.height
        ),
        None => log::info!(
            "pan_trackd running. backend={} camera={} ({}x{})",
            cfg.detector.backend,
            cfg.camera.source,
            cfg.camera.width,
            cfg.camera.height
        ),
    }
    controller.run(source.as_mut(), &stop)
}

fn apply_args(cfg: &mut TrackerConfig, args: &Args) -> Result<()> {
    if let Some(model) = args.model.clone() {
        cfg.detector.model_path = model;
    }
    if let Some(max_results) = args.max_results {
        cfg.detector.max_results = max_results;
    }
    if let Some(score_threshold) = args.score_threshold {
        cfg.detector.score_threshold = score_threshold;
    }
    if let Some(camera_id) = args.camera_id {
        cfg.camera.id = camera_id;
    }
    if let Some(width) = args.frame_width {
        cfg.camera.width = width;
    }
    if let Some(height) = args.frame_height {
        cfg.camera.height = height;
    }
    if let Some(backend) = args.backend.clone() {
        cfg.detector.backend = backend;
    }
    if let Some(source) = args.source.clone() {
        cfg.camera.source = source;
    }
    if let Some(hardware) = args.hardware.as_deref() {
        cfg.servo.backend = HardwareBackend::parse(hardware)?;
    }
    if args.model.is_some() && cfg.model_in_use().is_none() {
        log::warn!(
            "--model ignored: backend '{}' does not load a model",
            cfg.detector.backend
        );
    }
    Ok(())
}

fn open_actuation(cfg: &TrackerConfig) -> Result<ActuationInterface> {
    match cfg.servo.backend {
        HardwareBackend::Sysfs => ActuationInterface::open_sysfs(
            cfg.servo.pwm_chip,
            cfg.servo.pwm_channel,
            cfg.indicator.gpio_pin,
            cfg.actuation_settings(),
        )
        .context("servo/indicator unavailable"),
        HardwareBackend::Sim => {
            log::warn!("hardware backend is 'sim': servo and indicator commands are not sent");
            let trace = SimTrace::new();
            ActuationInterface::open(
                Box::new(SimServo::new(trace.clone())),
                Box::new(SimIndicator::new(trace)),
                cfg.actuation_settings(),
            )
        }
    }
}
