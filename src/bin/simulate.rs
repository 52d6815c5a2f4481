//! simulate - run the tracking loop against a synthetic scene
//!
//! Synthetic frames, the bright-blob detector and in-memory servo/indicator
//! outputs. Nothing touches hardware.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pan_tracker::behavior::{PanPolarity, SelectionPolicy};
use pan_tracker::controller::{ControllerSettings, CycleAction};
use pan_tracker::detect::{AsyncDetector, BrightBlobBackend, DetectorOptions};
use pan_tracker::ingest::{FrameSource, SyntheticConfig, SyntheticSource};
use pan_tracker::{
    ActuationInterface, ActuationSettings, Angle, DetectionMailbox, ScanBehavior, SimIndicator,
    SimServo, SimTrace, TrackingBehavior, TrackingController,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Number of control cycles to run.
    #[arg(long, default_value_t = 200)]
    cycles: u64,
    /// Simulated servo settling time in milliseconds.
    #[arg(long, default_value_t = 0)]
    settle_ms: u64,
    /// Pause between cycles so the detector can catch up, in milliseconds.
    #[arg(long, default_value_t = 20)]
    cycle_ms: u64,
    /// Objects in the synthetic scene.
    #[arg(long, default_value_t = 2)]
    objects: usize,
    /// Add sensor noise to synthetic frames.
    #[arg(long)]
    noise: bool,
    #[arg(long, default_value_t = 640)]
    frame_width: u32,
    #[arg(long, default_value_t = 480)]
    frame_height: u32,
    /// Batches with two or more detections needed before tracking.
    #[arg(long, default_value_t = 2)]
    lock_threshold: u64,
    /// Track the highest-scoring detection instead of the last one.
    #[arg(long)]
    highest_score: bool,
    /// Mirror the horizontal correction.
    #[arg(long)]
    inverted: bool,
    /// Starting servo angle in degrees.
    #[arg(long, default_value_t = 0.0)]
    start_angle: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if !(Angle::MIN..=Angle::MAX).contains(&args.start_angle) {
        return Err(anyhow!("start angle must be within [0, 180]"));
    }
    if args.lock_threshold == 0 {
        return Err(anyhow!("lock threshold must be >= 1"));
    }

    let mut source = SyntheticSource::new(SyntheticConfig {
        url: "stub://simulate".to_string(),
        width: args.frame_width,
        height: args.frame_height,
        objects: args.objects,
        noise: args.noise,
    })?;
    source.connect()?;

    let trace = SimTrace::new();
    let actuation = ActuationInterface::open(
        Box::new(SimServo::new(trace.clone())),
        Box::new(SimIndicator::new(trace)),
        ActuationSettings {
            settle: Duration::from_millis(args.settle_ms),
            initial_angle: Angle::clamped(args.start_angle),
        },
    )?;

    let mailbox = Arc::new(DetectionMailbox::new());
    let sink = Arc::clone(&mailbox);
    let detector = AsyncDetector::spawn(
        Box::new(BrightBlobBackend::new()),
        DetectorOptions::default(),
        Box::new(move |batch| sink.publish(batch)),
    )?;

    let track = TrackingBehavior {
        selection: if args.highest_score {
            SelectionPolicy::HighestScore
        } else {
            SelectionPolicy::Last
        },
        polarity: if args.inverted {
            PanPolarity::Inverted
        } else {
            PanPolarity::Normal
        },
        ..TrackingBehavior::default()
    };
    let mut controller = TrackingController::new(
        mailbox,
        actuation,
        ScanBehavior::default(),
        track,
        ControllerSettings {
            frame_width: args.frame_width,
            frame_height: args.frame_height,
            lock_threshold: args.lock_threshold,
            ..ControllerSettings::default()
        },
    )
    .with_detector(detector);

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let mut latched_at = None;
    for index in 0..args.cycles {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("frame capture failed, skipping cycle: {:#}", e);
                continue;
            }
        };
        controller.submit(frame);
        std::thread::sleep(Duration::from_millis(args.cycle_ms));

        let report = controller.cycle();
        if report.latched {
            latched_at = Some(index);
        }
        match &report.action {
            CycleAction::Scanned { angle } => log::debug!("cycle {}: scan {:?}", index, angle),
            CycleAction::Tracked(outcome) => log::debug!(
                "cycle {}: tracked, {} correction(s), angle {}",
                index,
                outcome.corrections.len(),
                controller.actuation().angle()
            ),
            CycleAction::Idle => log::debug!("cycle {}: idle", index),
        }
    }

    let stats = controller.stats();
    let final_angle = controller.actuation().angle();
    let moves = controller.actuation().moves();
    controller.shutdown()?;

    println!("simulate summary:");
    println!("  cycles: {}", stats.cycles);
    match latched_at {
        Some(index) => println!("  tracking from cycle: {}", index),
        None => println!("  tracking from cycle: never"),
    }
    println!("  scans: {}", stats.scans);
    println!("  tracked batches: {}", stats.tracked);
    println!("  idle cycles: {}", stats.idle);
    println!("  corrections: {}", stats.corrections);
    println!("  servo moves: {}", moves);
    println!("  final angle: {}", final_angle);
    Ok(())
}
