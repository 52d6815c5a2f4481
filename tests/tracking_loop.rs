use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pan_tracker::behavior::PanPolarity;
use pan_tracker::controller::{ControllerMode, ControllerSettings, CycleAction};
use pan_tracker::detect::{
    AsyncDetector, BoundingBox, BrightBlobBackend, Detection, DetectorOptions, ScriptedBackend,
};
use pan_tracker::ingest::{FrameSource, SyntheticConfig, SyntheticSource};
use pan_tracker::{
    ActuationInterface, ActuationSettings, Angle, DetectionMailbox, Frame, ScanBehavior,
    SimIndicator, SimServo, SimTrace, TrackingBehavior, TrackingController,
};

fn sim_actuation(trace: &SimTrace) -> ActuationInterface {
    ActuationInterface::open(
        Box::new(SimServo::new(trace.clone())),
        Box::new(SimIndicator::new(trace.clone())),
        ActuationSettings {
            settle: Duration::ZERO,
            initial_angle: Angle::new(90.0),
        },
    )
    .expect("sim actuation")
}

fn det_at(cx: u32, cy: u32) -> Detection {
    Detection::new(BoundingBox::centered_at(cx, cy, 40, 40), 0.9, "person")
}

fn blank_frame() -> Frame {
    Frame::new(vec![0u8; 640 * 480 * 3], 640, 480, 0).expect("frame")
}

fn wait_for_published(mailbox: &DetectionMailbox, count: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while mailbox.stats().published < count {
        assert!(Instant::now() < deadline, "detector never delivered");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn two_busy_batches_then_left_target_moves_toward_it() {
    let trace = SimTrace::new();
    let mailbox = Arc::new(DetectionMailbox::new());
    let sink = Arc::clone(&mailbox);
    let backend = ScriptedBackend::with_script([
        vec![det_at(100, 100), det_at(500, 400)],
        vec![det_at(320, 240), det_at(320, 240)],
        vec![det_at(200, 240)],
    ]);
    let detector = AsyncDetector::spawn(
        Box::new(backend),
        DetectorOptions::default(),
        Box::new(move |batch| sink.publish(batch)),
    )
    .expect("spawn detector");

    let mut controller = TrackingController::new(
        Arc::clone(&mailbox),
        sim_actuation(&trace),
        ScanBehavior::default(),
        TrackingBehavior {
            polarity: PanPolarity::Inverted,
            ..TrackingBehavior::default()
        },
        ControllerSettings::default(),
    )
    .with_detector(detector);

    // First batch: streak 1, still sweeping.
    assert!(controller.submit(blank_frame()));
    wait_for_published(&mailbox, 1);
    let report = controller.cycle();
    assert_eq!(report.mode, ControllerMode::Scanning);
    assert!(!report.indicator_on);

    // Second batch: streak 2, latches and consumes the centered pair.
    assert!(controller.submit(blank_frame()));
    wait_for_published(&mailbox, 2);
    let report = controller.cycle();
    assert!(report.latched);
    assert_eq!(report.mode, ControllerMode::Tracking);
    assert!(report.indicator_on);

    // Third batch: one detection left of center.
    let before = controller.actuation().angle();
    let moves_before = trace.servo_angles().len();
    assert!(controller.submit(blank_frame()));
    wait_for_published(&mailbox, 3);
    let report = controller.cycle();

    let CycleAction::Tracked(outcome) = report.action else {
        panic!("expected tracking, got {:?}", report.action);
    };
    assert_eq!(outcome.corrections.len(), 1);
    assert_eq!(outcome.corrections[0].error_px, -120);
    assert!(controller.actuation().angle() > before);
    assert_eq!(trace.servo_angles().len(), moves_before + 1);
    assert!(report.indicator_on);

    // Nothing more from the detector: frozen, indicator off.
    let report = controller.cycle();
    assert_eq!(report.action, CycleAction::Idle);
    assert!(!report.indicator_on);

    controller.shutdown().expect("shutdown");
    assert!(trace.servo_released());
    assert!(trace.indicator_released());
}

#[test]
fn run_loop_locks_onto_synthetic_scene_and_releases_on_stop() {
    let trace = SimTrace::new();
    let mailbox = Arc::new(DetectionMailbox::new());
    let sink = Arc::clone(&mailbox);
    let detector = AsyncDetector::spawn(
        Box::new(BrightBlobBackend::new()),
        DetectorOptions::default(),
        Box::new(move |batch| sink.publish(batch)),
    )
    .expect("spawn detector");

    let mut controller = TrackingController::new(
        Arc::clone(&mailbox),
        sim_actuation(&trace),
        ScanBehavior::default(),
        TrackingBehavior::default(),
        ControllerSettings::default(),
    )
    .with_detector(detector);

    let mut source = SyntheticSource::new(SyntheticConfig::default()).expect("source");
    source.connect().expect("connect");

    let stop = Arc::new(AtomicBool::new(false));
    let stopper = {
        let stop = Arc::clone(&stop);
        let mailbox = Arc::clone(&mailbox);
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(10);
            while mailbox.lock_streak() < 3 && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            thread::sleep(Duration::from_millis(50));
            stop.store(true, Ordering::SeqCst);
        })
    };

    controller.run(&mut source, &stop).expect("run");
    stopper.join().expect("stopper thread");

    assert!(mailbox.lock_streak() >= 2);
    assert_eq!(controller.mode(), ControllerMode::Tracking);
    assert!(controller.stats().scans >= 1);
    assert!(controller.actuation().is_released());
    assert!(trace.servo_released());
    assert!(trace
        .servo_angles()
        .iter()
        .all(|a| (0.0..=180.0).contains(&a.degrees())));
}
