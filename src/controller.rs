//! Tracking controller.
//!
//! Per-cycle state machine over the mailbox, the behaviors and the actuation
//! interface.
//!
//! The controller is responsible for:
//! - submitting each captured frame to the detector (fire-and-forget)
//! - latching from `Scanning` to `Tracking` once the lock streak reaches the
//!   threshold (there is no way back)
//! - running exactly one behavior per cycle
//! - driving the indicator: ON only when a non-empty batch was tracked
//! - releasing the hardware and stopping the detector on exit
//!
//! The controller MUST NOT:
//! - unwind the loop on frame, detector or actuation failures
//! - consume a batch more than once

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::actuation::{ActuationInterface, Angle};
use crate::behavior::{ScanBehavior, TrackOutcome, TrackingBehavior};
use crate::config::TrackerConfig;
use crate::detect::{self, AsyncDetector};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::mailbox::DetectionMailbox;
use crate::telemetry::FpsMeter;

/// Default lock-streak threshold for entering `Tracking`.
pub const DEFAULT_LOCK_THRESHOLD: u64 = 2;

/// Pause after the first failed capture; doubles per consecutive failure.
const CAPTURE_RETRY_MIN: Duration = Duration::from_millis(100);
const CAPTURE_RETRY_MAX: Duration = Duration::from_secs(1);
/// While captures keep failing, warn once per this many failures.
const CAPTURE_WARN_EVERY: u64 = 50;
/// Longest uninterrupted sleep while backing off, so a stop request is seen.
const STOP_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ControllerMode {
    #[default]
    Scanning,
    Tracking,
}

/// What a cycle did with the actuator.
#[derive(Clone, Debug, PartialEq)]
pub enum CycleAction {
    /// One sweep step; `angle` is the commanded angle, if the move settled.
    Scanned { angle: Option<Angle> },
    /// A non-empty batch was tracked.
    Tracked(TrackOutcome),
    /// Tracking, but nothing (or an empty batch) was waiting.
    Idle,
}

/// Summary of one control cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub mode: ControllerMode,
    /// The controller latched into `Tracking` during this cycle.
    pub latched: bool,
    pub action: CycleAction,
    pub indicator_on: bool,
    /// An actuator or indicator command failed this cycle.
    pub degraded: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub cycles: u64,
    pub skipped: u64,
    pub scans: u64,
    pub tracked: u64,
    pub idle: u64,
    pub corrections: u64,
    pub degraded: u64,
    pub total_settle: Duration,
}

/// Fixed parameters of a controller.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControllerSettings {
    pub frame_width: u32,
    pub frame_height: u32,
    pub lock_threshold: u64,
    pub fps_interval: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            frame_width: 640,
            frame_height: 480,
            lock_threshold: DEFAULT_LOCK_THRESHOLD,
            fps_interval: Duration::from_secs(1),
        }
    }
}

pub struct TrackingController {
    mailbox: Arc<DetectionMailbox>,
    detector: Option<AsyncDetector>,
    actuation: ActuationInterface,
    scan: ScanBehavior,
    track: TrackingBehavior,
    settings: ControllerSettings,
    mode: ControllerMode,
    stats: ControllerStats,
    fps: FpsMeter,
}

impl TrackingController {
    /// Controller without a detector; batches are published to `mailbox` by
    /// the caller.
    pub fn new(
        mailbox: Arc<DetectionMailbox>,
        actuation: ActuationInterface,
        scan: ScanBehavior,
        track: TrackingBehavior,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            mailbox,
            detector: None,
            actuation,
            scan,
            track,
            fps: FpsMeter::new(settings.fps_interval),
            settings,
            mode: ControllerMode::Scanning,
            stats: ControllerStats::default(),
        }
    }

    /// Attach a running detector. Submitted frames go to it.
    pub fn with_detector(mut self, detector: AsyncDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    /// Build the controller, its mailbox and its detector from configuration.
    ///
    /// The detector's callback publishes straight into the mailbox.
    pub fn from_config(cfg: &TrackerConfig, actuation: ActuationInterface) -> Result<Self> {
        let mailbox = Arc::new(DetectionMailbox::new());
        let backend = detect::build_backend(&cfg.detector, cfg.camera.width, cfg.camera.height)?;
        let sink = Arc::clone(&mailbox);
        let detector = AsyncDetector::spawn(
            backend,
            cfg.detector_options(),
            Box::new(move |batch| sink.publish(batch)),
        )?;

        let settings = ControllerSettings {
            frame_width: cfg.camera.width,
            frame_height: cfg.camera.height,
            lock_threshold: cfg.tracking.lock_threshold,
            fps_interval: cfg.telemetry.fps_interval,
        };
        Ok(Self::new(
            mailbox,
            actuation,
            cfg.scan_behavior(),
            cfg.tracking_behavior(),
            settings,
        )
        .with_detector(detector))
    }

    pub fn mailbox(&self) -> &Arc<DetectionMailbox> {
        &self.mailbox
    }

    pub fn mode(&self) -> ControllerMode {
        self.mode
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn actuation(&self) -> &ActuationInterface {
        &self.actuation
    }

    /// Hand a frame to the detector. Returns `false` if there is no detector
    /// or it dropped the frame.
    pub fn submit(&mut self, frame: Frame) -> bool {
        match self.detector.as_ref() {
            Some(detector) => detector.submit(frame),
            None => false,
        }
    }

    /// Run one control step against whatever the mailbox holds now.
    pub fn cycle(&mut self) -> CycleReport {
        self.stats.cycles += 1;
        let latched = self.evaluate_latch();
        let settle_before = self.actuation.total_settle();

        let (action, indicator_on, mut degraded) = match self.mode {
            ControllerMode::Scanning => self.scan_cycle(),
            ControllerMode::Tracking => self.track_cycle(),
        };

        if let Err(e) = self.actuation.set_indicator(indicator_on) {
            log::warn!("indicator update failed: {:#}", e);
            degraded = true;
        }
        if degraded {
            self.stats.degraded += 1;
        }
        self.stats.total_settle += self
            .actuation
            .total_settle()
            .saturating_sub(settle_before);

        CycleReport {
            mode: self.mode,
            latched,
            action,
            indicator_on,
            degraded,
        }
    }

    fn evaluate_latch(&mut self) -> bool {
        if self.mode == ControllerMode::Tracking {
            return false;
        }
        let streak = self.mailbox.lock_streak();
        if streak < self.settings.lock_threshold {
            return false;
        }
        self.mode = ControllerMode::Tracking;
        log::info!(
            "lock acquired (streak {} >= {}), switching to tracking",
            streak,
            self.settings.lock_threshold
        );
        true
    }

    fn scan_cycle(&mut self) -> (CycleAction, bool, bool) {
        self.stats.scans += 1;
        match self.scan.step(&mut self.actuation) {
            Ok(settled) => (
                CycleAction::Scanned {
                    angle: Some(settled.angle),
                },
                false,
                false,
            ),
            Err(e) => {
                log::warn!("scan step failed: {:#}", e);
                (CycleAction::Scanned { angle: None }, false, true)
            }
        }
    }

    fn track_cycle(&mut self) -> (CycleAction, bool, bool) {
        let batch = match self.mailbox.take() {
            Some(batch) if !batch.is_empty() => batch,
            _ => {
                self.stats.idle += 1;
                return (CycleAction::Idle, false, false);
            }
        };

        let outcome = self.track.track(
            &batch,
            self.settings.frame_width,
            self.settings.frame_height,
            &mut self.actuation,
        );
        self.stats.tracked += 1;
        self.stats.corrections += outcome.corrections.len() as u64;
        let degraded = outcome.failed > 0;
        if outcome.corrections.is_empty() && !degraded {
            log::debug!("target centered");
        }
        (CycleAction::Tracked(outcome), true, degraded)
    }

    /// Run until `stop` is set, then shut down.
    ///
    /// Each iteration captures a frame, submits it, and runs one cycle. A frame
    /// that cannot be captured skips the iteration; consecutive failures back
    /// off from 100 ms up to 1 s between attempts.
    pub fn run(&mut self, source: &mut dyn FrameSource, stop: &AtomicBool) -> Result<()> {
        log::info!(
            "tracking loop running ({}x{}, lock threshold {})",
            self.settings.frame_width,
            self.settings.frame_height,
            self.settings.lock_threshold
        );

        let mut failures: u64 = 0;
        let mut backoff = CAPTURE_RETRY_MIN;
        while !stop.load(Ordering::SeqCst) {
            match source.next_frame() {
                Ok(frame) => {
                    if failures > 0 {
                        log::info!("frame capture recovered after {} failures", failures);
                        failures = 0;
                        backoff = CAPTURE_RETRY_MIN;
                    }
                    self.submit(frame);
                }
                Err(e) => {
                    self.stats.skipped += 1;
                    failures += 1;
                    if failures == 1 || failures % CAPTURE_WARN_EVERY == 0 {
                        log::warn!(
                            "frame capture failed ({} in a row), skipping cycle: {:#}",
                            failures,
                            e
                        );
                    }
                    pause(stop, backoff);
                    backoff = (backoff * 2).min(CAPTURE_RETRY_MAX);
                    continue;
                }
            }

            self.cycle();

            if let Some(fps) = self.fps.tick() {
                self.log_status(fps, source);
            }
        }

        log::info!("stop requested after {} cycles", self.stats.cycles);
        self.shutdown()
    }

    fn log_status(&self, fps: f64, source: &dyn FrameSource) {
        let mailbox = self.mailbox.stats();
        let source_stats = source.stats();
        log::info!(
            "fps={:.1} mode={:?} streak={} angle={} mailbox(published={} taken={} overwritten={}) source={} healthy={} frames={}",
            fps,
            self.mode,
            self.mailbox.lock_streak(),
            self.actuation.angle(),
            mailbox.published,
            mailbox.taken,
            mailbox.overwritten,
            source_stats.name,
            source.is_healthy(),
            source_stats.frames_captured
        );
        if let Some(detector) = self.detector.as_ref() {
            let stats = detector.stats();
            log::debug!(
                "detector '{}': submitted={} dropped={} delivered={} failed={}",
                detector.backend_name(),
                stats.submitted,
                stats.dropped,
                stats.delivered,
                stats.failed
            );
        }
    }

    /// Stop the detector and release the hardware. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(mut detector) = self.detector.take() {
            detector.shutdown();
        }
        let result = self.actuation.release();
        log::info!(
            "controller stopped: cycles={} scans={} tracked={} idle={} corrections={} degraded={} skipped={} settle={}ms",
            self.stats.cycles,
            self.stats.scans,
            self.stats.tracked,
            self.stats.idle,
            self.stats.corrections,
            self.stats.degraded,
            self.stats.skipped,
            self.stats.total_settle.as_millis()
        );
        result
    }
}

/// Sleep for `duration`, returning early once `stop` is set.
fn pause(stop: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while !stop.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(STOP_POLL));
    }
}
