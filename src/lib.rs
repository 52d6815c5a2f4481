//! Pan Tracker
//!
//! Closed-loop visual tracking for a single pan servo.
//!
//! # Architecture
//!
//! Frames are captured once per control cycle and submitted to an
//! asynchronous detector. Results come back out of band and land in a
//! single-slot mailbox. The control loop reads the mailbox and drives the
//! servo through one of two behaviors:
//!
//! 1. **Scan**: sweep the servo across its range in fixed steps until the
//!    scene has shown at least two objects in enough batches.
//! 2. **Track**: nudge the servo so the selected detection moves toward the
//!    frame center, with a pixel deadband.
//!
//! The switch from scanning to tracking is a latch: once taken, it holds for
//! the rest of the run.
//!
//! # Module Structure
//!
//! - `mailbox`: Detection hand-off between the detector thread and the loop
//! - `actuation`: Servo + indicator outputs, settled servo commands
//! - `behavior`: Scan and track behaviors
//! - `controller`: Per-cycle state machine and run loop
//! - `detect`: Detection types, detector backends, async detector worker
//! - `ingest`: Frame sources (synthetic, V4L2) and preprocessing
//! - `config`: Layered runtime configuration
//! - `telemetry`: Loop-rate measurement

pub mod actuation;
pub mod behavior;
pub mod config;
pub mod controller;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod mailbox;
pub mod telemetry;

pub use actuation::{
    ActuationCommand, ActuationInterface, ActuationSettings, ActuatorState, Angle,
    IndicatorOutput, ServoOutput, Settled, SimIndicator, SimServo, SimTrace, SweepDirection,
    SysfsGpioIndicator, SysfsPwmServo,
};
pub use behavior::{
    Correction, PanPolarity, ScanBehavior, SelectionPolicy, TrackOutcome, TrackingBehavior,
};
pub use config::{HardwareBackend, TrackerConfig};
pub use controller::{
    ControllerMode, ControllerSettings, ControllerStats, CycleAction, CycleReport,
    TrackingController,
};
pub use detect::{
    AsyncDetector, BoundingBox, Detection, DetectionBatch, DetectorBackend, DetectorOptions,
};
pub use frame::Frame;
pub use ingest::{FrameSource, SourceStats, SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use ingest::{V4l2Config, V4l2Source};
pub use mailbox::{DetectionMailbox, MailboxStats};
pub use telemetry::FpsMeter;
