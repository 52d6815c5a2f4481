//! Actuation interface.
//!
//! Owns the pan servo and the status indicator, and the commanded actuator state.
//!
//! A servo move is an `ActuationCommand`: drive the pulse train, wait the
//! settling time while the horn physically travels, then stop the pulses. The
//! command is consumed by execution and yields a `Settled` receipt, so the
//! settling cost of every move is visible to the caller. Moves are strictly
//! serialized: a new command cannot start until the previous one has settled.
//!
//! Angles are range-checked by construction (`Angle`). Hardware failures surface
//! as errors and leave the commanded state unchanged.

pub mod sim;
pub mod sysfs;

use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::{Duration, Instant};

pub use sim::{SimIndicator, SimServo, SimTrace, DEFAULT_TRACE_CAPACITY};
pub use sysfs::{SysfsGpioIndicator, SysfsPwmServo};

/// Default settling time after a servo command.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

// ----------------------------------------------------------------------------
// Angle
// ----------------------------------------------------------------------------

/// Servo angle in degrees, always within `[Angle::MIN, Angle::MAX]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd)]
pub struct Angle(f32);

impl Angle {
    pub const MIN: f32 = 0.0;
    pub const MAX: f32 = 180.0;

    /// Angle for a value the caller believes is in range.
    ///
    /// Out-of-range values are a bug in the caller: they abort debug builds and
    /// are clamped in release builds.
    pub fn new(degrees: f32) -> Self {
        debug_assert!(
            (Self::MIN..=Self::MAX).contains(&degrees),
            "servo angle {degrees} outside [{}, {}]",
            Self::MIN,
            Self::MAX
        );
        Self::clamped(degrees)
    }

    /// Angle clamped into range. Non-finite input maps to `MIN`.
    pub fn clamped(degrees: f32) -> Self {
        if degrees.is_finite() {
            Self(degrees.clamp(Self::MIN, Self::MAX))
        } else {
            Self(Self::MIN)
        }
    }

    pub fn degrees(self) -> f32 {
        self.0
    }

    /// Offset by `delta` degrees, clamped into range.
    pub fn offset(self, delta: f32) -> Self {
        Self::clamped(self.0 + delta)
    }

    /// PWM duty cycle (percent of a 50 Hz period) for this angle.
    ///
    /// 0° maps to 2% (0.4 ms pulse), 180° to 12% (2.4 ms pulse).
    pub fn duty_percent(self) -> f32 {
        self.0 / 18.0 + 2.0
    }

    /// Inverse of `duty_percent`.
    pub fn from_duty_percent(duty: f32) -> Self {
        Self::clamped((duty - 2.0) * 18.0)
    }
}

impl std::fmt::Display for Angle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.1}°", self.0)
    }
}

/// Sweep direction of the scan behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SweepDirection {
    #[default]
    Increasing,
    Decreasing,
}

impl SweepDirection {
    pub fn sign(self) -> f32 {
        match self {
            SweepDirection::Increasing => 1.0,
            SweepDirection::Decreasing => -1.0,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            SweepDirection::Increasing => SweepDirection::Decreasing,
            SweepDirection::Decreasing => SweepDirection::Increasing,
        }
    }
}

/// Commanded actuator state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ActuatorState {
    pub angle: Angle,
    pub direction: SweepDirection,
}

// ----------------------------------------------------------------------------
// Hardware outputs
// ----------------------------------------------------------------------------

/// Rotational output driven by a PWM duty cycle.
pub trait ServoOutput: Send {
    fn name(&self) -> &'static str;

    /// Start (or retarget) the pulse train at `duty_percent`.
    fn drive(&mut self, duty_percent: f32) -> Result<()>;

    /// Stop pulsing. The servo holds position mechanically without jitter.
    fn idle(&mut self) -> Result<()>;

    /// Give the output back to the system. Must be idempotent.
    fn release(&mut self) -> Result<()>;
}

/// Binary status output.
pub trait IndicatorOutput: Send {
    fn name(&self) -> &'static str;

    fn set(&mut self, on: bool) -> Result<()>;

    /// Give the output back to the system. Must be idempotent.
    fn release(&mut self) -> Result<()>;
}

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// One servo move, including its settling wait.
#[derive(Clone, Copy, Debug, PartialEq)]
#[must_use = "a command does nothing until executed"]
pub struct ActuationCommand {
    pub target: Angle,
    pub settle: Duration,
}

/// Receipt of a completed move.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Settled {
    pub angle: Angle,
    /// Wall time spent in the move, settling included.
    pub elapsed: Duration,
}

impl ActuationCommand {
    pub fn new(target: Angle, settle: Duration) -> Self {
        Self { target, settle }
    }

    /// Drive `servo` to the target and block until it has settled.
    pub fn execute(self, servo: &mut dyn ServoOutput) -> Result<Settled> {
        let started = Instant::now();
        if let Err(e) = servo.drive(self.target.duty_percent()) {
            let _ = servo.idle();
            let context = format!("servo '{}' failed to move to {}", servo.name(), self.target);
            return Err(e.context(context));
        }
        if !self.settle.is_zero() {
            std::thread::sleep(self.settle);
        }
        if let Err(e) = servo.idle() {
            // The horn has reached the target; only the pulse train is left running.
            log::warn!("servo '{}' failed to idle: {:#}", servo.name(), e);
        }
        Ok(Settled {
            angle: self.target,
            elapsed: started.elapsed(),
        })
    }
}

// ----------------------------------------------------------------------------
// ActuationInterface
// ----------------------------------------------------------------------------

/// Settings for `ActuationInterface::open`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ActuationSettings {
    pub settle: Duration,
    pub initial_angle: Angle,
}

impl Default for ActuationSettings {
    fn default() -> Self {
        Self {
            settle: DEFAULT_SETTLE,
            initial_angle: Angle::default(),
        }
    }
}

/// Servo + indicator with the commanded state.
pub struct ActuationInterface {
    servo: Box<dyn ServoOutput>,
    indicator: Box<dyn IndicatorOutput>,
    state: ActuatorState,
    settle: Duration,
    indicator_on: Option<bool>,
    moves: u64,
    total_settle: Duration,
    released: bool,
}

impl ActuationInterface {
    /// Take ownership of the outputs and put the indicator in a known state.
    ///
    /// If the indicator cannot be written both outputs are released again and
    /// the error is returned.
    pub fn open(
        servo: Box<dyn ServoOutput>,
        indicator: Box<dyn IndicatorOutput>,
        settings: ActuationSettings,
    ) -> Result<Self> {
        let mut actuation = Self {
            servo,
            indicator,
            state: ActuatorState {
                angle: settings.initial_angle,
                direction: SweepDirection::Increasing,
            },
            settle: settings.settle,
            indicator_on: None,
            moves: 0,
            total_settle: Duration::ZERO,
            released: false,
        };
        if let Err(e) = actuation.set_indicator(false) {
            let _ = actuation.release();
            return Err(e.context("indicator unavailable at startup"));
        }
        log::info!(
            "actuation ready: servo='{}' indicator='{}' settle={}ms start={}",
            actuation.servo.name(),
            actuation.indicator.name(),
            settings.settle.as_millis(),
            settings.initial_angle
        );
        Ok(actuation)
    }

    /// Open the servo on a sysfs PWM channel and the indicator on a sysfs GPIO
    /// line. If the indicator cannot be acquired the servo is released again.
    pub fn open_sysfs(
        pwm_chip: u32,
        pwm_channel: u32,
        gpio_pin: u32,
        settings: ActuationSettings,
    ) -> Result<Self> {
        Self::open_sysfs_at(
            Path::new(sysfs::DEFAULT_SYSFS_ROOT),
            pwm_chip,
            pwm_channel,
            gpio_pin,
            settings,
        )
    }

    /// Like `open_sysfs`, under an alternative sysfs class root.
    pub fn open_sysfs_at(
        root: &Path,
        pwm_chip: u32,
        pwm_channel: u32,
        gpio_pin: u32,
        settings: ActuationSettings,
    ) -> Result<Self> {
        let mut servo = SysfsPwmServo::open_at(root, pwm_chip, pwm_channel)?;
        let indicator = match SysfsGpioIndicator::open_at(root, gpio_pin) {
            Ok(indicator) => indicator,
            Err(e) => {
                if let Err(release_err) = servo.release() {
                    log::warn!("servo release after failed startup: {:#}", release_err);
                }
                return Err(e);
            }
        };
        Self::open(Box::new(servo), Box::new(indicator), settings)
    }

    /// Move the servo to `angle`, blocking for the settling time.
    ///
    /// The commanded state is updated only once the move has settled.
    pub fn set_angle(&mut self, angle: Angle) -> Result<Settled> {
        if self.released {
            return Err(anyhow!("actuation already released"));
        }
        let settled = ActuationCommand::new(angle, self.settle).execute(self.servo.as_mut())?;
        self.state.angle = settled.angle;
        self.moves += 1;
        self.total_settle += settled.elapsed;
        Ok(settled)
    }

    /// Set the indicator. Writes are skipped when the output already shows `on`.
    pub fn set_indicator(&mut self, on: bool) -> Result<()> {
        if self.released {
            return Err(anyhow!("actuation already released"));
        }
        if self.indicator_on == Some(on) {
            return Ok(());
        }
        match self.indicator.set(on) {
            Ok(()) => {
                self.indicator_on = Some(on);
                Ok(())
            }
            Err(e) => {
                self.indicator_on = None;
                Err(e.context(format!("indicator '{}' write failed", self.indicator.name())))
            }
        }
    }

    /// Advance the sweep cursor by `step` degrees in the current direction.
    ///
    /// The result is clamped to the servo range; reaching either end reverses
    /// the direction. Nothing is sent to the servo.
    pub fn advance_sweep(&mut self, step: f32) {
        let raw = self.state.angle.degrees() + step * self.state.direction.sign();
        let next = Angle::clamped(raw);
        if next.degrees() >= Angle::MAX || next.degrees() <= Angle::MIN {
            self.state.direction = self.state.direction.reversed();
        }
        self.state.angle = next;
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }

    pub fn angle(&self) -> Angle {
        self.state.angle
    }

    /// Last indicator state successfully written, if any.
    pub fn indicator(&self) -> Option<bool> {
        self.indicator_on
    }

    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Completed servo moves.
    pub fn moves(&self) -> u64 {
        self.moves
    }

    /// Total wall time spent in servo moves.
    pub fn total_settle(&self) -> Duration {
        self.total_settle
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Stop the servo, switch the indicator off, and release both outputs.
    ///
    /// Idempotent. Every step is attempted even if an earlier one fails; the
    /// first failure is returned.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let results = [
            self.servo.idle(),
            self.indicator.set(false),
            self.servo.release(),
            self.indicator.release(),
        ];
        self.indicator_on = None;

        let mut first_err = None;
        for result in results {
            if let Err(e) = result {
                log::warn!("actuation release: {:#}", e);
                first_err.get_or_insert(e);
            }
        }
        log::info!(
            "actuation released after {} moves ({} ms settling)",
            self.moves,
            self.total_settle.as_millis()
        );
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for ActuationInterface {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
