//! Linux sysfs PWM servo and GPIO indicator.
//!
//! The servo uses a hardware PWM channel (`/sys/class/pwm/pwmchipN/pwmM`) at
//! 50 Hz. On a Raspberry Pi with the `pwm` overlay, chip 0 channel 0 is routed
//! to BCM GPIO 18. The indicator is a plain GPIO line (`/sys/class/gpio`).
//!
//! Both outputs export their line on open and unexport it on release. The sysfs
//! root is configurable so the outputs can be exercised against a fake tree.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{IndicatorOutput, ServoOutput};

/// Servo PWM period: 50 Hz.
pub const SERVO_PERIOD_NS: u64 = 20_000_000;

/// Class root of the kernel's sysfs PWM and GPIO interfaces.
pub const DEFAULT_SYSFS_ROOT: &str = "/sys/class";
const EXPORT_RETRIES: u32 = 20;
const EXPORT_RETRY_DELAY: Duration = Duration::from_millis(50);

fn write_attr(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).with_context(|| format!("write {} to {}", value, path.display()))
}

/// Export a line and wait for the kernel to create its attribute directory.
fn export_line(export: &Path, id: u32, line_dir: &Path) -> Result<()> {
    if !line_dir.exists() {
        write_attr(export, &id.to_string())?;
    }
    for _ in 0..EXPORT_RETRIES {
        if line_dir.exists() {
            return Ok(());
        }
        std::thread::sleep(EXPORT_RETRY_DELAY);
    }
    Err(anyhow!("{} did not appear after export", line_dir.display()))
}

// ----------------------------------------------------------------------------
// SysfsPwmServo
// ----------------------------------------------------------------------------

/// Servo on a sysfs PWM channel.
pub struct SysfsPwmServo {
    chip_dir: PathBuf,
    channel: u32,
    channel_dir: PathBuf,
    enabled: bool,
    released: bool,
}

impl SysfsPwmServo {
    /// Export `pwmchip{chip}/pwm{channel}` and program the 50 Hz period.
    pub fn open(chip: u32, channel: u32) -> Result<Self> {
        Self::open_at(Path::new(DEFAULT_SYSFS_ROOT), chip, channel)
    }

    /// Like `open`, under an alternative sysfs class root.
    pub fn open_at(root: &Path, chip: u32, channel: u32) -> Result<Self> {
        let chip_dir = root.join("pwm").join(format!("pwmchip{chip}"));
        if !chip_dir.exists() {
            return Err(anyhow!(
                "PWM chip {} not found (is the pwm overlay enabled?)",
                chip_dir.display()
            ));
        }
        let channel_dir = chip_dir.join(format!("pwm{channel}"));
        export_line(&chip_dir.join("export"), channel, &channel_dir)?;

        // Duty must not exceed the period, so clear it before setting the period.
        write_attr(&channel_dir.join("duty_cycle"), "0")?;
        write_attr(&channel_dir.join("period"), &SERVO_PERIOD_NS.to_string())?;

        log::info!("pwm servo on {}", channel_dir.display());
        Ok(Self {
            chip_dir,
            channel,
            channel_dir,
            enabled: false,
            released: false,
        })
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if self.enabled != enabled {
            write_attr(&self.channel_dir.join("enable"), if enabled { "1" } else { "0" })?;
            self.enabled = enabled;
        }
        Ok(())
    }
}

/// Pulse width in nanoseconds for a duty cycle percentage.
pub fn duty_to_ns(duty_percent: f32) -> u64 {
    let duty = duty_percent.clamp(0.0, 100.0) as f64 / 100.0;
    (SERVO_PERIOD_NS as f64 * duty).round() as u64
}

impl ServoOutput for SysfsPwmServo {
    fn name(&self) -> &'static str {
        "sysfs-pwm"
    }

    fn drive(&mut self, duty_percent: f32) -> Result<()> {
        if self.released {
            return Err(anyhow!("pwm servo already released"));
        }
        write_attr(
            &self.channel_dir.join("duty_cycle"),
            &duty_to_ns(duty_percent).to_string(),
        )?;
        self.set_enabled(true)
    }

    fn idle(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        write_attr(&self.channel_dir.join("duty_cycle"), "0")?;
        self.set_enabled(false)
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        let idled = self.idle();
        self.released = true;
        let unexported = write_attr(&self.chip_dir.join("unexport"), &self.channel.to_string());
        idled.and(unexported)
    }
}

// ----------------------------------------------------------------------------
// SysfsGpioIndicator
// ----------------------------------------------------------------------------

/// Indicator LED on a sysfs GPIO line.
pub struct SysfsGpioIndicator {
    gpio_dir: PathBuf,
    pin: u32,
    line_dir: PathBuf,
    released: bool,
}

impl SysfsGpioIndicator {
    /// Export `gpio{pin}` as an output, initially low.
    pub fn open(pin: u32) -> Result<Self> {
        Self::open_at(Path::new(DEFAULT_SYSFS_ROOT), pin)
    }

    /// Like `open`, under an alternative sysfs class root.
    pub fn open_at(root: &Path, pin: u32) -> Result<Self> {
        let gpio_dir = root.join("gpio");
        let line_dir = gpio_dir.join(format!("gpio{pin}"));
        export_line(&gpio_dir.join("export"), pin, &line_dir)?;
        // "low" sets direction and initial value in one write, without a glitch.
        write_attr(&line_dir.join("direction"), "low")?;

        log::info!("gpio indicator on {}", line_dir.display());
        Ok(Self {
            gpio_dir,
            pin,
            line_dir,
            released: false,
        })
    }
}

impl IndicatorOutput for SysfsGpioIndicator {
    fn name(&self) -> &'static str {
        "sysfs-gpio"
    }

    fn set(&mut self, on: bool) -> Result<()> {
        if self.released {
            return Err(anyhow!("gpio indicator already released"));
        }
        write_attr(&self.line_dir.join("value"), if on { "1" } else { "0" })
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let _ = write_attr(&self.line_dir.join("value"), "0");
        write_attr(&self.gpio_dir.join("unexport"), &self.pin.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    fn fake_pwm_tree(root: &Path) -> PathBuf {
        let channel_dir = root.join("pwm/pwmchip0/pwm0");
        fs::create_dir_all(&channel_dir).unwrap();
        channel_dir
    }

    #[test]
    fn duty_maps_to_pulse_width() {
        assert_eq!(duty_to_ns(2.0), 400_000);
        assert_eq!(duty_to_ns(7.0), 1_400_000);
        assert_eq!(duty_to_ns(12.0), 2_400_000);
        assert_eq!(duty_to_ns(150.0), SERVO_PERIOD_NS);
    }

    #[test]
    fn pwm_servo_programs_period_and_pulses() -> Result<()> {
        let root = tempfile::tempdir()?;
        let channel_dir = fake_pwm_tree(root.path());

        let mut servo = SysfsPwmServo::open_at(root.path(), 0, 0)?;
        assert_eq!(read(&channel_dir.join("period")), "20000000");

        servo.drive(7.0)?;
        assert_eq!(read(&channel_dir.join("duty_cycle")), "1400000");
        assert_eq!(read(&channel_dir.join("enable")), "1");

        servo.idle()?;
        assert_eq!(read(&channel_dir.join("duty_cycle")), "0");
        assert_eq!(read(&channel_dir.join("enable")), "0");

        servo.release()?;
        servo.release()?;
        assert_eq!(read(&root.path().join("pwm/pwmchip0/unexport")), "0");
        assert!(servo.drive(7.0).is_err());
        Ok(())
    }

    #[test]
    fn pwm_release_unexports_even_when_idle_fails() -> Result<()> {
        let root = tempfile::tempdir()?;
        let channel_dir = fake_pwm_tree(root.path());
        let mut servo = SysfsPwmServo::open_at(root.path(), 0, 0)?;

        fs::remove_file(channel_dir.join("duty_cycle"))?;
        fs::create_dir(channel_dir.join("duty_cycle"))?;

        assert!(servo.release().is_err());
        assert_eq!(read(&root.path().join("pwm/pwmchip0/unexport")), "0");
        servo.release()?;
        Ok(())
    }

    #[test]
    fn missing_pwm_chip_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        assert!(SysfsPwmServo::open_at(root.path(), 3, 0).is_err());
    }

    #[test]
    fn gpio_indicator_toggles_value() -> Result<()> {
        let root = tempfile::tempdir()?;
        let line_dir = root.path().join("gpio/gpio15");
        fs::create_dir_all(&line_dir)?;

        let mut led = SysfsGpioIndicator::open_at(root.path(), 15)?;
        assert_eq!(read(&line_dir.join("direction")), "low");

        led.set(true)?;
        assert_eq!(read(&line_dir.join("value")), "1");
        led.set(false)?;
        assert_eq!(read(&line_dir.join("value")), "0");

        led.release()?;
        assert_eq!(read(&root.path().join("gpio/unexport")), "15");
        assert!(led.set(true).is_err());
        Ok(())
    }
}
