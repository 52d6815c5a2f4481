use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::actuation::{ActuationSettings, Angle, DEFAULT_SETTLE};
use crate::behavior::scan::DEFAULT_SWEEP_STEP;
use crate::behavior::track::{DEFAULT_CORRECTION_STEP, DEFAULT_TOLERANCE_PX};
use crate::behavior::{PanPolarity, ScanBehavior, SelectionPolicy, TrackingBehavior};
use crate::controller::DEFAULT_LOCK_THRESHOLD;
use crate::detect::DetectorOptions;

const DEFAULT_MODEL_PATH: &str = "best.onnx";
const DEFAULT_MAX_RESULTS: usize = 5;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.6;
const DEFAULT_BACKEND: &str = "cpu";
const DEFAULT_CAMERA_ID: u32 = 0;
const DEFAULT_CAMERA_SOURCE: &str = "v4l2";
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;
const DEFAULT_INITIAL_ANGLE_DEG: f32 = 0.0;
const DEFAULT_GPIO_PIN: u32 = 15;
const DEFAULT_FPS_INTERVAL_SECS: u64 = 1;
const MAX_SETTLE_MS: u64 = 5_000;

#[derive(Debug, Deserialize, Default)]
struct TrackerConfigFile {
    detector: Option<DetectorConfigFile>,
    camera: Option<CameraConfigFile>,
    servo: Option<ServoConfigFile>,
    indicator: Option<IndicatorConfigFile>,
    tracking: Option<TrackingConfigFile>,
    telemetry: Option<TelemetryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    model_path: Option<PathBuf>,
    max_results: Option<usize>,
    score_threshold: Option<f32>,
    backend: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    id: Option<u32>,
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    rotate_180: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ServoConfigFile {
    backend: Option<HardwareBackend>,
    pwm_chip: Option<u32>,
    pwm_channel: Option<u32>,
    settle_ms: Option<u64>,
    sweep_step_deg: Option<f32>,
    initial_angle_deg: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct IndicatorConfigFile {
    gpio_pin: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct TrackingConfigFile {
    tolerance_px: Option<u32>,
    correction_step_deg: Option<f32>,
    lock_threshold: Option<u64>,
    selection: Option<SelectionPolicy>,
    polarity: Option<PanPolarity>,
}

#[derive(Debug, Deserialize, Default)]
struct TelemetryConfigFile {
    fps_interval_secs: Option<u64>,
}

/// Complete runtime configuration of the tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub detector: DetectorSettings,
    pub camera: CameraSettings,
    pub servo: ServoSettings,
    pub indicator: IndicatorSettings,
    pub tracking: TrackingSettings,
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub model_path: PathBuf,
    pub max_results: usize,
    pub score_threshold: f32,
    /// `cpu`, `stub` or `tract`.
    pub backend: String,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub id: u32,
    /// `stub://…` for the synthetic source, a device path, or `v4l2` for
    /// `/dev/video{id}`.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub rotate_180: bool,
}

/// Where servo and indicator commands go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HardwareBackend {
    /// Linux sysfs PWM and GPIO.
    #[default]
    Sysfs,
    /// In-memory outputs, for bench runs.
    Sim,
}

impl HardwareBackend {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sysfs" => Ok(HardwareBackend::Sysfs),
            "sim" => Ok(HardwareBackend::Sim),
            other => Err(anyhow!(
                "unknown hardware backend '{}' (expected sysfs or sim)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServoSettings {
    pub backend: HardwareBackend,
    pub pwm_chip: u32,
    pub pwm_channel: u32,
    pub settle: Duration,
    pub sweep_step_deg: f32,
    pub initial_angle_deg: f32,
}

#[derive(Debug, Clone)]
pub struct IndicatorSettings {
    pub gpio_pin: u32,
}

#[derive(Debug, Clone)]
pub struct TrackingSettings {
    pub tolerance_px: u32,
    pub correction_step_deg: f32,
    pub lock_threshold: u64,
    pub selection: SelectionPolicy,
    pub polarity: PanPolarity,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub fps_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::from_file(TrackerConfigFile::default())
    }
}

impl TrackerConfig {
    /// Defaults, then the file named by `PAN_TRACKER_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("PAN_TRACKER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: TrackerConfigFile) -> Self {
        let detector = file.detector.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let servo = file.servo.unwrap_or_default();
        let indicator = file.indicator.unwrap_or_default();
        let tracking = file.tracking.unwrap_or_default();
        let telemetry = file.telemetry.unwrap_or_default();

        Self {
            detector: DetectorSettings {
                model_path: detector
                    .model_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                max_results: detector.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
                score_threshold: detector.score_threshold.unwrap_or(DEFAULT_SCORE_THRESHOLD),
                backend: detector
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            },
            camera: CameraSettings {
                id: camera.id.unwrap_or(DEFAULT_CAMERA_ID),
                source: camera
                    .source
                    .unwrap_or_else(|| DEFAULT_CAMERA_SOURCE.to_string()),
                width: camera.width.unwrap_or(DEFAULT_FRAME_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_FRAME_HEIGHT),
                rotate_180: camera.rotate_180.unwrap_or(true),
            },
            servo: ServoSettings {
                backend: servo.backend.unwrap_or_default(),
                pwm_chip: servo.pwm_chip.unwrap_or(0),
                pwm_channel: servo.pwm_channel.unwrap_or(0),
                settle: servo
                    .settle_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_SETTLE),
                sweep_step_deg: servo.sweep_step_deg.unwrap_or(DEFAULT_SWEEP_STEP),
                initial_angle_deg: servo
                    .initial_angle_deg
                    .unwrap_or(DEFAULT_INITIAL_ANGLE_DEG),
            },
            indicator: IndicatorSettings {
                gpio_pin: indicator.gpio_pin.unwrap_or(DEFAULT_GPIO_PIN),
            },
            tracking: TrackingSettings {
                tolerance_px: tracking.tolerance_px.unwrap_or(DEFAULT_TOLERANCE_PX),
                correction_step_deg: tracking
                    .correction_step_deg
                    .unwrap_or(DEFAULT_CORRECTION_STEP),
                lock_threshold: tracking.lock_threshold.unwrap_or(DEFAULT_LOCK_THRESHOLD),
                selection: tracking.selection.unwrap_or_default(),
                polarity: tracking.polarity.unwrap_or_default(),
            },
            telemetry: TelemetrySettings {
                fps_interval: Duration::from_secs(
                    telemetry
                        .fps_interval_secs
                        .unwrap_or(DEFAULT_FPS_INTERVAL_SECS),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(model) = std::env::var("PAN_TRACKER_MODEL") {
            if !model.trim().is_empty() {
                self.detector.model_path = PathBuf::from(model);
            }
        }
        if let Ok(camera) = std::env::var("PAN_TRACKER_CAMERA") {
            let camera = camera.trim();
            if !camera.is_empty() {
                match camera.parse::<u32>() {
                    Ok(id) => self.camera.id = id,
                    Err(_) => self.camera.source = camera.to_string(),
                }
            }
        }
        if let Ok(threshold) = std::env::var("PAN_TRACKER_SCORE_THRESHOLD") {
            self.detector.score_threshold = threshold.trim().parse().map_err(|_| {
                anyhow!("PAN_TRACKER_SCORE_THRESHOLD must be a number between 0 and 1")
            })?;
        }
        if let Ok(hardware) = std::env::var("PAN_TRACKER_HARDWARE") {
            if !hardware.trim().is_empty() {
                self.servo.backend = HardwareBackend::parse(&hardware)?;
            }
        }
        Ok(())
    }

    /// Check ranges. Also run by the binaries after CLI overrides.
    pub fn validate(&self) -> Result<()> {
        let score = self.detector.score_threshold;
        if !(0.0..=1.0).contains(&score) {
            return Err(anyhow!(
                "score threshold must be within [0, 1], got {}",
                score
            ));
        }
        if self.detector.max_results == 0 {
            return Err(anyhow!("max_results must be at least 1"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "frame size must be non-zero, got {}x{}",
                self.camera.width,
                self.camera.height
            ));
        }
        if self.servo.settle > Duration::from_millis(MAX_SETTLE_MS) {
            return Err(anyhow!(
                "servo settle time must be at most {} ms",
                MAX_SETTLE_MS
            ));
        }
        check_step("sweep_step_deg", self.servo.sweep_step_deg)?;
        check_step("correction_step_deg", self.tracking.correction_step_deg)?;
        if self.tracking.lock_threshold == 0 {
            return Err(anyhow!("lock_threshold must be at least 1"));
        }
        let initial = self.servo.initial_angle_deg;
        if !(Angle::MIN..=Angle::MAX).contains(&initial) {
            return Err(anyhow!(
                "initial angle must be within [{}, {}], got {}",
                Angle::MIN,
                Angle::MAX,
                initial
            ));
        }
        Ok(())
    }

    /// Model file the configured backend loads. Only `tract` reads one.
    pub fn model_in_use(&self) -> Option<&Path> {
        (self.detector.backend == "tract").then_some(self.detector.model_path.as_path())
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            max_results: self.detector.max_results,
            score_threshold: self.detector.score_threshold,
        }
    }

    pub fn actuation_settings(&self) -> ActuationSettings {
        ActuationSettings {
            settle: self.servo.settle,
            initial_angle: Angle::clamped(self.servo.initial_angle_deg),
        }
    }

    pub fn scan_behavior(&self) -> ScanBehavior {
        ScanBehavior::new(self.servo.sweep_step_deg)
    }

    pub fn tracking_behavior(&self) -> TrackingBehavior {
        TrackingBehavior {
            tolerance_px: self.tracking.tolerance_px,
            step: self.tracking.correction_step_deg,
            selection: self.tracking.selection,
            polarity: self.tracking.polarity,
        }
    }
}

fn check_step(name: &str, step: f32) -> Result<()> {
    if !(step > 0.0 && step <= Angle::MAX) {
        return Err(anyhow!("{} must be within (0, 180], got {}", name, step));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<TrackerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
