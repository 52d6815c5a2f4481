use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use pan_tracker::behavior::{PanPolarity, SelectionPolicy};
use pan_tracker::config::{HardwareBackend, TrackerConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PAN_TRACKER_CONFIG",
        "PAN_TRACKER_MODEL",
        "PAN_TRACKER_CAMERA",
        "PAN_TRACKER_SCORE_THRESHOLD",
        "PAN_TRACKER_HARDWARE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_defaults_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = TrackerConfig::load().expect("load config");
    assert_eq!(cfg.detector.max_results, 5);
    assert_eq!(cfg.detector.score_threshold, 0.6);
    assert_eq!(cfg.camera.id, 0);
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.servo.backend, HardwareBackend::Sysfs);
    assert_eq!(cfg.servo.settle, Duration::from_millis(500));
    assert_eq!(cfg.tracking.tolerance_px, 20);
    assert_eq!(cfg.tracking.correction_step_deg, 5.0);
    assert_eq!(cfg.servo.sweep_step_deg, 10.0);

    clear_env();
}

#[test]
fn loads_json_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "detector": {
            "model_path": "models/people.onnx",
            "max_results": 3,
            "score_threshold": 0.5,
            "backend": "tract"
        },
        "camera": {
            "id": 1,
            "width": 320,
            "height": 240
        },
        "servo": {
            "settle_ms": 250,
            "sweep_step_deg": 15.0
        },
        "tracking": {
            "tolerance_px": 12,
            "selection": "highest_score"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("PAN_TRACKER_CONFIG", file.path());
    std::env::set_var("PAN_TRACKER_SCORE_THRESHOLD", "0.75");
    std::env::set_var("PAN_TRACKER_CAMERA", "2");
    std::env::set_var("PAN_TRACKER_HARDWARE", "sim");

    let cfg = TrackerConfig::load().expect("load config");

    assert_eq!(cfg.detector.model_path.to_str(), Some("models/people.onnx"));
    assert_eq!(cfg.detector.max_results, 3);
    assert_eq!(cfg.detector.score_threshold, 0.75);
    assert_eq!(cfg.detector.backend, "tract");
    assert_eq!(cfg.camera.id, 2);
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.servo.backend, HardwareBackend::Sim);
    assert_eq!(cfg.servo.settle, Duration::from_millis(250));
    assert_eq!(cfg.scan_behavior().step_degrees(), 15.0);
    assert_eq!(cfg.tracking.tolerance_px, 12);
    assert_eq!(cfg.tracking.selection, SelectionPolicy::HighestScore);
    assert_eq!(cfg.detector_options().max_results, 3);

    clear_env();
}

#[test]
fn loads_toml_config_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
[camera]
source = "stub://bench"
rotate_180 = false

[tracking]
polarity = "inverted"
lock_threshold = 3

[indicator]
gpio_pin = 23
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("PAN_TRACKER_CONFIG", file.path());
    std::env::set_var("PAN_TRACKER_CAMERA", "stub://override");

    let cfg = TrackerConfig::load().expect("load config");
    assert_eq!(cfg.camera.source, "stub://override");
    assert!(!cfg.camera.rotate_180);
    assert_eq!(cfg.tracking.polarity, PanPolarity::Inverted);
    assert_eq!(cfg.tracking.lock_threshold, 3);
    assert_eq!(cfg.indicator.gpio_pin, 23);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PAN_TRACKER_SCORE_THRESHOLD", "high");
    assert!(TrackerConfig::load().is_err());

    std::env::set_var("PAN_TRACKER_SCORE_THRESHOLD", "1.2");
    assert!(TrackerConfig::load().is_err());
    clear_env();

    std::env::set_var("PAN_TRACKER_HARDWARE", "i2c");
    assert!(TrackerConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"tracking": {"lock_threshold": 0}}"#)
        .expect("write config");
    std::env::set_var("PAN_TRACKER_CONFIG", file.path());
    assert!(TrackerConfig::load().is_err());

    std::env::set_var("PAN_TRACKER_CONFIG", "/nonexistent/pan_tracker.json");
    assert!(TrackerConfig::load().is_err());

    clear_env();
}
