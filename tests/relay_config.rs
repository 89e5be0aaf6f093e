use std::sync::Mutex;
use std::time::Duration;

use tempfile::Builder;

use crackstream::config::RelayConfig;
use crackstream::detect::InputLayout;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CRACKSTREAM_CONFIG",
        "CRACKSTREAM_STREAM_URL",
        "CRACKSTREAM_MODEL_PATH",
        "CRACKSTREAM_RETRY_SECS",
        "CRACKSTREAM_FPS",
        "CRACKSTREAM_PLACEHOLDER_FONT",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(suffix: &str, body: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_match_reference_relay() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = RelayConfig::load().expect("load defaults");

    assert_eq!(cfg.stream.url, "http://192.168.2.1:5000/camera/1");
    assert_eq!(cfg.stream.retry_interval, Duration::from_secs(5));
    assert_eq!(cfg.stream.connect_timeout, Duration::from_secs(10));
    assert_eq!(cfg.output.fps, 30.0);
    assert_eq!((cfg.output.width, cfg.output.height), (800, 450));
    assert_eq!(cfg.output.quality, 95);
    assert_eq!((cfg.detector.input_width, cfg.detector.input_height), (128, 128));
    assert_eq!(cfg.detector.threshold, 0.5);
    assert!(cfg.detector.invert_output);
    assert!(cfg.detector.model_path.is_none());
    assert_eq!(cfg.cameras.len(), 2);
    assert_eq!(cfg.cameras[0].device, "/dev/video0");
    assert!(cfg.cameras[0].rotate_180);
    assert!(!cfg.cameras[1].rotate_180);
    assert_eq!((cfg.cameras[1].width, cfg.cameras[1].height), (1920, 1080));
    assert_eq!(cfg.camera_output.fps, 60.0);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".json",
        r#"{
            "stream": { "url": "http://relay.local:8080/cam", "retry_secs": 2 },
            "output": { "fps": 15, "width": 640, "height": 360, "quality": 80 },
            "detector": { "threshold": 0.7, "invert_output": false, "layout": "nchw" },
            "cameras": [ { "device": "stub://front", "width": 320, "height": 240 } ]
        }"#,
    );
    std::env::set_var("CRACKSTREAM_CONFIG", file.path());
    std::env::set_var("CRACKSTREAM_FPS", "12.5");
    std::env::set_var("CRACKSTREAM_MODEL_PATH", "/models/crack.onnx");

    let cfg = RelayConfig::load().expect("load config");

    assert_eq!(cfg.stream.url, "http://relay.local:8080/cam");
    assert_eq!(cfg.stream.retry_interval, Duration::from_secs(2));
    assert_eq!(cfg.output.fps, 12.5);
    assert_eq!((cfg.output.width, cfg.output.height), (640, 360));
    assert_eq!(cfg.output.quality, 80);
    assert_eq!(cfg.detector.threshold, 0.7);
    assert!(!cfg.detector.invert_output);
    assert_eq!(cfg.detector.layout, InputLayout::Nchw);
    assert_eq!(
        cfg.detector.model_path.as_deref(),
        Some(std::path::Path::new("/models/crack.onnx"))
    );
    assert_eq!(cfg.cameras.len(), 1);
    assert_eq!(cfg.cameras[0].device, "stub://front");
    assert!(cfg.cameras[0].rotate_180);
    assert_eq!(cfg.cameras[0].fps, 60);

    clear_env();
}

#[test]
fn loads_toml_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        ".toml",
        r#"
            placeholder_font = "/opt/fonts/mono.ttf"

            [stream]
            url = "https://relay.example/stream"

            [[cameras]]
            device = "stub://a"
            rotate_180 = false

            [[cameras]]
            device = "stub://b"
            rotate_180 = true
        "#,
    );

    let cfg = RelayConfig::load_from(Some(file.path())).expect("load toml");

    assert_eq!(cfg.stream.url, "https://relay.example/stream");
    assert_eq!(
        cfg.placeholder_font.as_deref(),
        Some(std::path::Path::new("/opt/fonts/mono.ttf"))
    );
    assert!(!cfg.cameras[0].rotate_180);
    assert!(cfg.cameras[1].rotate_180);
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for body in [
        r#"{ "stream": { "url": "rtsp://camera" } }"#,
        r#"{ "stream": { "retry_secs": 0 } }"#,
        r#"{ "output": { "fps": 0 } }"#,
        r#"{ "output": { "quality": 0 } }"#,
        r#"{ "detector": { "threshold": 1.5 } }"#,
        r#"{ "detector": { "input_width": 0 } }"#,
        r#"{ "cameras": [ { "width": 0 } ] }"#,
    ] {
        let file = config_file(".json", body);
        assert!(
            RelayConfig::load_from(Some(file.path())).is_err(),
            "accepted {}",
            body
        );
    }

    std::env::set_var("CRACKSTREAM_RETRY_SECS", "soon");
    assert!(RelayConfig::load().is_err());
    clear_env();
}

#[test]
fn stream_url_env_override_wins_over_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(".json", r#"{ "stream": { "url": "http://file.local/cam" } }"#);
    std::env::set_var("CRACKSTREAM_CONFIG", file.path());
    std::env::set_var("CRACKSTREAM_STREAM_URL", "http://env.local/cam");

    let cfg = RelayConfig::load().expect("load config");
    assert_eq!(cfg.stream.url, "http://env.local/cam");

    clear_env();
}
