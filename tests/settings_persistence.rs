use std::path::Path;

use detektor::{Settings, SourceDescriptor};

#[test]
fn absent_file_yields_documented_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings = Settings::load(&dir.path().join("settings.json"));

    assert_eq!(settings.confidence_threshold, 0.5);
    assert_eq!(settings.last_source, SourceDescriptor::Webcam(0));
    assert!(settings.show_confidence);
    assert!(settings.show_class_names);
    assert_eq!(settings.video_width, 1280);
    assert_eq!(settings.video_height, 720);
    assert_eq!(settings.last_model, "");
}

#[test]
fn save_then_load_round_trips_every_field() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("settings.json");

    let settings = Settings {
        confidence_threshold: 0.35,
        last_model: "models/widgets.onnx".to_string(),
        last_source: SourceDescriptor::VideoFile("clips/line_a.mp4".into()),
        video_width: 1920,
        video_height: 1080,
        show_confidence: false,
        show_class_names: true,
        sidebar_width: 400,
        auto_save_snapshots: true,
        log_level: "DEBUG".to_string(),
    };
    settings.save(&path).expect("save settings");

    let reloaded = Settings::load(&path);
    assert_eq!(reloaded, settings);
}

#[test]
fn threshold_change_survives_reload_with_other_fields_unchanged() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("settings.json");

    // First run: defaults, user raises the threshold and saves.
    let mut settings = Settings::load(&path);
    assert_eq!(settings.confidence_threshold, 0.5);
    settings.confidence_threshold = 0.8;
    settings.save(&path).expect("save settings");

    // Next run sees the new threshold and nothing else changed.
    let reloaded = Settings::load(&path);
    assert_eq!(reloaded.confidence_threshold, 0.8);
    assert_eq!(
        Settings {
            confidence_threshold: 0.5,
            ..reloaded
        },
        Settings::default()
    );
}

#[test]
fn corrupt_file_falls_back_to_defaults() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("settings.json");
    std::fs::write(&path, "{ not json at all").expect("write corrupt file");

    assert_eq!(Settings::load(&path), Settings::default());
}

#[test]
fn partially_corrupt_file_keeps_the_good_fields() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("settings.json");
    std::fs::write(
        &path,
        r#"{
            "confidence_threshold": "not a number",
            "video_width": 800,
            "show_class_names": false
        }"#,
    )
    .expect("write settings");

    let settings = Settings::load(&path);
    assert_eq!(settings.confidence_threshold, 0.5);
    assert_eq!(settings.video_width, 800);
    assert!(!settings.show_class_names);
}

#[test]
fn save_leaves_no_temp_file_behind() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("settings.json");
    Settings::default().save(&path).expect("save settings");

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["settings.json".to_string()]);
    assert!(Path::new(&path).exists());
}
