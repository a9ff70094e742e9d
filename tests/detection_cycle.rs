//! End-to-end cycle: synthetic webcam -> stub model -> annotate -> preview
//! file sink, driven through the public `App` surface.

#![cfg(not(feature = "capture-v4l2"))]

use std::path::Path;

use detektor::{App, PreviewFileDisplay, Settings, TickOutcome};

fn test_settings() -> Settings {
    Settings {
        video_width: 64,
        video_height: 48,
        ..Settings::default()
    }
}

#[test]
fn bounded_run_processes_frames_and_releases_the_source() {
    let dir = tempfile::tempdir().expect("temp dir");
    let preview = dir.path().join("preview").join("live.jpg");
    let settings_path = dir.path().join("settings.json");

    let mut app = App::new(
        test_settings(),
        settings_path,
        Box::new(PreviewFileDisplay::new(preview.clone())),
    )
    .with_snapshot_dir(dir.path().join("snapshots"));
    app.engine_mut()
        .load_model(Path::new("stub://model"))
        .expect("load stub model");

    app.run(Some(3)).expect("bounded run");

    assert_eq!(app.stats().frames_processed, 3);
    assert!(app.stats().objects_detected > 0);
    assert!(!app.is_running());
    assert!(preview.exists(), "preview sink received frames");
}

#[test]
fn ticks_keep_flowing_without_a_model() {
    let dir = tempfile::tempdir().expect("temp dir");
    let settings_path = dir.path().join("settings.json");

    let mut app = App::new(
        test_settings(),
        settings_path,
        Box::new(detektor::NullDisplay),
    );

    app.start().expect("start");
    let outcome = app.tick().expect("tick");
    assert_eq!(outcome, TickOutcome::Frame { detections: 0 });
    app.stop();
}

#[test]
fn source_switch_mid_session_is_persisted() {
    let dir = tempfile::tempdir().expect("temp dir");
    let frames = dir.path().join("clip");
    std::fs::create_dir_all(&frames).expect("frame dir");
    for i in 0..2u8 {
        image::RgbImage::from_pixel(4, 4, image::Rgb([i, i, i]))
            .save(frames.join(format!("{}.png", i)))
            .expect("write frame");
    }
    let settings_path = dir.path().join("settings.json");

    let mut app = App::new(
        test_settings(),
        settings_path.clone(),
        Box::new(detektor::NullDisplay),
    );
    app.start().expect("start");
    app.tick().expect("tick on webcam");

    app.select_source(detektor::SourceDescriptor::VideoFile(frames.clone()))
        .expect("switch to video");
    app.tick().expect("tick on video");
    app.stop();
    assert_eq!(app.tick().expect("tick after stop"), TickOutcome::Stopped);

    let reloaded = Settings::load(&settings_path);
    assert_eq!(
        reloaded.last_source,
        detektor::SourceDescriptor::VideoFile(frames)
    );
}
