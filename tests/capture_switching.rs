use std::path::Path;
use std::sync::Mutex;

use image::{Rgb, RgbImage};

use detektor::{active_source_count, CameraManager, CaptureConfig, CaptureError, SourceDescriptor};

// Source-count assertions share one lock so parallel tests cannot disturb
// the process-wide counter mid-assertion.
static COUNT_LOCK: Mutex<()> = Mutex::new(());

fn small_config() -> CaptureConfig {
    CaptureConfig {
        width: 32,
        height: 32,
        ..CaptureConfig::default()
    }
}

fn write_frames(dir: &Path, count: u8) {
    for i in 0..count {
        let image = RgbImage::from_pixel(4, 4, Rgb([i * 20, 0, 0]));
        image
            .save(dir.join(format!("frame_{:03}.png", i)))
            .expect("write frame image");
    }
}

#[test]
fn video_source_loops_to_the_first_frame() {
    let dir = tempfile::tempdir().expect("temp dir");
    write_frames(dir.path(), 4);

    let mut camera = CameraManager::new(small_config());
    camera
        .open(SourceDescriptor::VideoFile(dir.path().to_path_buf()))
        .expect("open video source");

    let first = camera.next_frame().expect("frame 1");
    for _ in 0..3 {
        camera.next_frame().expect("frames 2..4");
    }
    // Request N+1 of an N-frame clip: the first frame comes back.
    let looped = camera.next_frame().expect("frame 5");
    assert_eq!(first.pixels(), looped.pixels());
}

#[cfg(not(feature = "capture-v4l2"))]
#[test]
fn switching_sources_never_leaves_the_previous_backend_open() {
    let _guard = COUNT_LOCK.lock().unwrap();
    let baseline = active_source_count();

    let frames = tempfile::tempdir().expect("temp dir");
    write_frames(frames.path(), 2);

    let mut camera = CameraManager::new(small_config());

    camera
        .open(SourceDescriptor::Webcam(0))
        .expect("open webcam");
    assert_eq!(active_source_count(), baseline + 1);

    // Rebinding closes the webcam before the video source opens.
    camera
        .open(SourceDescriptor::VideoFile(frames.path().to_path_buf()))
        .expect("open video source");
    assert_eq!(active_source_count(), baseline + 1);
    assert_eq!(
        camera.descriptor(),
        Some(&SourceDescriptor::VideoFile(frames.path().to_path_buf()))
    );

    camera.close();
    assert_eq!(active_source_count(), baseline);
    assert!(!camera.is_open());
}

#[cfg(not(feature = "capture-v4l2"))]
#[test]
fn dropping_the_manager_releases_the_backend() {
    let _guard = COUNT_LOCK.lock().unwrap();
    let baseline = active_source_count();

    {
        let mut camera = CameraManager::new(small_config());
        camera
            .open(SourceDescriptor::Webcam(1))
            .expect("open webcam");
        assert_eq!(active_source_count(), baseline + 1);
    }

    assert_eq!(active_source_count(), baseline);
}

#[test]
fn next_frame_without_open_source_is_an_error() {
    let mut camera = CameraManager::new(small_config());
    assert!(matches!(
        camera.next_frame(),
        Err(CaptureError::NotOpen)
    ));
}

#[cfg(not(feature = "capture-v4l2"))]
#[test]
fn snapshot_returns_the_latest_frame() {
    let mut camera = CameraManager::new(small_config());
    camera
        .open(SourceDescriptor::Webcam(0))
        .expect("open webcam");

    assert!(matches!(
        camera.snapshot(),
        Err(CaptureError::NoFrameYet)
    ));

    let frame = camera.next_frame().expect("capture frame");
    let snapshot = camera.snapshot().expect("snapshot");
    assert_eq!(snapshot.pixels(), frame.pixels());
}

#[cfg(not(feature = "industrial-gstreamer"))]
#[test]
fn industrial_sources_fail_cleanly_without_the_feature() {
    let mut camera = CameraManager::new(small_config());
    let err = camera
        .open(SourceDescriptor::Industrial(0))
        .expect_err("industrial must not open");
    assert!(matches!(err, CaptureError::OpenFailed { .. }));

    // Webcam and video operation are unaffected.
    #[cfg(not(feature = "capture-v4l2"))]
    {
        camera
            .open(SourceDescriptor::Webcam(0))
            .expect("webcam still works");
        assert!(camera.is_open());
    }
}

#[test]
fn missing_video_path_fails_to_open() {
    let mut camera = CameraManager::new(small_config());
    let err = camera
        .open(SourceDescriptor::VideoFile("does/not/exist".into()))
        .expect_err("missing path must not open");
    assert!(matches!(err, CaptureError::OpenFailed { .. }));
    assert!(!camera.is_open());
}
