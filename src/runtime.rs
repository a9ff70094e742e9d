//! Application runtime.
//!
//! Drives the per-tick cycle: acquire a frame from the camera manager, run
//! detection, annotate, paint the result onto the display, update session
//! statistics. One tick processes one frame; there is no other control flow.
//!
//! Stop requests are honored before the next tick begins and always release
//! the capture backend. Capture errors stop the cycle (after the bounded
//! retry inside the capture layer); detection errors are fatal to their tick
//! only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::annotate::AnnotateOptions;
use crate::capture::{CameraManager, CaptureConfig, SourceDescriptor};
use crate::detect::{DetectionEngine, ModelLoadError, MotionDetector};
use crate::display::Display;
use crate::settings::{clamp_threshold, Settings};
use crate::snapshot;

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Running counters for the current session. Reset on every start.
#[derive(Debug, Default)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub objects_detected: u64,
    pub objects_by_class: HashMap<String, u64>,
    pub detect_errors: u64,
    pub last_detection_count: usize,
    /// Mean frame difference against the previous frame, in [0, 1].
    pub motion_level: f32,
    started_at: Option<Instant>,
}

impl SessionStats {
    fn reset(&mut self) {
        *self = Self {
            started_at: Some(Instant::now()),
            ..Self::default()
        };
    }

    /// Frames per second since the session started.
    pub fn fps(&self) -> f32 {
        let Some(started_at) = self.started_at else {
            return 0.0;
        };
        let elapsed = started_at.elapsed().as_secs_f32();
        if elapsed > 0.0 {
            self.frames_processed as f32 / elapsed
        } else {
            0.0
        }
    }
}

/// What a single tick did.
#[derive(Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was processed and displayed.
    Frame { detections: usize },
    /// Detection failed; the tick was skipped, the cycle continues.
    SkippedDetection,
    /// The cycle is not (or no longer) running.
    Stopped,
}

/// Owns the capture source, the detection engine and the display, and maps
/// user controls onto them.
pub struct App {
    settings: Settings,
    settings_path: PathBuf,
    camera: CameraManager,
    engine: DetectionEngine,
    display: Box<dyn Display>,
    motion: MotionDetector,
    stats: SessionStats,
    snapshot_dir: PathBuf,
    running: bool,
    stop_requested: Arc<AtomicBool>,
    last_stats_log: Instant,
    // Edge trigger for auto-saved snapshots: only the first tick of a
    // detection streak writes one.
    had_detections: bool,
}

impl App {
    pub fn new(settings: Settings, settings_path: PathBuf, display: Box<dyn Display>) -> Self {
        let capture_config = CaptureConfig {
            width: settings.video_width,
            height: settings.video_height,
            ..CaptureConfig::default()
        };
        Self {
            camera: CameraManager::new(capture_config),
            engine: DetectionEngine::new(),
            display,
            motion: MotionDetector::new(),
            stats: SessionStats::default(),
            snapshot_dir: PathBuf::from("snapshots"),
            running: false,
            stop_requested: Arc::new(AtomicBool::new(false)),
            last_stats_log: Instant::now(),
            had_detections: false,
            settings,
            settings_path,
        }
    }

    pub fn with_snapshot_dir(mut self, dir: PathBuf) -> Self {
        self.snapshot_dir = dir;
        self
    }

    /// Flag that outside code (e.g. a Ctrl-C handler) sets to request a stop
    /// before the next tick.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop_requested.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn engine_mut(&mut self) -> &mut DetectionEngine {
        &mut self.engine
    }

    // ---- controls (1:1 with settings fields plus transient actions) ----

    /// Load a model file. On failure the previous model remains active.
    pub fn load_model(&mut self, path: &Path) -> Result<(), ModelLoadError> {
        self.engine.load_model(path)?;
        self.settings.last_model = path.to_string_lossy().into_owned();
        self.save_settings();
        Ok(())
    }

    /// Bind a new capture source, closing the previous backend first.
    pub fn select_source(&mut self, descriptor: SourceDescriptor) -> Result<()> {
        self.camera
            .open(descriptor.clone())
            .with_context(|| format!("select source {}", descriptor))?;
        self.settings.last_source = descriptor;
        self.save_settings();
        Ok(())
    }

    pub fn set_confidence_threshold(&mut self, threshold: f32) {
        self.settings.confidence_threshold = clamp_threshold(threshold);
        self.save_settings();
    }

    pub fn set_show_confidence(&mut self, show: bool) {
        self.settings.show_confidence = show;
        self.save_settings();
    }

    pub fn set_show_class_names(&mut self, show: bool) {
        self.settings.show_class_names = show;
        self.save_settings();
    }

    /// Begin the tick cycle, opening the configured source when none is
    /// bound yet. Counters reset here.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        if !self.camera.is_open() {
            let descriptor = self.settings.last_source.clone();
            self.camera
                .open(descriptor.clone())
                .with_context(|| format!("open source {}", descriptor))?;
        }
        self.stats.reset();
        self.motion.reset();
        self.had_detections = false;
        self.stop_requested.store(false, Ordering::SeqCst);
        self.running = true;
        log::info!("processing started");
        Ok(())
    }

    /// Stop the tick cycle and release the capture backend.
    pub fn stop(&mut self) {
        if self.running {
            log::info!(
                "processing stopped after {} frames ({} objects)",
                self.stats.frames_processed,
                self.stats.objects_detected
            );
        }
        self.running = false;
        self.camera.close();
    }

    /// Persist the most recent frame as a snapshot.
    pub fn snapshot(&mut self) -> Result<PathBuf> {
        let frame = self.camera.snapshot().context("no frame to snapshot")?;
        snapshot::save_snapshot(&frame, &self.snapshot_dir)
    }

    // ---- tick cycle ----

    /// One acquire → detect → annotate → display iteration.
    pub fn tick(&mut self) -> Result<TickOutcome> {
        if self.stop_requested.swap(false, Ordering::SeqCst) {
            self.stop();
            return Ok(TickOutcome::Stopped);
        }
        if !self.running {
            return Ok(TickOutcome::Stopped);
        }

        let frame = match self.camera.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                // Bounded retry already happened inside the capture layer.
                log::error!("capture failed, stopping cycle: {}", err);
                self.stop();
                return Err(err.into());
            }
        };

        self.stats.motion_level = self.motion.level(&frame);

        let detections = match self
            .engine
            .detect(&frame, self.settings.confidence_threshold)
        {
            Ok(detections) => detections,
            Err(err) => {
                self.stats.detect_errors += 1;
                log::error!("detection failed, skipping tick: {}", err);
                return Ok(TickOutcome::SkippedDetection);
            }
        };

        self.stats.frames_processed += 1;
        self.stats.last_detection_count = detections.len();
        self.stats.objects_detected += detections.len() as u64;
        for detection in &detections {
            *self
                .stats
                .objects_by_class
                .entry(detection.class_name.clone())
                .or_insert(0) += 1;
        }

        let annotated = self.engine.annotate(&frame, &detections, self.annotate_options());

        if self.settings.auto_save_snapshots && !detections.is_empty() && !self.had_detections {
            if let Err(err) = snapshot::save_snapshot(&annotated, &self.snapshot_dir) {
                log::warn!("auto snapshot failed: {:#}", err);
            }
        }
        self.had_detections = !detections.is_empty();

        if let Err(err) = self.display.show(&annotated, &self.stats) {
            log::warn!("display sink failed: {}", err);
        }

        if self.last_stats_log.elapsed() >= STATS_LOG_INTERVAL {
            log::info!(
                "session: {} frames, {} objects, {:.1} fps, motion {:.3}",
                self.stats.frames_processed,
                self.stats.objects_detected,
                self.stats.fps(),
                self.stats.motion_level
            );
            self.last_stats_log = Instant::now();
        }

        Ok(TickOutcome::Frame {
            detections: detections.len(),
        })
    }

    /// Drive ticks until stopped (or until `max_frames` frames were
    /// processed). The capture backend is always released on the way out.
    pub fn run(&mut self, max_frames: Option<u64>) -> Result<()> {
        self.start()?;
        let pace = Duration::from_millis(1000 / self.target_fps().max(1) as u64);

        let result = loop {
            if let Some(max) = max_frames {
                if self.stats.frames_processed >= max {
                    break Ok(());
                }
            }
            match self.tick() {
                Ok(TickOutcome::Stopped) => break Ok(()),
                Ok(_) => {}
                Err(err) => break Err(err),
            }
            std::thread::sleep(pace);
        };

        self.stop();
        result
    }

    fn annotate_options(&self) -> AnnotateOptions {
        AnnotateOptions {
            show_class_names: self.settings.show_class_names,
            show_confidence: self.settings.show_confidence,
        }
    }

    fn target_fps(&self) -> u32 {
        CaptureConfig::default().target_fps
    }

    fn save_settings(&self) {
        if let Err(err) = self.settings.save(&self.settings_path) {
            log::error!("failed to save settings: {:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::active_source_count;
    use crate::display::NullDisplay;

    fn stub_settings() -> Settings {
        Settings {
            // Maps to the synthetic webcam in builds without capture-v4l2;
            // width/height stay small to keep ticks cheap.
            video_width: 64,
            video_height: 48,
            ..Settings::default()
        }
    }

    fn app(dir: &Path) -> App {
        let settings_path = dir.join("settings.json");
        App::new(stub_settings(), settings_path, Box::new(NullDisplay))
            .with_snapshot_dir(dir.join("snapshots"))
    }

    #[cfg(not(feature = "capture-v4l2"))]
    #[test]
    fn tick_cycle_counts_frames_and_objects() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut app = app(dir.path());
        app.engine_mut().load_model(Path::new("stub://model")).unwrap();

        app.start()?;
        for _ in 0..3 {
            let outcome = app.tick()?;
            assert!(matches!(outcome, TickOutcome::Frame { .. }));
        }

        assert_eq!(app.stats().frames_processed, 3);
        // The stub emits two detections at or above the 0.5 default threshold.
        assert_eq!(app.stats().objects_detected, 6);
        assert_eq!(app.stats().objects_by_class.get("widget"), Some(&3));
        assert_eq!(app.stats().objects_by_class.get("defect"), Some(&3));

        app.stop();
        Ok(())
    }

    #[cfg(not(feature = "capture-v4l2"))]
    #[test]
    fn stop_releases_the_capture_backend() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut app = app(dir.path());

        app.start()?;
        app.tick()?;
        assert!(active_source_count() >= 1);

        app.stop();
        assert!(!app.is_running());
        assert_eq!(app.tick()?, TickOutcome::Stopped);
        Ok(())
    }

    #[cfg(not(feature = "capture-v4l2"))]
    #[test]
    fn stop_request_is_honored_before_the_next_tick() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut app = app(dir.path());

        app.start()?;
        app.tick()?;
        app.stop_handle().store(true, Ordering::SeqCst);

        assert_eq!(app.tick()?, TickOutcome::Stopped);
        assert!(!app.is_running());
        Ok(())
    }

    #[cfg(not(feature = "capture-v4l2"))]
    #[test]
    fn detection_errors_skip_the_tick_but_not_the_cycle() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut app = app(dir.path());
        app.engine_mut().load_model(Path::new("stub://fail")).unwrap();

        app.start()?;
        assert_eq!(app.tick()?, TickOutcome::SkippedDetection);
        assert_eq!(app.tick()?, TickOutcome::SkippedDetection);

        assert_eq!(app.stats().detect_errors, 2);
        assert_eq!(app.stats().frames_processed, 0);
        assert!(app.is_running());

        app.stop();
        Ok(())
    }

    #[cfg(not(feature = "capture-v4l2"))]
    #[test]
    fn counters_reset_on_restart() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut app = app(dir.path());
        app.engine_mut().load_model(Path::new("stub://model")).unwrap();

        app.start()?;
        app.tick()?;
        app.stop();

        app.start()?;
        assert_eq!(app.stats().frames_processed, 0);
        assert_eq!(app.stats().objects_detected, 0);
        app.stop();
        Ok(())
    }

    #[cfg(not(feature = "capture-v4l2"))]
    #[test]
    fn snapshot_persists_the_latest_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let mut app = app(dir.path());

        app.start()?;
        assert!(app.snapshot().is_err());
        app.tick()?;

        let path = app.snapshot()?;
        assert!(path.exists());

        app.stop();
        Ok(())
    }

    #[cfg(not(feature = "capture-v4l2"))]
    #[test]
    fn auto_save_writes_one_snapshot_per_detection_streak() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let settings = Settings {
            auto_save_snapshots: true,
            ..stub_settings()
        };
        let snap_dir = dir.path().join("snapshots");
        let mut app = App::new(
            settings,
            dir.path().join("settings.json"),
            Box::new(NullDisplay),
        )
        .with_snapshot_dir(snap_dir.clone());
        app.engine_mut().load_model(Path::new("stub://model")).unwrap();

        app.start()?;
        app.tick()?;
        app.tick()?;

        // The stub detects on every tick, so the streak stays unbroken and
        // only the first tick saved a snapshot.
        assert_eq!(std::fs::read_dir(&snap_dir)?.count(), 1);
        app.stop();
        Ok(())
    }

    #[cfg(not(feature = "capture-v4l2"))]
    #[test]
    fn threshold_changes_are_persisted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let settings_path = dir.path().join("settings.json");
        let mut app = app(dir.path());

        app.set_confidence_threshold(0.8);

        let reloaded = Settings::load(&settings_path);
        assert_eq!(reloaded.confidence_threshold, 0.8);
        Ok(())
    }
}
