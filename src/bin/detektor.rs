//! detektor - live object detection runtime.
//!
//! Single entry point: loads settings, wires the capture source, model and
//! display together, and drives the tick cycle until stopped.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use detektor::display::Display;
#[cfg(feature = "display-gstreamer")]
use detektor::display::GstWindowDisplay;
use detektor::{logging, App, PreviewFileDisplay, Settings, SourceDescriptor};

#[derive(Parser, Debug)]
#[command(name = "detektor", version, about = "Live object detection over camera or video input")]
struct Args {
    /// Settings file.
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// Append-only log file mirroring the console output.
    #[arg(long, default_value = "detektor.log")]
    log_file: PathBuf,

    /// Capture source override: a webcam index, a video file path, or
    /// "industrial:<n>". Persisted as the last used source.
    #[arg(long)]
    source: Option<String>,

    /// Model file override. Persisted as the last used model.
    #[arg(long)]
    model: Option<PathBuf>,

    /// TTF font for label text; boxes render without one.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Path the annotated preview JPEG is written to.
    #[arg(long, default_value = "preview/live.jpg")]
    preview: PathBuf,

    /// Open a native video window instead of the preview file
    /// (requires the display-gstreamer feature).
    #[arg(long)]
    window: bool,

    /// Process at most this many frames, then exit.
    #[arg(long)]
    max_frames: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(&args.settings);
    logging::init(&settings.log_level, Some(&args.log_file))?;
    log::info!("detektor {} starting", env!("CARGO_PKG_VERSION"));

    let display = build_display(&args)?;
    let last_model = settings.last_model.clone();
    let mut app = App::new(settings, args.settings.clone(), display);

    if let Some(font) = &args.font {
        if let Err(err) = app.engine_mut().load_label_font(font) {
            log::warn!("label font not loaded: {:#}", err);
        }
    }

    let model = args.model.clone().or_else(|| {
        if last_model.is_empty() {
            None
        } else {
            Some(PathBuf::from(last_model))
        }
    });
    if let Some(model) = model {
        // A failed load is surfaced but not fatal: the runtime keeps going
        // without a model (empty detections) until the user loads one.
        match app.load_model(&model) {
            Ok(()) => {}
            Err(err) => log::error!("model not loaded: {}", err),
        }
    }

    if let Some(source) = &args.source {
        let descriptor = parse_source(source);
        app.select_source(descriptor)?;
    }

    let stop = app.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("stop requested, finishing current tick");
        stop.store(true, std::sync::atomic::Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    app.run(args.max_frames)
}

fn build_display(args: &Args) -> Result<Box<dyn Display>> {
    if args.window {
        #[cfg(feature = "display-gstreamer")]
        {
            return Ok(Box::new(GstWindowDisplay::new(10)?));
        }
        #[cfg(not(feature = "display-gstreamer"))]
        {
            anyhow::bail!("--window requires the display-gstreamer feature");
        }
    }
    Ok(Box::new(PreviewFileDisplay::new(args.preview.clone())))
}

fn parse_source(raw: &str) -> SourceDescriptor {
    if let Ok(index) = raw.parse::<u32>() {
        return SourceDescriptor::Webcam(index);
    }
    if let Some(index) = raw.strip_prefix("industrial:") {
        if let Ok(index) = index.parse::<u32>() {
            return SourceDescriptor::Industrial(index);
        }
    }
    SourceDescriptor::VideoFile(PathBuf::from(raw))
}
