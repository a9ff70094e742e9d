//! Video file frame source.
//!
//! Plays a recorded clip as an infinite, restartable frame sequence: after
//! the last frame the source loops back to the first one.
//!
//! Two backends:
//! - A directory of image files (sorted by name) is decoded with the `image`
//!   crate and is always available.
//! - A video container (mp4/mkv/...) is decoded with FFmpeg behind the
//!   `capture-ffmpeg` feature.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::frame::Frame;

#[cfg(feature = "capture-ffmpeg")]
mod container;

/// Configuration for a video file source.
#[derive(Clone, Debug)]
pub struct VideoConfig {
    /// Path to a frame directory or a video container file.
    pub path: PathBuf,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
}

/// Video file frame source.
pub struct VideoSource {
    backend: VideoBackend,
}

enum VideoBackend {
    ImageSequence(ImageSequenceSource),
    #[cfg(feature = "capture-ffmpeg")]
    Container(container::ContainerVideoSource),
}

impl VideoSource {
    pub fn new(config: VideoConfig) -> Result<Self> {
        if config.path.is_dir() {
            Ok(Self {
                backend: VideoBackend::ImageSequence(ImageSequenceSource::new(config)?),
            })
        } else {
            #[cfg(feature = "capture-ffmpeg")]
            {
                Ok(Self {
                    backend: VideoBackend::Container(container::ContainerVideoSource::new(
                        config,
                    )?),
                })
            }
            #[cfg(not(feature = "capture-ffmpeg"))]
            {
                Err(anyhow!(
                    "decoding {} requires the capture-ffmpeg feature \
                     (or pass a directory of frame images)",
                    config.path.display()
                ))
            }
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            VideoBackend::ImageSequence(source) => source.connect(),
            #[cfg(feature = "capture-ffmpeg")]
            VideoBackend::Container(source) => source.connect(),
        }
    }

    /// Decode the next frame, looping back to the start after the last one.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            VideoBackend::ImageSequence(source) => source.next_frame(),
            #[cfg(feature = "capture-ffmpeg")]
            VideoBackend::Container(source) => source.next_frame(),
        }
    }

    /// Number of frames in the clip, when known up front.
    pub fn frame_count_hint(&self) -> Option<usize> {
        match &self.backend {
            VideoBackend::ImageSequence(source) => Some(source.paths.len()),
            #[cfg(feature = "capture-ffmpeg")]
            VideoBackend::Container(_) => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Image-sequence source (directory of numbered frames)
// ----------------------------------------------------------------------------

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

struct ImageSequenceSource {
    config: VideoConfig,
    paths: Vec<PathBuf>,
    cursor: usize,
}

impl ImageSequenceSource {
    fn new(config: VideoConfig) -> Result<Self> {
        let mut paths = Vec::new();
        let entries = std::fs::read_dir(&config.path)
            .with_context(|| format!("read frame directory {}", config.path.display()))?;
        for entry in entries {
            let path = entry?.path();
            if is_image_path(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(anyhow!(
                "frame directory {} contains no image files",
                config.path.display()
            ));
        }

        Ok(Self {
            config,
            paths,
            cursor: 0,
        })
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "VideoSource: {} frames from {} (image sequence)",
            self.paths.len(),
            self.config.path.display()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        if self.cursor >= self.paths.len() {
            log::debug!("video looped back to first frame");
            self.cursor = 0;
        }
        let path = &self.paths[self.cursor];
        self.cursor += 1;

        let image = image::open(path)
            .with_context(|| format!("decode frame image {}", path.display()))?
            .to_rgb8();
        Ok(Frame::from_rgb_image(image))
    }
}

fn is_image_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|known| *known == ext)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_frames(dir: &Path, count: u8) {
        for i in 0..count {
            let image = RgbImage::from_pixel(4, 4, Rgb([i * 10, 0, 0]));
            image.save(dir.join(format!("frame_{:03}.png", i))).unwrap();
        }
    }

    #[test]
    fn sequence_loops_after_last_frame() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_frames(dir.path(), 3);

        let mut source = VideoSource::new(VideoConfig {
            path: dir.path().to_path_buf(),
            target_fps: 10,
        })?;
        source.connect()?;
        assert_eq!(source.frame_count_hint(), Some(3));

        let first = source.next_frame()?;
        source.next_frame()?;
        source.next_frame()?;
        // Frame N+1 of an N-frame clip is the first frame again.
        let looped = source.next_frame()?;
        assert_eq!(first.pixels(), looped.pixels());

        Ok(())
    }

    #[test]
    fn empty_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = VideoSource::new(VideoConfig {
            path: dir.path().to_path_buf(),
            target_fps: 10,
        });
        assert!(result.is_err());
    }

    #[cfg(not(feature = "capture-ffmpeg"))]
    #[test]
    fn container_files_need_the_ffmpeg_feature() {
        let result = VideoSource::new(VideoConfig {
            path: "missing/clip.mp4".into(),
            target_fps: 10,
        });
        assert!(result.is_err());
    }
}
