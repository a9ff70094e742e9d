//! Snapshot persistence.
//!
//! Snapshots are written as timestamped JPEGs under a snapshot directory
//! (`snapshots/` by default), created on demand.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::frame::Frame;

/// Save `frame` as `snapshot_<timestamp>.jpg` under `dir`.
pub fn save_snapshot(frame: &Frame, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create snapshot directory {}", dir.display()))?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("snapshot_{}.jpg", timestamp));

    frame
        .to_rgb_image()
        .save_with_format(&path, image::ImageFormat::Jpeg)
        .with_context(|| format!("write snapshot {}", path.display()))?;

    log::info!("snapshot saved: {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_lands_in_the_target_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let frame = Frame::from_rgb8(vec![7u8; 8 * 8 * 3], 8, 8).unwrap();

        let path = save_snapshot(&frame, dir.path())?;

        assert!(path.starts_with(dir.path()));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("snapshot_"));
        assert!(std::fs::metadata(&path)?.len() > 0);
        Ok(())
    }
}
