//! Backup and time-lapse engine: periodic full dumps of the pixel grid, restored from the
//! newest file on startup.
//!
//! Scans a directory for timestamped files and restores the lexicographically-greatest one at
//! startup (a `YYYY_MM_DD_HH_MM_SS` name sorts the same lexicographically as chronologically),
//! then loops forever writing a fresh one every `interval` seconds. Time-lapse PNG rendering
//! reuses the same cadence/path pattern but writes `image`-encoded frames instead of raw dumps.

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::{DynamicImage, ImageBuffer, Rgb as ImageRgb};
use tracing::{info, warn};

use crate::const_settings::{
    BACKUP_EXTENSION, BACKUP_TIME_FORMAT, TIMELAPSE_EXTENSION, TIMELAPSE_PREFIX,
    TIMELAPSE_TIME_FORMAT,
};
use crate::error::SnapshotError;
use crate::store::PixelStore;

const BACKUP_PREFIX: &str = "backup_";

/// Encodes the current canvas as a PNG byte buffer, for both `/canvas/` and time-lapse frames.
pub fn encode_png(store: &PixelStore) -> Result<Vec<u8>, SnapshotError> {
    let (w, h) = (store.width() as u32, store.height() as u32);
    let raw = store.full_image();
    let buffer: ImageBuffer<ImageRgb<u8>, Vec<u8>> =
        ImageBuffer::from_raw(w, h, raw).expect("full_image length matches width*height*3");
    let image = DynamicImage::ImageRgb8(buffer);

    let mut out = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut out);
    image.write_to(&mut cursor, image::ImageFormat::Png)?;
    Ok(out)
}

fn backup_file_name() -> String {
    let now = chrono::Utc::now();
    format!("{}.{BACKUP_EXTENSION}", now.format(BACKUP_TIME_FORMAT))
}

fn timelapse_file_name() -> String {
    let now = chrono::Utc::now();
    format!(
        "{TIMELAPSE_PREFIX}{}.{TIMELAPSE_EXTENSION}",
        now.format(TIMELAPSE_TIME_FORMAT)
    )
}

/// Scans `dir` for backup files and returns the path of the lexicographically greatest (i.e.
/// newest, given the zero-padded timestamp format). Returns `None` if the directory is absent
/// or empty.
fn find_newest_backup(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(BACKUP_PREFIX) && n.ends_with(BACKUP_EXTENSION))
        })
        .max_by_key(|p| p.file_name().unwrap().to_os_string())
}

/// Restores the newest backup in `dir` into `store`, if any exists. Size mismatches and
/// missing/unreadable directories are logged and treated as "start with a blank canvas" rather
/// than aborting startup, so a corrupt or absent backup never takes the whole server down.
pub fn restore_newest(dir: &Path, store: &PixelStore) {
    let Some(path) = find_newest_backup(dir) else {
        warn!(dir = %dir.display(), "no backup found, starting with a blank canvas");
        return;
    };
    match std::fs::read(&path) {
        Ok(bytes) => match store.restore(&bytes) {
            Ok(()) => info!(path = %path.display(), "restored canvas from backup"),
            Err(e) => warn!(path = %path.display(), error = %e, "backup size mismatch, starting blank"),
        },
        Err(e) => warn!(path = %path.display(), error = %e, "failed to read backup file, starting blank"),
    }
}

fn write_backup(dir: &Path, store: &PixelStore) -> Result<PathBuf, SnapshotError> {
    std::fs::create_dir_all(dir).map_err(|source| SnapshotError::WriteFile {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(backup_file_name());
    std::fs::write(&path, store.dump()).map_err(|source| SnapshotError::WriteFile {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn write_timelapse_frame(dir: &Path, store: &PixelStore) -> Result<PathBuf, SnapshotError> {
    std::fs::create_dir_all(dir).map_err(|source| SnapshotError::WriteFile {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(timelapse_file_name());
    let png = encode_png(store)?;
    std::fs::write(&path, png).map_err(|source| SnapshotError::WriteFile {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

/// Deletes backup files in `dir` older than `max_age`. `max_age == 0` disables retention.
fn prune_old_backups(dir: &Path, max_age: Duration) {
    if max_age.is_zero() {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if modified.elapsed().map(|age| age > max_age).unwrap_or(false) {
            let _ = std::fs::remove_file(&path);
        }
    }
}

/// Spawns the periodic backup loop: writes a full dump every `interval`, optionally pruning
/// files older than `delete`.
pub fn spawn_backup_loop(
    store: std::sync::Arc<PixelStore>,
    dir: PathBuf,
    interval: Duration,
    delete_after: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match write_backup(&dir, &store) {
                Ok(path) => info!(path = %path.display(), "wrote backup"),
                Err(e) => warn!(error = %e, "failed to write backup"),
            }
            prune_old_backups(&dir, delete_after);
        }
    })
}

/// Spawns the periodic time-lapse loop: encodes and writes a PNG frame every `interval`.
pub fn spawn_timelapse_loop(
    store: std::sync::Arc<PixelStore>,
    dir: PathBuf,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match write_timelapse_frame(&dir, &store) {
                Ok(path) => info!(path = %path.display(), "wrote time-lapse frame"),
                Err(e) => warn!(error = %e, "failed to write time-lapse frame"),
            }
        }
    })
}
