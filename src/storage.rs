//! Media storage
//!
//! Uploads and results live as flat files under the media root; the
//! filename is the record, there is no database. This module owns the
//! directory layout, generated filenames, containment checks for
//! client-supplied names, and the retention sweep.

use crate::error::{CutoutError, Result};
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Outcome of a retention sweep run
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepReport {
    /// Number of files deleted
    pub deleted: usize,
    /// Number of files that could not be deleted
    pub failed: usize,
}

/// Filesystem-backed store for uploaded and processed images
#[derive(Debug, Clone)]
pub struct MediaStore {
    media_root: PathBuf,
}

impl MediaStore {
    /// Create a store rooted at the given media directory
    #[must_use]
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    /// Directory for raw uploads
    #[must_use]
    pub fn uploads_dir(&self) -> PathBuf {
        self.media_root.join("uploads")
    }

    /// Directory for processed results and composites
    #[must_use]
    pub fn results_dir(&self) -> PathBuf {
        self.media_root.join("results")
    }

    /// Create the uploads and results directories if missing
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.uploads_dir(), self.results_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| CutoutError::file_io_error("create media directory", &dir, &e))?;
        }
        Ok(())
    }

    /// Upload filename for a fresh id: `<id><ext>`, keeping the client's
    /// extension when it has one (default `.png`)
    #[must_use]
    pub fn upload_filename(id: &Uuid, original_name: Option<&str>) -> String {
        let ext = original_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map_or_else(|| ".png".to_string(), |ext| format!(".{ext}"));
        format!("{id}{ext}")
    }

    /// Result filename for a fresh id: `<id>_nobg.png`
    #[must_use]
    pub fn result_filename(id: &Uuid) -> String {
        format!("{id}_nobg.png")
    }

    /// Composite filename derived from a source result:
    /// `<stem>_edit_<8 hex chars>.png`
    #[must_use]
    pub fn composite_filename(source: &str) -> String {
        let stem = Path::new(source)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(source);
        let tag = Uuid::new_v4().simple().to_string();
        let tag = tag.get(..8).unwrap_or("00000000");
        format!("{stem}_edit_{tag}.png")
    }

    /// Temporary filename for an uploaded backdrop image: `bg_<uuid><ext>`
    #[must_use]
    pub fn backdrop_filename(original_name: Option<&str>) -> String {
        let ext = original_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .map_or_else(String::new, |ext| format!(".{ext}"));
        format!("bg_{}{ext}", Uuid::new_v4())
    }

    /// Resolve a client-supplied result filename to a path strictly inside
    /// the results directory.
    ///
    /// # Errors
    /// Returns `NotFound` when the name carries path separators or parent
    /// components, or when no such regular file exists. Traversal attempts
    /// are indistinguishable from missing files on the wire.
    pub fn resolve_result(&self, filename: &str) -> Result<PathBuf> {
        if !is_plain_filename(filename) {
            return Err(CutoutError::not_found("File not found"));
        }
        let path = self.results_dir().join(filename);
        if !path.is_file() {
            return Err(CutoutError::not_found("File not found"));
        }
        Ok(path)
    }

    /// Write body chunks to a file under the uploads directory, returning
    /// the final path
    pub async fn write_upload(&self, filename: &str, chunks: &[Bytes]) -> Result<PathBuf> {
        let path = self.uploads_dir().join(filename);
        write_chunks(&path, chunks).await?;
        Ok(path)
    }

    /// Delete every regular file in the uploads and results directories
    /// whose mtime is older than `max_age`. Absent directories are skipped;
    /// per-file failures are logged and counted, never fatal.
    pub fn sweep_expired(&self, max_age: Duration) -> SweepReport {
        let cutoff = SystemTime::now() - max_age;
        let mut report = SweepReport::default();

        for dir in [self.uploads_dir(), self.results_dir()] {
            if !dir.is_dir() {
                continue;
            }
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Failed to read {}: {e}", dir.display());
                    continue;
                },
            };
            for entry in entries.flatten() {
                let path = entry.path();
                match expired_file(&path, cutoff) {
                    Ok(false) => {},
                    Ok(true) => match std::fs::remove_file(&path) {
                        Ok(()) => {
                            tracing::debug!("Deleted {}", path.display());
                            report.deleted += 1;
                        },
                        Err(e) => {
                            tracing::warn!("Error deleting {}: {e}", path.display());
                            report.failed += 1;
                        },
                    },
                    Err(e) => {
                        tracing::warn!("Error inspecting {}: {e}", path.display());
                        report.failed += 1;
                    },
                }
            }
        }

        tracing::info!(
            deleted = report.deleted,
            failed = report.failed,
            "Retention sweep finished"
        );
        report
    }
}

/// True when the name is a single normal path component: no separators,
/// no `..`, no absolute prefix
fn is_plain_filename(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn expired_file(path: &Path, cutoff: SystemTime) -> std::io::Result<bool> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Ok(false);
    }
    Ok(metadata.modified()? < cutoff)
}

async fn write_chunks(path: &Path, chunks: &[Bytes]) -> Result<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| CutoutError::file_io_error("create file", path, &e))?;
    for chunk in chunks {
        file.write_all(chunk)
            .await
            .map_err(|e| CutoutError::file_io_error("write file", path, &e))?;
    }
    file.flush()
        .await
        .map_err(|e| CutoutError::file_io_error("flush file", path, &e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn store() -> (TempDir, MediaStore) {
        let tmp = TempDir::new().unwrap();
        let store = MediaStore::new(tmp.path());
        store.ensure_dirs().unwrap();
        (tmp, store)
    }

    fn set_mtime(path: &Path, age: Duration) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_generated_filenames() {
        let id = Uuid::new_v4();
        assert_eq!(
            MediaStore::upload_filename(&id, Some("photo.jpeg")),
            format!("{id}.jpeg")
        );
        assert_eq!(
            MediaStore::upload_filename(&id, Some("noext")),
            format!("{id}.png")
        );
        assert_eq!(MediaStore::result_filename(&id), format!("{id}_nobg.png"));

        let composite = MediaStore::composite_filename("abc_nobg.png");
        assert!(composite.starts_with("abc_nobg_edit_"));
        assert!(composite.ends_with(".png"));
        assert_eq!(composite.len(), "abc_nobg_edit_".len() + 8 + ".png".len());
    }

    #[test]
    fn test_resolve_result_containment() {
        let (_tmp, store) = store();
        fs::write(store.results_dir().join("ok.png"), b"data").unwrap();

        assert!(store.resolve_result("ok.png").is_ok());
        assert!(store.resolve_result("missing.png").is_err());
        assert!(store.resolve_result("../ok.png").is_err());
        assert!(store.resolve_result("../../etc/passwd").is_err());
        assert!(store.resolve_result("sub/ok.png").is_err());
        assert!(store.resolve_result("/etc/passwd").is_err());
        assert!(store.resolve_result("").is_err());
    }

    #[test]
    fn test_sweep_deletes_only_expired() {
        let (_tmp, store) = store();
        let old = store.uploads_dir().join("old.png");
        let fresh = store.results_dir().join("fresh.png");
        fs::write(&old, b"old").unwrap();
        fs::write(&fresh, b"fresh").unwrap();
        set_mtime(&old, Duration::from_secs(2 * 3600));
        set_mtime(&fresh, Duration::from_secs(600));

        let report = store.sweep_expired(Duration::from_secs(3600));

        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);
        assert!(!old.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn test_sweep_skips_absent_directories() {
        let tmp = TempDir::new().unwrap();
        let store = MediaStore::new(tmp.path().join("nowhere"));
        let report = store.sweep_expired(Duration::from_secs(3600));
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_write_upload_concatenates_chunks() {
        let (_tmp, store) = store();
        let chunks = [Bytes::from_static(b"ab"), Bytes::from_static(b"cd")];
        let path = store.write_upload("x.bin", &chunks).await.unwrap();
        assert_eq!(fs::read(path).unwrap(), b"abcd");
    }
}
