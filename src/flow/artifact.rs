use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::media::MediaKind;

/// A downloaded file owned by exactly one task.
///
/// The file, and any partial or intermediate file the downloader left next
/// to it (same unique stem), is removed by [`remove`](Self::remove) or, if
/// that never ran, when the artifact is dropped.
#[derive(Debug)]
pub struct TempArtifact {
    dir: PathBuf,
    stem: String,
    path: PathBuf,
    removed: bool,
}

impl TempArtifact {
    pub fn new(dir: &Path, kind: MediaKind) -> Self {
        let stem = format!("mediagrab_{}", Uuid::new_v4().simple());
        let path = dir.join(format!("{stem}.{}", kind.extension()));

        Self {
            dir: dir.to_path_buf(),
            stem,
            path,
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn size(&self) -> io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    fn owns(&self, name: &OsStr) -> bool {
        name.to_str().is_some_and(|n| n.starts_with(&self.stem))
    }

    /// Delete every file belonging to this artifact. Safe to call again;
    /// returns how many files were deleted.
    pub async fn remove(&mut self) -> io::Result<usize> {
        let mut deleted = 0;

        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.removed = true;
                return Ok(0);
            }
            Err(e) => return Err(e),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !self.owns(&entry.file_name()) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        self.removed = true;
        Ok(deleted)
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if self.removed {
            return;
        }

        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            if self.owns(&entry.file_name()) {
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    warn!(path = %entry.path().display(), error = %e, "Failed to remove temp file");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = TempArtifact::new(dir.path(), MediaKind::Video);
        tokio::fs::write(artifact.path(), b"data").await.unwrap();

        assert_eq!(artifact.size().await.unwrap(), 4);
        assert_eq!(artifact.remove().await.unwrap(), 1);
        assert_eq!(artifact.remove().await.unwrap(), 0);
        assert!(!artifact.path().exists());
    }

    #[tokio::test]
    async fn test_remove_takes_partial_files_too() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = TempArtifact::new(dir.path(), MediaKind::Video);
        let part = format!("{}.part", artifact.path().display());
        tokio::fs::write(&part, b"half").await.unwrap();
        let bystander = dir.path().join("someone_else.mp4");
        tokio::fs::write(&bystander, b"keep").await.unwrap();

        assert_eq!(artifact.remove().await.unwrap(), 1);
        assert!(!Path::new(&part).exists());
        assert!(bystander.exists());
    }

    #[tokio::test]
    async fn test_drop_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let artifact = TempArtifact::new(dir.path(), MediaKind::Audio);
            std::fs::write(artifact.path(), b"data").unwrap();
            artifact.path().to_path_buf()
        };

        assert!(!path.exists());
        assert_eq!(path.extension().unwrap(), "m4a");
    }
}
