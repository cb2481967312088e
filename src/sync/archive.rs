//! Directory ↔ compressed archive conversion.

use std::fs::File;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Archive, Builder};
use tracing::debug;

use crate::error::{constants, Result, SyncError};

/// Turns a directory into a single archive file and back
#[async_trait]
pub trait Archiver: Send + Sync {
    /// Archive the contents of `source_dir`, rooted at `.`
    async fn create(&self, source_dir: &Path, archive_path: &Path) -> Result<()>;

    /// Unpack `archive_path` into `dest_dir`, which must already exist
    async fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<()>;
}

/// gzip-compressed tar archives (`.tar.gz`)
#[derive(Debug, Default, Clone, Copy)]
pub struct TarGzArchiver;

fn create_blocking(source_dir: &Path, archive_path: &Path) -> std::io::Result<()> {
    let file = File::create(archive_path)?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);
    builder.append_dir_all(".", source_dir)?;
    builder.into_inner()?.finish()?.sync_all()
}

fn extract_blocking(archive_path: &Path, dest_dir: &Path) -> std::io::Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.unpack(dest_dir)
}

#[async_trait]
impl Archiver for TarGzArchiver {
    async fn create(&self, source_dir: &Path, archive_path: &Path) -> Result<()> {
        let source: PathBuf = source_dir.to_path_buf();
        let target: PathBuf = archive_path.to_path_buf();
        debug!(source = %source.display(), archive = %target.display(), "Creating archive");

        tokio::task::spawn_blocking(move || create_blocking(&source, &target))
            .await
            .map_err(|e| SyncError::ArchiveError(format!("{}: {e}", constants::ERR_ARCHIVE_CREATE)))?
            .map_err(|e| SyncError::ArchiveError(format!("{}: {e}", constants::ERR_ARCHIVE_CREATE)))
    }

    async fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<()> {
        let source: PathBuf = archive_path.to_path_buf();
        let target: PathBuf = dest_dir.to_path_buf();
        debug!(archive = %source.display(), dest = %target.display(), "Extracting archive");

        tokio::task::spawn_blocking(move || extract_blocking(&source, &target))
            .await
            .map_err(|e| {
                SyncError::ExtractionError(format!("{}: {e}", constants::ERR_ARCHIVE_EXTRACT))
            })?
            .map_err(|e| {
                SyncError::ExtractionError(format!("{}: {e}", constants::ERR_ARCHIVE_EXTRACT))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_archive_roundtrip_preserves_tree() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("world/region")).unwrap();
        std::fs::write(src.path().join("server.properties"), "motd=hi\n").unwrap();
        std::fs::write(src.path().join("world/region/r.0.0.mca"), [1u8, 2, 3]).unwrap();

        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("data.tar.gz");
        TarGzArchiver.create(src.path(), &archive).await.unwrap();

        let dest = tempfile::tempdir().unwrap();
        TarGzArchiver.extract(&archive, dest.path()).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dest.path().join("server.properties")).unwrap(),
            "motd=hi\n"
        );
        assert_eq!(
            std::fs::read(dest.path().join("world/region/r.0.0.mca")).unwrap(),
            [1u8, 2, 3]
        );
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_extraction_error() {
        let scratch = tempfile::tempdir().unwrap();
        let archive = scratch.path().join("bad.tar.gz");
        std::fs::write(&archive, b"definitely not gzip").unwrap();

        let err = TarGzArchiver
            .extract(&archive, scratch.path())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ExtractionError(_)));
    }
}
