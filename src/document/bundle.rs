//! Export bundle: a zip archive holding `content.json` plus one file per image.

use super::Document;
use crate::error::ImportError;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use zip::ZipArchive;

/// Name of the interchange document inside a bundle.
pub const CONTENT_FILE: &str = "content.json";

enum BundleDir {
    /// Extracted archive, removed when the bundle is dropped.
    Extracted(TempDir),
    /// Directory that already holds the bundle contents.
    Existing(PathBuf),
}

/// An opened bundle: the parsed document plus the directory its image files live in.
pub struct Bundle {
    dir: BundleDir,
    document: Document,
}

impl Bundle {
    /// Extract a zip bundle into a temporary directory and load its document.
    pub fn open<P: AsRef<Path>>(archive_path: P) -> Result<Self> {
        let archive_path = archive_path.as_ref();
        let file = File::open(archive_path)
            .with_context(|| format!("Failed to open bundle {}", archive_path.display()))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .with_context(|| format!("{} is not a zip archive", archive_path.display()))?;

        let dir = tempfile::tempdir().context("Failed to create extraction directory")?;
        archive
            .extract(dir.path())
            .with_context(|| format!("Failed to extract {}", archive_path.display()))?;
        debug!(
            bundle = %archive_path.display(),
            entries = archive.len(),
            "Extracted bundle"
        );

        let document = load_content(dir.path(), archive_path)?;
        Ok(Self {
            dir: BundleDir::Extracted(dir),
            document,
        })
    }

    /// Use a directory that already contains `content.json` and the image files.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let document = load_content(&dir, &dir)?;
        Ok(Self {
            dir: BundleDir::Existing(dir),
            document,
        })
    }

    /// Wrap an already-loaded document whose image files live in `base_dir`.
    pub fn from_document<P: AsRef<Path>>(document: Document, base_dir: P) -> Self {
        Self {
            dir: BundleDir::Existing(base_dir.as_ref().to_path_buf()),
            document,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Directory image payloads are read from.
    pub fn base_dir(&self) -> &Path {
        match &self.dir {
            BundleDir::Extracted(dir) => dir.path(),
            BundleDir::Existing(dir) => dir,
        }
    }
}

fn load_content(dir: &Path, origin: &Path) -> Result<Document> {
    let content_path = dir.join(CONTENT_FILE);
    if !content_path.is_file() {
        return Err(ImportError::MissingContent {
            bundle: origin.display().to_string(),
            file: CONTENT_FILE,
        }
        .into());
    }
    Document::from_file(&content_path)
        .with_context(|| format!("Failed to read {} from {}", CONTENT_FILE, origin.display()))
}
