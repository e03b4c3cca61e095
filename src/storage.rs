//! File storage for image payloads, rooted at the media directory.

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory (relative to the storage root) that imported originals go to.
pub const IMAGES_DIR: &str = "original_images";

#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Absolute location of a stored reference.
    pub fn path(&self, reference: &str) -> PathBuf {
        self.root.join(reference)
    }

    pub fn exists(&self, reference: &str) -> bool {
        self.path(reference).is_file()
    }

    /// Store `bytes` under `name`, returning its reference.
    ///
    /// Only the final component of `name` is used. Taken names get a numeric
    /// suffix (`photo_1.jpg`, `photo_2.jpg`, ...).
    pub fn store(&self, name: &str, bytes: &[u8]) -> Result<String> {
        let file_name = Path::new(name)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| anyhow!("Invalid file name '{}'", name))?;

        let dir = self.root.join(IMAGES_DIR);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let (stem, extension) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (file_name, None),
        };

        let mut candidate = file_name.to_string();
        let mut counter = 0u32;
        loop {
            let target = dir.join(&candidate);
            match fs::OpenOptions::new().write(true).create_new(true).open(&target) {
                Ok(mut file) => {
                    use std::io::Write;
                    file.write_all(bytes)
                        .with_context(|| format!("Failed to write {}", target.display()))?;
                    break;
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    counter += 1;
                    candidate = match extension {
                        Some(ext) => format!("{}_{}.{}", stem, counter, ext),
                        None => format!("{}_{}", stem, counter),
                    };
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("Failed to create {}", target.display()));
                }
            }
        }

        let reference = format!("{}/{}", IMAGES_DIR, candidate);
        debug!(reference = %reference, bytes = bytes.len(), "Stored file");
        Ok(reference)
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub fn delete(&self, reference: &str) -> Result<()> {
        let path = self.path(reference);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("Failed to delete {}", path.display())),
        }
    }
}
