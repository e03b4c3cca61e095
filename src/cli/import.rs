//! Import subcommand for treeport
//!
//! Imports the content of an export bundle (a zip holding `content.json`
//! and the image files) into the destination.

use crate::db::import::ImportSelection;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the import subcommand
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Path to the export bundle (zip) or a bare content.json
    #[arg(value_name = "BUNDLE")]
    pub bundle: PathBuf,

    /// Import pages
    #[arg(short, long)]
    pub pages: bool,

    /// Import snippets
    #[arg(short, long)]
    pub snippets: bool,

    /// Import images
    #[arg(short, long)]
    pub images: bool,

    /// Resolve and rewrite pages without modifying the database
    ///
    /// Reports how many pages would be created or updated, plus every
    /// warning the rewrite produces. Snippets and images are not previewed.
    #[arg(long)]
    pub dry_run: bool,
}

impl ImportArgs {
    /// Phases to run; with no phase flag, everything.
    pub fn selection(&self) -> ImportSelection {
        ImportSelection::from_flags(self.pages, self.snippets, self.images)
    }

    /// Whether the bundle is a zip archive rather than a bare document
    pub fn is_archive(&self) -> bool {
        self.bundle.extension().is_some_and(|ext| ext == "zip")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pages: bool, snippets: bool, images: bool) -> ImportArgs {
        ImportArgs {
            bundle: PathBuf::from("content.zip"),
            pages,
            snippets,
            images,
            dry_run: false,
        }
    }

    #[test]
    fn test_no_flags_selects_all_phases() {
        assert_eq!(args(false, false, false).selection(), ImportSelection::all());
    }

    #[test]
    fn test_flags_select_phases() {
        let selection = args(false, true, true).selection();
        assert!(!selection.pages);
        assert!(selection.snippets);
        assert!(selection.images);
    }

    #[test]
    fn test_is_archive() {
        assert!(args(false, false, false).is_archive());
        let plain = ImportArgs {
            bundle: PathBuf::from("content.json.gz"),
            ..args(false, false, false)
        };
        assert!(!plain.is_archive());
    }
}
