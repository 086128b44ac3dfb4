// src/layout.rs

//! Seed directory layout and canonical file naming
//!
//! A seed directory holds three things: snap blobs under `snaps/`,
//! assertion files under `assertions/`, and the `seed.yaml` manifest at the
//! top. Blobs and their assertion sidecars share the `<name>_<revision>`
//! stem; model-level assertions live under their plain type names.

use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Canonical paths inside one seed directory
#[derive(Debug, Clone)]
pub struct SeedLayout {
    seed_dir: PathBuf,
}

impl SeedLayout {
    pub fn new(seed_dir: impl Into<PathBuf>) -> Self {
        Self {
            seed_dir: seed_dir.into(),
        }
    }

    pub fn seed_dir(&self) -> &Path {
        &self.seed_dir
    }

    pub fn snaps_dir(&self) -> PathBuf {
        self.seed_dir.join("snaps")
    }

    pub fn assertions_dir(&self) -> PathBuf {
        self.seed_dir.join("assertions")
    }

    pub fn seed_yaml(&self) -> PathBuf {
        self.seed_dir.join("seed.yaml")
    }

    /// `snaps/<name>_<revision>.snap`
    pub fn snap_path(&self, name: &str, revision: u64) -> PathBuf {
        self.snaps_dir().join(snap_filename(name, revision))
    }

    /// `assertions/<name>_<revision>.assert`
    pub fn assert_path(&self, name: &str, revision: u64) -> PathBuf {
        self.assertions_dir().join(assert_filename(name, revision))
    }

    /// In-flight delta patch next to the blobs it connects
    pub fn delta_path(&self, name: &str, from: u64, to: u64) -> PathBuf {
        self.snaps_dir()
            .join(format!("{}_{}_to_{}.delta", name, from, to))
    }

    /// Model-level assertion (`model`, `account-key`, `account`)
    pub fn model_assertion_path(&self, kind: &str) -> PathBuf {
        self.assertions_dir().join(kind)
    }

    /// Create `snaps/` and `assertions/` if they do not exist yet
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [self.snaps_dir(), self.assertions_dir()] {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::IoError(format!("failed to create {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }
}

/// Canonical blob file name
pub fn snap_filename(name: &str, revision: u64) -> String {
    format!("{}_{}.snap", name, revision)
}

/// Canonical assertion sidecar file name
pub fn assert_filename(name: &str, revision: u64) -> String {
    format!("{}_{}.assert", name, revision)
}

/// Extract the revision component from a `<name>_<rev>.snap` or
/// `<name>_<rev>.assert` file name.
///
/// The revision is whatever follows the last underscore, with the known
/// suffix stripped. Any other suffix yields `None`; callers skip such
/// files.
pub fn revision_from_filename(file_name: &str) -> Option<&str> {
    let (_, rest) = file_name.rsplit_once('_')?;
    rest.strip_suffix(".snap")
        .or_else(|| rest.strip_suffix(".assert"))
}
