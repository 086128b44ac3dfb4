// src/manifest.rs

//! The seed.yaml manifest
//!
//! `seed.yaml` declares which snaps make up the seed. Reconciliation is
//! authoritative: the file is rewritten from scratch after every run, never
//! merged with its previous contents.

use crate::channel;
use crate::error::{Error, Result};
use crate::layout::snap_filename;
use crate::store::CurrentSnap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

/// One `snaps:` entry in seed.yaml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub channel: String,
    pub file: String,
}

/// Parsed seed.yaml contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub snaps: Vec<ManifestEntry>,
}

/// A bare `snaps:` key parses as YAML null; treat it as the empty list.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<ManifestEntry>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<Vec<ManifestEntry>> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

impl Manifest {
    /// Create seed.yaml with an empty snap list if it does not exist
    pub fn ensure_exists(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        fs::write(path, "snaps:\n")
            .map_err(|e| Error::IoError(format!("failed to create {}: {e}", path.display())))
    }

    /// Load and parse seed.yaml
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::IoError(format!("failed to read {}: {e}", path.display())))?;
        serde_yaml::from_str(&content).map_err(|e| Error::ManifestParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Names of all declared snaps
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.snaps.iter().map(|entry| entry.name.as_str())
    }

    /// Serialize a fresh manifest from the snaps the reconciler decided to
    /// keep. Previous entries are discarded; channels lose their implied
    /// `latest/` track.
    pub fn rewrite<'a>(
        path: &Path,
        snaps: impl IntoIterator<Item = &'a CurrentSnap>,
    ) -> Result<()> {
        let manifest = Manifest {
            snaps: snaps
                .into_iter()
                .map(|snap| ManifestEntry {
                    name: snap.name.clone(),
                    channel: channel::normalize(&snap.channel).to_string(),
                    file: snap_filename(&snap.name, snap.revision),
                })
                .collect(),
        };

        let yaml = serde_yaml::to_string(&manifest).map_err(|e| Error::ManifestParse {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::write(path, yaml)
            .map_err(|e| Error::IoError(format!("failed to write {}: {e}", path.display())))?;

        debug!("Rewrote {}", path.display());
        Ok(())
    }
}
