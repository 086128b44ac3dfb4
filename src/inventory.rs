// src/inventory.rs

//! Local inventory of snaps already present in the seed
//!
//! The directory itself is the source of truth: blobs are discovered by
//! filename, and each blob's identity (`snap-id`, revision) is recovered
//! from its `.assert` sidecar. An incomplete sidecar keeps its
//! filename-derived revision but is flagged so the resolver falls back to
//! a fresh install query.

use crate::error::{Error, Result};
use crate::layout::{assert_filename, revision_from_filename, SeedLayout};
use crate::store::CurrentSnap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A snap revision found on disk
#[derive(Debug, Clone)]
pub struct PreviousSnap {
    pub path: PathBuf,
    pub snap: CurrentSnap,
    /// False when the sidecar lacked `snap-id` or `snap-revision`
    pub complete: bool,
}

/// Locate the newest on-disk revision of `name`, if any.
///
/// Scans the snaps directory for `<name>_<rev>.snap`, picks the numerically
/// greatest revision, and parses the sibling assertion for the snap-id.
pub fn find_previous_snap(layout: &SeedLayout, name: &str) -> Option<PreviousSnap> {
    let entries = match fs::read_dir(layout.snaps_dir()) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Error reading snaps directory: {}", e);
            return None;
        }
    };

    let prefix = format!("{name}_");
    let mut best: Option<(u64, PathBuf)> = None;

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if !file_name.starts_with(&prefix) || !file_name.ends_with(".snap") {
            continue;
        }
        let Some(revision) = revision_from_filename(&file_name) else {
            continue;
        };
        let Ok(revision) = revision.parse::<u64>() else {
            debug!("Failed to parse revision from file name: {}", file_name);
            continue;
        };
        debug!("Found {} with revision {}", file_name, revision);
        if best.as_ref().map_or(true, |(r, _)| revision > *r) {
            best = Some((revision, entry.path()));
        }
    }

    let (revision, path) = best?;
    let assert_path = layout.assertions_dir().join(assert_filename(name, revision));
    let (snap_id, assert_revision) = parse_assert_identity(&assert_path);
    let complete = !snap_id.is_empty() && assert_revision > 0;
    if !complete {
        warn!("Incomplete snap info in assertion file: {}", assert_path.display());
    }

    Some(PreviousSnap {
        path,
        snap: CurrentSnap {
            name: name.to_string(),
            snap_id,
            // Filename is authoritative for the revision comparison
            revision,
            channel: String::new(),
        },
        complete,
    })
}

/// Rebuild one current-snap record from its assertion sidecar, for the
/// startup pass over the manifest. Returns an error when the sidecar is
/// missing or incomplete; the caller skips the entry.
pub fn current_snap_from_assertions(layout: &SeedLayout, name: &str) -> Result<CurrentSnap> {
    let dir = layout.assertions_dir();
    let entries = fs::read_dir(&dir)
        .map_err(|e| Error::IoError(format!("failed to read {}: {e}", dir.display())))?;

    let prefix = format!("{name}_");
    let mut best: Option<(u64, PathBuf)> = None;
    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if !file_name.starts_with(&prefix) || !file_name.ends_with(".assert") {
            continue;
        }
        let Some(revision) = revision_from_filename(&file_name).and_then(|r| r.parse().ok())
        else {
            continue;
        };
        if best.as_ref().map_or(true, |(r, _)| revision > *r) {
            best = Some((revision, entry.path()));
        }
    }

    let (_, path) = best.ok_or_else(|| {
        Error::IoError(format!("no assertion file found for snap: {name}"))
    })?;

    let (snap_id, revision) = parse_assert_identity(&path);
    if snap_id.is_empty() || revision == 0 {
        return Err(Error::IoError(format!(
            "incomplete snap info in assertion file for snap: {name}"
        )));
    }

    debug!("Found snap info for {}: snap-id {}, revision {}", name, snap_id, revision);
    Ok(CurrentSnap {
        name: name.to_string(),
        snap_id,
        revision,
        channel: String::new(),
    })
}

/// Scan an assertion file for the `snap-id` and `snap-revision` headers.
///
/// Plain line scanning is enough here; the values live in the top-level
/// header block and indented occurrences do not carry a bare prefix.
fn parse_assert_identity(path: &Path) -> (String, u64) {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            debug!("Failed to read assertion file {}: {}", path.display(), e);
            return (String::new(), 0);
        }
    };

    let mut snap_id = String::new();
    let mut revision = 0u64;
    for line in content.lines() {
        if let Some(value) = line.strip_prefix("snap-id:") {
            snap_id = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("snap-revision:") {
            revision = value.trim().parse().unwrap_or(0);
        }
    }
    (snap_id, revision)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(tmp: &tempfile::TempDir) -> SeedLayout {
        let layout = SeedLayout::new(tmp.path().join("seed"));
        layout.ensure_directories().unwrap();
        layout
    }

    fn write_assert(layout: &SeedLayout, name: &str, revision: u64, snap_id: &str) {
        let content = format!(
            "type: snap-revision\nsnap-id: {snap_id}\nsnap-revision: {revision}\n\nSIG\n"
        );
        fs::write(layout.assert_path(name, revision), content).unwrap();
    }

    #[test]
    fn test_picks_greatest_revision() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = seed(&tmp);
        for revision in [3, 12, 7] {
            fs::write(layout.snap_path("hello", revision), b"blob").unwrap();
            write_assert(&layout, "hello", revision, "hello-id");
        }

        let previous = find_previous_snap(&layout, "hello").unwrap();
        assert_eq!(previous.snap.revision, 12);
        assert_eq!(previous.snap.snap_id, "hello-id");
        assert!(previous.complete);
    }

    #[test]
    fn test_prefix_is_exact() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = seed(&tmp);
        fs::write(layout.snap_path("hello-world", 5), b"blob").unwrap();
        write_assert(&layout, "hello-world", 5, "other-id");

        assert!(find_previous_snap(&layout, "hello").is_none());
    }

    #[test]
    fn test_incomplete_assert_is_flagged() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = seed(&tmp);
        fs::write(layout.snap_path("hello", 9), b"blob").unwrap();
        fs::write(
            layout.assert_path("hello", 9),
            "type: snap-declaration\nsnap-name: hello\n\nSIG\n",
        )
        .unwrap();

        let previous = find_previous_snap(&layout, "hello").unwrap();
        assert!(!previous.complete);
        // Revision still comes from the file name
        assert_eq!(previous.snap.revision, 9);
    }

    #[test]
    fn test_missing_assert_is_flagged() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = seed(&tmp);
        fs::write(layout.snap_path("hello", 4), b"blob").unwrap();

        let previous = find_previous_snap(&layout, "hello").unwrap();
        assert!(!previous.complete);
    }

    #[test]
    fn test_current_snap_from_assertions() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = seed(&tmp);
        write_assert(&layout, "core22", 1380, "core22-id");

        let current = current_snap_from_assertions(&layout, "core22").unwrap();
        assert_eq!(current.snap_id, "core22-id");
        assert_eq!(current.revision, 1380);

        assert!(current_snap_from_assertions(&layout, "absent").is_err());
    }
}
