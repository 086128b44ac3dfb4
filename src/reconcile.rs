// src/reconcile.rs

//! The reconciliation driver
//!
//! Turns a partially populated seed directory plus a set of requested
//! snaps into a consistent seed: resolve the closure, materialize each
//! missing blob (delta first, full download as fallback), write its
//! assertion chain, purge everything no longer required, rewrite the
//! manifest, and hand the result to the external validator. After a
//! successful run the directory contents and the manifest agree exactly.
//!
//! All resolver state lives in the [`SeedState`] the reconciler owns;
//! collaborators come in through traits so tests can drive the whole
//! engine hermetically.

use crate::assertions::fetch;
use crate::channel::{SnapRequest, FALLBACK_CHANNEL};
use crate::delta::DeltaApplier;
use crate::download::{file_sha3_384, Downloader};
use crate::error::Result;
use crate::inventory;
use crate::layout::{assert_filename, snap_filename, SeedLayout};
use crate::manifest::Manifest;
use crate::progress::{ByteMeter, ProgressTracker, Reporter};
use crate::resolver::{ResolvedWork, Resolver, SeedState};
use crate::store::{AssertionFetcher, SnapActionClient};
use crate::validate::{self, SnapCli};
use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use tracing::{debug, warn};

/// The snaps every seed carries regardless of the request
const ESSENTIAL_SNAPS: &[&str] = &["snapd", "bare"];

/// External services the engine drives
pub struct Collaborators {
    pub store: Box<dyn SnapActionClient>,
    pub assertions: Box<dyn AssertionFetcher>,
    pub downloader: Downloader,
    pub applier: Box<dyn DeltaApplier>,
    pub snap_cli: Box<dyn SnapCli>,
}

/// Drives one reconciliation run over a seed directory
pub struct Reconciler {
    layout: SeedLayout,
    default_channel: String,
    fallback_channel: String,
    verbose: bool,
    collaborators: Collaborators,
    progress: Arc<ProgressTracker>,
    state: SeedState,
}

impl Reconciler {
    pub fn new(
        layout: SeedLayout,
        default_channel: String,
        verbose: bool,
        collaborators: Collaborators,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        Self {
            layout,
            default_channel,
            fallback_channel: FALLBACK_CHANNEL.to_string(),
            verbose,
            collaborators,
            progress: Arc::new(ProgressTracker::new(reporter)),
            state: SeedState::new(),
        }
    }

    /// Run the full reconciliation for the requested snaps.
    ///
    /// On error the directory is left as-is for inspection; the manifest is
    /// only rewritten once every required snap is materialized.
    pub fn run(&mut self, requests: &[SnapRequest]) -> Result<()> {
        self.progress.start();

        self.layout.ensure_directories()?;
        Manifest::ensure_exists(&self.layout.seed_yaml())?;

        if !self.verbose {
            self.progress.report_line(2, "Loading existing snaps...");
        }
        self.load_current_snaps()?;

        let roots = self.collect_roots(requests);
        for root in &roots {
            self.state.required.insert(root.name.clone());
        }

        if !self.verbose {
            self.progress
                .report_line(4, "Fetching information from the Snap Store...");
        }
        let work = Resolver::new(
            &*self.collaborators.store,
            &self.layout,
            &self.default_channel,
            &self.fallback_channel,
        )
        .resolve(&roots, &mut self.state)?;

        self.progress.set_total_bytes(self.state.total_size as f64);
        self.progress.finish_step("Finished collecting snap info");

        if work.is_empty() {
            debug!("No snaps to process.");
        } else {
            debug!("Total snaps to download: {}", work.len());
        }

        for item in &work {
            self.process_snap(item)?;
            self.state.required.insert(item.name.clone());
        }

        if work.is_empty() {
            self.progress.next_step();
        } else {
            self.progress.finish_step("Downloading snaps completed");
        }

        self.purge_unrequired();
        Manifest::rewrite(&self.layout.seed_yaml(), self.state.current_snaps.values())?;
        self.remove_state_json();
        validate::ensure_assertions(&self.layout, &*self.collaborators.snap_cli)?;
        self.collaborators
            .snap_cli
            .validate_seed(&self.layout.seed_yaml())?;
        self.cleanup_files();

        self.progress.finish_step("Cleanup and validation completed");
        Ok(())
    }

    /// Rebuild `current_snaps` from the manifest and the assertion files
    /// on disk. Entries whose sidecars are unusable are skipped; the
    /// resolver re-discovers them.
    fn load_current_snaps(&mut self) -> Result<()> {
        let manifest = Manifest::load(&self.layout.seed_yaml())?;
        for name in manifest.names() {
            match inventory::current_snap_from_assertions(&self.layout, name) {
                Ok(current) => {
                    debug!("Found {} in seed.yaml", name);
                    self.state.current_snaps.insert(name.to_string(), current);
                }
                Err(e) => {
                    debug!("Failed to get info for existing snap {}: {}", name, e);
                }
            }
        }
        Ok(())
    }

    /// Essential snaps plus the user's requests, one entry per name. A
    /// user-specified channel wins over the default for the essentials.
    fn collect_roots(&self, requests: &[SnapRequest]) -> Vec<SnapRequest> {
        let mut roots: BTreeMap<String, Option<String>> = ESSENTIAL_SNAPS
            .iter()
            .map(|name| (name.to_string(), None))
            .collect();
        for request in requests {
            roots.insert(request.name.clone(), request.channel.clone());
        }
        roots
            .into_iter()
            .map(|(name, channel)| SnapRequest { name, channel })
            .collect()
    }

    /// Materialize one snap: blob first (delta if possible), then the
    /// assertion chain. A blob is only considered complete once its
    /// assertions are on disk.
    fn process_snap(&self, item: &ResolvedWork) -> Result<()> {
        let info = &item.result.info;
        debug!(
            "Processing snap: {} on channel: {}",
            item.name, item.channel
        );

        let dest = self.layout.snap_path(&info.name, info.revision);
        if !self.try_deltas(item) {
            let mut meter = self.meter(&info.name, &info.version, false);
            self.collaborators.downloader.download_snap(
                &info.download_url,
                &dest,
                &info.sha3_384,
                &mut meter,
            )?;
        }

        let assert_path = self.layout.assert_path(&info.name, info.revision);
        fetch::fetch_and_write(&*self.collaborators.assertions, info, &assert_path)?;

        debug!(
            "Downloaded and applied snap: {}, revision: {}",
            info.name, info.revision
        );
        Ok(())
    }

    /// Walk the offered deltas; the first one that downloads, applies, and
    /// digest-checks wins. Returns false when the caller must fall back to
    /// the full download.
    fn try_deltas(&self, item: &ResolvedWork) -> bool {
        let info = &item.result.info;
        let dest = self.layout.snap_path(&info.name, info.revision);

        for delta in &item.result.deltas {
            debug!(
                "Delta found for {} from {} to {}",
                info.name, delta.from_revision, delta.to_revision
            );
            let delta_path =
                self.layout
                    .delta_path(&info.name, delta.from_revision, delta.to_revision);

            let mut meter = self.meter(&info.name, &info.version, true);
            if let Err(e) = self.collaborators.downloader.download_delta(
                &delta.download_url,
                &delta_path,
                &delta.sha3_384,
                &mut meter,
            ) {
                warn!("Attempt to download delta for snap {} failed: {}", info.name, e);
                continue;
            }

            let old = self.layout.snap_path(&info.name, delta.from_revision);
            if !old.is_file() {
                debug!(
                    "Old snap file {} does not exist. Cannot apply delta.",
                    old.display()
                );
                let _ = fs::remove_file(&delta_path);
                continue;
            }

            let applied = self.collaborators.applier.apply(&old, &delta_path, &dest);
            let _ = fs::remove_file(&delta_path);
            if let Err(e) = applied {
                warn!("Failed to apply delta for snap {}: {}", info.name, e);
                continue;
            }

            // The reconstructed blob must carry the advertised digest;
            // anything else counts as an apply failure
            match file_sha3_384(&dest) {
                Ok(actual) if actual.eq_ignore_ascii_case(&info.sha3_384) => {
                    debug!("Delta applied successfully for snap {}", info.name);
                    return true;
                }
                Ok(_) => {
                    warn!(
                        "Delta result for snap {} does not match advertised digest",
                        info.name
                    );
                    let _ = fs::remove_file(&dest);
                }
                Err(e) => {
                    warn!("Failed to digest delta result for snap {}: {}", info.name, e);
                    let _ = fs::remove_file(&dest);
                }
            }
        }

        false
    }

    fn meter(&self, name: &str, version: &str, is_delta: bool) -> ByteMeter {
        let total = self.state.sizes.get(name).copied().unwrap_or(0) as f64;
        ByteMeter::new(self.progress.clone(), name, version, is_delta, total)
    }

    /// Drop every snap the run did not mark required, deleting its blob
    /// and assertion files.
    fn purge_unrequired(&mut self) {
        let doomed: Vec<_> = self
            .state
            .current_snaps
            .values()
            .filter(|snap| !self.state.required.contains(&snap.name))
            .cloned()
            .collect();

        for snap in doomed {
            debug!("Removing unnecessary snap: {}", snap.name);
            for path in [
                self.layout.snap_path(&snap.name, snap.revision),
                self.layout.assert_path(&snap.name, snap.revision),
            ] {
                if path.is_file() {
                    if let Err(e) = fs::remove_file(&path) {
                        warn!("Failed to remove {}: {}", path.display(), e);
                    } else {
                        debug!("Removed {}", path.display());
                    }
                }
            }
            self.state.current_snaps.remove(&snap.name);
        }
    }

    /// A stray snapd state file next to the seed directory would shadow
    /// first-boot seeding; drop it.
    fn remove_state_json(&self) {
        let Some(parent) = self.layout.seed_dir().parent() else {
            return;
        };
        let path = parent.join("state.json");
        if path.is_file() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove state.json: {}", e);
            } else {
                debug!("Removed state.json at {}", path.display());
            }
        }
    }

    /// Final sweep: in-flight leftovers (`.partial`, `.delta`) and any
    /// blob or assertion file the manifest does not reference. Top-level
    /// model assertions carry no `.assert` suffix and are untouched.
    fn cleanup_files(&self) {
        debug!("Starting cleanup process...");

        let valid_snaps: Vec<String> = self
            .state
            .current_snaps
            .values()
            .map(|snap| snap_filename(&snap.name, snap.revision))
            .collect();
        let valid_asserts: Vec<String> = self
            .state
            .current_snaps
            .values()
            .map(|snap| assert_filename(&snap.name, snap.revision))
            .collect();
        debug!("Valid snaps: {:?}", valid_snaps);

        if let Ok(entries) = fs::read_dir(self.layout.snaps_dir()) {
            for entry in entries.flatten() {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                let stale = if file_name.ends_with(".partial") || file_name.ends_with(".delta") {
                    true
                } else if file_name.ends_with(".snap") {
                    !valid_snaps.contains(&file_name)
                } else {
                    false
                };
                if stale {
                    debug!("Removing stale file: {}", entry.path().display());
                    if let Err(e) = fs::remove_file(entry.path()) {
                        warn!("Failed to remove {}: {}", entry.path().display(), e);
                    }
                }
            }
        }

        if let Ok(entries) = fs::read_dir(self.layout.assertions_dir()) {
            for entry in entries.flatten() {
                let file_name = entry.file_name().to_string_lossy().into_owned();
                if file_name.ends_with(".assert") && !valid_asserts.contains(&file_name) {
                    debug!("Removing orphaned assertion file: {}", entry.path().display());
                    if let Err(e) = fs::remove_file(entry.path()) {
                        warn!("Failed to remove {}: {}", entry.path().display(), e);
                    }
                }
            }
        }

        debug!("Cleanup process completed.");
    }
}
