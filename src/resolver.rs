// src/resolver.rs

//! Dependency resolution against the store
//!
//! Starting from the requested snaps (plus the hard-coded `snapd` and
//! `bare` roots the driver seeds), the resolver walks an explicit worklist,
//! closing over each snap's base and missing content providers. Every name
//! enters `processed` exactly once, so shared dependencies are queried once
//! and cycles cannot recurse.
//!
//! Channel recovery ladder, driven by the typed store errors:
//! - fresh install, channel miss: retry the install on the fallback channel
//! - refresh, no update: re-query as an install to obtain fresh info for
//!   the dependency walk
//! - refresh, channel miss: refresh on the fallback channel, and when that
//!   reports no update, install on the fallback channel

use crate::error::{Error, Result};
use crate::inventory::{self, PreviousSnap};
use crate::layout::SeedLayout;
use crate::store::{
    ActionOp, CurrentSnap, SnapAction, SnapActionClient, SnapActionResult, StoreError,
};
use crate::channel::SnapRequest;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

/// Books the resolver and driver share across a run
#[derive(Debug, Default)]
pub struct SeedState {
    /// Best known revision per snap name; rewritten into the manifest
    pub current_snaps: BTreeMap<String, CurrentSnap>,
    /// Names the engine has committed to keep
    pub required: BTreeSet<String>,
    /// Names already walked; the cycle and dedup guard
    pub processed: BTreeSet<String>,
    /// Expected download bytes per snap, for progress
    pub sizes: BTreeMap<String, u64>,
    pub total_size: u64,
}

impl SeedState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One snap that needs to be materialized
#[derive(Debug, Clone)]
pub struct ResolvedWork {
    pub name: String,
    pub channel: String,
    pub current: CurrentSnap,
    pub result: SnapActionResult,
}

/// Walks the dependency closure for a set of requested snaps
pub struct Resolver<'a> {
    store: &'a dyn SnapActionClient,
    layout: &'a SeedLayout,
    default_channel: &'a str,
    fallback_channel: &'a str,
}

impl<'a> Resolver<'a> {
    pub fn new(
        store: &'a dyn SnapActionClient,
        layout: &'a SeedLayout,
        default_channel: &'a str,
        fallback_channel: &'a str,
    ) -> Self {
        Self {
            store,
            layout,
            default_channel,
            fallback_channel,
        }
    }

    /// Resolve the full closure, returning only the snaps that need work.
    ///
    /// Snaps already on disk at the store's revision are marked required in
    /// `state` and produce no work item.
    pub fn resolve(
        &self,
        requests: &[SnapRequest],
        state: &mut SeedState,
    ) -> Result<Vec<ResolvedWork>> {
        let mut queue: VecDeque<(String, String)> = requests
            .iter()
            .map(|request| {
                let channel = request
                    .channel
                    .clone()
                    .unwrap_or_else(|| self.default_channel.to_string());
                (request.name.clone(), channel)
            })
            .collect();

        let mut work = Vec::new();

        while let Some((name, channel)) = queue.pop_front() {
            if state.processed.contains(&name) {
                debug!("Snap {} has already been processed. Skipping.", name);
                continue;
            }

            let previous = inventory::find_previous_snap(self.layout, &name);
            let refresh_with = previous
                .as_ref()
                .filter(|p| p.complete)
                .map(|p| p.snap.clone());

            let (result, used_channel) =
                self.query_with_recovery(&name, refresh_with.as_ref(), &channel)?;

            let info = &result.info;
            if info.snap_id.is_empty() || info.revision == 0 {
                return Err(Error::InvalidInfo { name });
            }

            state.processed.insert(name.clone());
            let current = CurrentSnap {
                name: name.clone(),
                snap_id: info.snap_id.clone(),
                revision: info.revision,
                channel: used_channel.clone(),
            };
            state.current_snaps.insert(name.clone(), current.clone());

            // Enqueue dependencies before the result is moved into the
            // work list
            for provider in info.content_providers.values() {
                if !state.processed.contains(provider) {
                    debug!(
                        "Collecting dependencies for prerequisite snap: {} for {}",
                        provider, name
                    );
                    queue.push_back((provider.clone(), channel.clone()));
                }
            }
            if let Some(base) = info.base.as_deref().filter(|b| !b.is_empty()) {
                if !state.processed.contains(base) {
                    debug!("Collecting dependencies for base snap: {} for {}", base, name);
                    queue.push_back((base.to_string(), channel.clone()));
                }
            }

            let needs_update = needs_update(previous.as_ref(), info.revision);
            if needs_update {
                let size = if result.deltas.is_empty() {
                    info.size
                } else {
                    result.deltas.iter().map(|d| d.size).sum()
                };
                state.sizes.insert(name.clone(), size);
                state.total_size += size;
                work.push(ResolvedWork {
                    name,
                    channel: used_channel,
                    current,
                    result,
                });
            } else {
                state.required.insert(name);
            }
        }

        Ok(work)
    }

    fn query_with_recovery(
        &self,
        name: &str,
        refresh_with: Option<&CurrentSnap>,
        channel: &str,
    ) -> Result<(SnapActionResult, String)> {
        let fallback = self.fallback_channel;

        match refresh_with {
            None => match self.query(name, None, channel) {
                Ok(result) => Ok((result, channel.to_string())),
                Err(StoreError::ChannelMiss) => self
                    .query(name, None, fallback)
                    .map(|result| (result, fallback.to_string()))
                    .map_err(|e| self.fatal(name, e)),
                Err(e) => Err(self.fatal(name, e)),
            },
            Some(current) => match self.query(name, Some(current), channel) {
                Ok(result) => Ok((result, channel.to_string())),
                Err(StoreError::NoUpdate) => {
                    // Already up to date; re-query as an install to get the
                    // info needed for the dependency walk
                    self.query(name, None, channel)
                        .map(|result| (result, channel.to_string()))
                        .map_err(|e| self.fatal(name, e))
                }
                Err(StoreError::ChannelMiss) => {
                    match self.query(name, Some(current), fallback) {
                        Ok(result) => Ok((result, fallback.to_string())),
                        Err(StoreError::NoUpdate) => self
                            .query(name, None, fallback)
                            .map(|result| (result, fallback.to_string()))
                            .map_err(|e| self.fatal(name, e)),
                        Err(e) => Err(self.fatal(name, e)),
                    }
                }
                Err(e) => Err(self.fatal(name, e)),
            },
        }
    }

    fn query(
        &self,
        name: &str,
        refresh_with: Option<&CurrentSnap>,
        channel: &str,
    ) -> std::result::Result<SnapActionResult, StoreError> {
        let (include, action) = match refresh_with {
            Some(current) => {
                debug!("Crafting refresh action for {}", name);
                (
                    vec![current.clone()],
                    SnapAction {
                        op: ActionOp::Refresh,
                        snap_id: Some(current.snap_id.clone()),
                        instance_name: name.to_string(),
                        channel: channel.to_string(),
                    },
                )
            }
            None => {
                debug!("Crafting install action for {}", name);
                (
                    Vec::new(),
                    SnapAction {
                        op: ActionOp::Install,
                        snap_id: None,
                        instance_name: name.to_string(),
                        channel: channel.to_string(),
                    },
                )
            }
        };

        let results = self.store.action(&include, &[action])?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Unavailable(format!("no snap info returned for {name}")))
    }

    fn fatal(&self, name: &str, error: StoreError) -> Error {
        match error {
            StoreError::NotFound => Error::SnapNotFound {
                name: name.to_string(),
            },
            other => Error::StoreUnavailable {
                name: name.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

fn needs_update(previous: Option<&PreviousSnap>, store_revision: u64) -> bool {
    match previous {
        None => true,
        Some(p) => p.snap.revision < store_revision,
    }
}
