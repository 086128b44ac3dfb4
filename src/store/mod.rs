// src/store/mod.rs

//! Store-facing types and interfaces
//!
//! The engine talks to the snap store through two narrow traits: one for
//! install/refresh action queries, one for assertion fetches. The real
//! HTTP implementation lives in [`remote`]; tests substitute in-memory
//! stubs.
//!
//! The store surfaces several important conditions only in its error
//! message text. [`StoreError::classify`] maps that text back to a typed
//! error exactly once, here at the boundary; the resolver never does
//! substring matching.

pub mod remote;

use crate::assertions::Assertion;
use std::collections::BTreeMap;
use std::fmt;

/// Typed view of a store failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Refresh found nothing newer than the revision we hold
    NoUpdate,
    /// The requested channel carries no revision for this snap
    ChannelMiss,
    /// The store has never heard of this snap
    NotFound,
    /// Anything else: network failure, 5xx, malformed response
    Unavailable(String),
}

impl StoreError {
    /// Map a store error message to its typed kind.
    ///
    /// The wire protocol reports these conditions as message text only, so
    /// the match is by substring.
    pub fn classify(message: &str) -> Self {
        if message.contains("snap has no updates available") {
            StoreError::NoUpdate
        } else if message.contains("no snap revision available as specified") {
            StoreError::ChannelMiss
        } else if message.contains("snap not found") {
            StoreError::NotFound
        } else {
            StoreError::Unavailable(message.to_string())
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NoUpdate => write!(f, "snap has no updates available"),
            StoreError::ChannelMiss => write!(f, "no snap revision available as specified"),
            StoreError::NotFound => write!(f, "snap not found"),
            StoreError::Unavailable(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for StoreError {}

/// The four assertion kinds a snap's chain is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssertionKind {
    AccountKey,
    Account,
    SnapDeclaration,
    SnapRevision,
}

impl AssertionKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AssertionKind::AccountKey => "account-key",
            AssertionKind::Account => "account",
            AssertionKind::SnapDeclaration => "snap-declaration",
            AssertionKind::SnapRevision => "snap-revision",
        }
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the engine asks the store to do for one snap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionOp {
    Install,
    Refresh,
}

impl ActionOp {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActionOp::Install => "install",
            ActionOp::Refresh => "refresh",
        }
    }
}

/// One entry in an action request
#[derive(Debug, Clone)]
pub struct SnapAction {
    pub op: ActionOp,
    /// Required for refresh, absent for install
    pub snap_id: Option<String>,
    pub instance_name: String,
    pub channel: String,
}

/// A snap revision we currently hold, as known from disk or the resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentSnap {
    pub name: String,
    pub snap_id: String,
    pub revision: u64,
    /// Channel the revision tracks; empty when rebuilt from assertions
    pub channel: String,
}

/// Store metadata for one resolved snap revision
#[derive(Debug, Clone, Default)]
pub struct SnapInfo {
    pub name: String,
    pub snap_id: String,
    pub revision: u64,
    pub version: String,
    /// Rootfs snap this snap runs on, if any
    pub base: Option<String>,
    pub publisher_id: String,
    pub publisher_username: String,
    pub size: u64,
    /// Hex digest of the blob
    pub sha3_384: String,
    pub download_url: String,
    /// Content-interface plug name -> default provider snap
    pub content_providers: BTreeMap<String, String>,
}

/// A binary patch the store offers between two revisions
#[derive(Debug, Clone)]
pub struct DeltaInfo {
    pub from_revision: u64,
    pub to_revision: u64,
    pub format: String,
    pub download_url: String,
    pub size: u64,
    /// Hex digest of the delta file itself
    pub sha3_384: String,
}

/// Response to one action: the resolved revision plus any deltas
#[derive(Debug, Clone)]
pub struct SnapActionResult {
    pub info: SnapInfo,
    pub deltas: Vec<DeltaInfo>,
}

/// Install/refresh queries against the store
pub trait SnapActionClient {
    /// Run the given actions. `include` carries the revisions we already
    /// hold so refresh responses can offer deltas.
    fn action(
        &self,
        include: &[CurrentSnap],
        actions: &[SnapAction],
    ) -> std::result::Result<Vec<SnapActionResult>, StoreError>;
}

/// Assertion fetches by type and primary key
pub trait AssertionFetcher {
    fn assertion(
        &self,
        kind: AssertionKind,
        primary_key: &[&str],
    ) -> std::result::Result<Assertion, StoreError>;
}

impl<T: SnapActionClient + ?Sized> SnapActionClient for std::sync::Arc<T> {
    fn action(
        &self,
        include: &[CurrentSnap],
        actions: &[SnapAction],
    ) -> std::result::Result<Vec<SnapActionResult>, StoreError> {
        (**self).action(include, actions)
    }
}

impl<T: AssertionFetcher + ?Sized> AssertionFetcher for std::sync::Arc<T> {
    fn assertion(
        &self,
        kind: AssertionKind,
        primary_key: &[&str],
    ) -> std::result::Result<Assertion, StoreError> {
        (**self).assertion(kind, primary_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_messages() {
        assert_eq!(
            StoreError::classify("snap has no updates available"),
            StoreError::NoUpdate
        );
        assert_eq!(
            StoreError::classify("cannot refresh: no snap revision available as specified"),
            StoreError::ChannelMiss
        );
        assert_eq!(
            StoreError::classify("cannot install snap \"nope\": snap not found"),
            StoreError::NotFound
        );
    }

    #[test]
    fn test_classify_unknown_message() {
        match StoreError::classify("connection reset by peer") {
            StoreError::Unavailable(reason) => {
                assert_eq!(reason, "connection reset by peer")
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }
}
