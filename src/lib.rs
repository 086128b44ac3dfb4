// src/lib.rs

//! snapd-seed-glue
//!
//! Prepares a snap seed directory - blobs, assertions, and manifest - so a
//! freshly installed host can initialize its snap subsystem entirely
//! offline on first boot.
//!
//! # Architecture
//!
//! - Resolver: closes the requested snaps over bases and content providers
//! - Downloader: SHA3-384-verified transfers, delta shortcut via xdelta3
//! - Assertion writer: byte-exact chains in the form seed validation expects
//! - Reconciler: drives resolve, acquire, purge, manifest rewrite, validate
//!
//! External collaborators (the store API, xdelta3, the snap CLI) sit
//! behind traits; the whole engine runs hermetically in tests.

pub mod assertions;
pub mod channel;
pub mod delta;
pub mod download;
mod error;
pub mod inventory;
pub mod layout;
pub mod manifest;
pub mod progress;
pub mod reconcile;
pub mod resolver;
pub mod store;
pub mod validate;

pub use assertions::{Assertion, HeaderValue};
pub use channel::{SnapRequest, FALLBACK_CHANNEL};
pub use delta::{DeltaApplier, Xdelta3Applier};
pub use download::{Backoff, Downloader, HttpTransport, RetryPolicy, Transport};
pub use error::{Error, Result};
pub use layout::SeedLayout;
pub use manifest::{Manifest, ManifestEntry};
pub use progress::{ByteMeter, ProgressTracker, RecordingReporter, Reporter, TabReporter};
pub use reconcile::{Collaborators, Reconciler};
pub use resolver::{ResolvedWork, Resolver, SeedState};
pub use store::remote::RemoteStore;
pub use store::{
    ActionOp, AssertionFetcher, AssertionKind, CurrentSnap, DeltaInfo, SnapAction,
    SnapActionClient, SnapActionResult, SnapInfo, StoreError,
};
pub use validate::{SnapCli, SnapCommand};
