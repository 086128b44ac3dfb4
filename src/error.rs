// src/error.rs

//! Error types for seed reconciliation
//!
//! Every fatal condition the engine can hit maps to one variant here.
//! Channel fallback and "no updates" recovery never surface as `Error`;
//! they are handled inside the resolver via the typed store errors.

use crate::store::AssertionKind;
use thiserror::Error;

/// Errors that can occur while reconciling a seed directory
#[derive(Error, Debug)]
pub enum Error {
    /// The store does not know the requested snap at all
    #[error("cannot install snap \"{name}\": snap not found")]
    SnapNotFound { name: String },

    /// The store answered, but without a usable snap-id or revision
    #[error("invalid snap information for {name}: snap-id or revision is missing")]
    InvalidInfo { name: String },

    /// The store could not be reached or returned an unclassified error
    #[error("store request failed for {name}: {reason}")]
    StoreUnavailable { name: String, reason: String },

    /// A single transfer attempt failed; the downloader retries these
    #[error("download error: {0}")]
    Download(String),

    /// A blob download exhausted its retry budget
    #[error("download of {url} failed after {attempts} attempts: {reason}")]
    DownloadFailed {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Downloaded bytes do not match the advertised digest
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// xdelta3 refused the patch; the caller falls back to a full download
    #[error("failed to apply delta: {0}")]
    DeltaApplyFailed(String),

    /// A required assertion could not be fetched
    #[error("failed to fetch {kind} assertion for snap {snap}: {reason}")]
    AssertionFetchFailed {
        kind: AssertionKind,
        snap: String,
        reason: String,
    },

    /// An assertion file did not parse as the snapd wire format
    #[error("failed to parse assertion: {0}")]
    AssertionParse(String),

    /// seed.yaml exists but is not valid YAML
    #[error("failed to parse {path}: {reason}")]
    ManifestParse { path: String, reason: String },

    /// `snap debug validate-seed` rejected the finished directory
    #[error("seed validation failed: {0}")]
    ValidationFailed(String),

    /// An external command (`snap known`, `xdelta3`) could not be run
    #[error("{0}")]
    CommandFailed(String),

    /// Filesystem error, with the path baked into the message
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;
