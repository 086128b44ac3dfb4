// src/assertions/fetch.rs

//! Assertion chain assembly for one snap
//!
//! Fetch order is dictated by key derivation: the snap-declaration names
//! the signing key, the store info names the publisher, and the blob
//! digest (re-encoded base64url) keys the snap-revision. Output order is
//! fixed: account-key, account, snap-declaration, snap-revision.

use crate::assertions::{writer, Assertion};
use crate::error::{Error, Result};
use crate::store::{AssertionFetcher, AssertionKind, SnapInfo};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

const SERIES: &str = "16";

/// Fetch the four assertions for a resolved snap and write the `.assert`
/// sidecar.
///
/// A missing `snap-revision` assertion is tolerated: the chain is written
/// without it. Every other fetch failure is fatal for the snap.
pub fn fetch_and_write(
    fetcher: &dyn AssertionFetcher,
    info: &SnapInfo,
    dest: &Path,
) -> Result<()> {
    let declaration = fetcher
        .assertion(AssertionKind::SnapDeclaration, &[SERIES, &info.snap_id])
        .map_err(|e| fetch_failed(AssertionKind::SnapDeclaration, info, e))?;

    let sign_key = declaration
        .header_str("sign-key-sha3-384")
        .filter(|key| !key.is_empty())
        .ok_or_else(|| Error::AssertionFetchFailed {
            kind: AssertionKind::SnapDeclaration,
            snap: info.name.clone(),
            reason: "missing sign-key-sha3-384 header".to_string(),
        })?
        .to_string();

    let account_key = fetcher
        .assertion(AssertionKind::AccountKey, &[&sign_key])
        .map_err(|e| fetch_failed(AssertionKind::AccountKey, info, e))?;

    let account = fetcher
        .assertion(AssertionKind::Account, &[&info.publisher_id])
        .map_err(|e| fetch_failed(AssertionKind::Account, info, e))?;

    let snap_revision = fetch_snap_revision(fetcher, info)?;

    let file = File::create(dest)
        .map_err(|e| Error::IoError(format!("failed to create {}: {e}", dest.display())))?;
    let mut out = BufWriter::new(file);

    writer::write_assertion(AssertionKind::AccountKey, &account_key, &mut out)?;
    writer::write_assertion(AssertionKind::Account, &account, &mut out)?;
    writer::write_assertion(AssertionKind::SnapDeclaration, &declaration, &mut out)?;
    if let Some(revision) = &snap_revision {
        writer::write_assertion(AssertionKind::SnapRevision, revision, &mut out)?;
    }
    out.flush()
        .map_err(|e| Error::IoError(format!("failed to write {}: {e}", dest.display())))?;

    debug!("Assertions written to {}", dest.display());
    Ok(())
}

/// The snap-revision key is the blob digest transcoded from hex to
/// base64url without padding, with a trailing slash selecting the default
/// provenance.
fn fetch_snap_revision(
    fetcher: &dyn AssertionFetcher,
    info: &SnapInfo,
) -> Result<Option<Assertion>> {
    let digest = hex::decode(&info.sha3_384).map_err(|e| Error::AssertionFetchFailed {
        kind: AssertionKind::SnapRevision,
        snap: info.name.clone(),
        reason: format!("invalid sha3-384 hex: {e}"),
    })?;
    let key = format!("{}/", URL_SAFE_NO_PAD.encode(digest));

    match fetcher.assertion(AssertionKind::SnapRevision, &[&key]) {
        Ok(assertion) => Ok(Some(assertion)),
        Err(e) => {
            warn!(
                "Failed to fetch snap-revision assertion for {}: {}",
                info.name, e
            );
            Ok(None)
        }
    }
}

fn fetch_failed(
    kind: AssertionKind,
    info: &SnapInfo,
    cause: crate::store::StoreError,
) -> Error {
    Error::AssertionFetchFailed {
        kind,
        snap: info.name.clone(),
        reason: cause.to_string(),
    }
}
