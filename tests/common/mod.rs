// tests/common/mod.rs

//! Shared stub collaborators for the end-to-end reconciliation tests.
//!
//! A `Catalog` describes the store's world; from it the fixtures build a
//! consistent action client, assertion fetcher, and blob transport. The
//! whole engine then runs hermetically inside a temp directory.

use sha3::{Digest, Sha3_384};
use snapd_seed_glue::{
    ActionOp, Assertion, AssertionFetcher, AssertionKind, CurrentSnap, DeltaInfo, Error,
    HeaderValue, Result, SnapAction, SnapActionClient, SnapActionResult, SnapInfo, StoreError,
    Transport,
};
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const DEFAULT_CHANNEL: &str = "latest/stable/ubuntu-24.04";
pub const SIGN_KEY: &str = "stub-sign-key-sha3-384";

pub fn digest_hex(data: &[u8]) -> String {
    let mut hasher = Sha3_384::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// One snap as the stub store knows it
#[derive(Clone)]
pub struct CatalogSnap {
    pub name: String,
    pub snap_id: String,
    pub revision: u64,
    pub version: String,
    pub base: Option<String>,
    pub providers: BTreeMap<String, String>,
    pub publisher_id: String,
    pub publisher_username: String,
    pub blob: Vec<u8>,
    /// Advertised digest; defaults to the blob's real digest
    pub sha3_384: String,
    /// Deltas offered on refresh, keyed by from-revision
    pub deltas: Vec<(u64, Vec<u8>)>,
}

impl CatalogSnap {
    pub fn new(name: &str, revision: u64) -> Self {
        let blob = format!("{name} blob revision {revision}").into_bytes();
        let sha3_384 = digest_hex(&blob);
        Self {
            name: name.to_string(),
            snap_id: format!("{name}-snap-id-0123456789abcdef"),
            revision,
            version: format!("{revision}.0"),
            base: None,
            providers: BTreeMap::new(),
            publisher_id: format!("{name}-publisher-id"),
            publisher_username: "someone".to_string(),
            blob,
            sha3_384,
            deltas: Vec::new(),
        }
    }

    pub fn base(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    pub fn provider(mut self, plug: &str, provider: &str) -> Self {
        self.providers.insert(plug.to_string(), provider.to_string());
        self
    }

    pub fn publisher(mut self, username: &str) -> Self {
        self.publisher_username = username.to_string();
        self
    }

    /// Advertise a digest that the served bytes will not match
    pub fn corrupt_digest(mut self) -> Self {
        self.sha3_384 = "ab".repeat(48);
        self
    }

    /// Offer a delta from the given revision. The fake applier treats the
    /// delta bytes as the reconstructed blob, so they must equal `blob`.
    pub fn delta_from(mut self, from: u64) -> Self {
        self.deltas.push((from, self.blob.clone()));
        self
    }

    pub fn blob_url(&self) -> String {
        format!("https://store.example/{}/{}", self.name, self.revision)
    }

    pub fn delta_url(&self, from: u64) -> String {
        format!(
            "https://store.example/{}/delta/{}/{}",
            self.name, from, self.revision
        )
    }

    fn info(&self) -> SnapInfo {
        SnapInfo {
            name: self.name.clone(),
            snap_id: self.snap_id.clone(),
            revision: self.revision,
            version: self.version.clone(),
            base: self.base.clone(),
            publisher_id: self.publisher_id.clone(),
            publisher_username: self.publisher_username.clone(),
            size: self.blob.len() as u64,
            sha3_384: self.sha3_384.clone(),
            download_url: self.blob_url(),
            content_providers: self.providers.clone(),
        }
    }
}

/// Store stub implementing both action queries and assertion fetches
pub struct StubStore {
    snaps: HashMap<String, CatalogSnap>,
}

impl StubStore {
    fn result_for(&self, snap: &CatalogSnap, deltas: Vec<DeltaInfo>) -> SnapActionResult {
        SnapActionResult {
            info: snap.info(),
            deltas,
        }
    }
}

impl SnapActionClient for StubStore {
    fn action(
        &self,
        include: &[CurrentSnap],
        actions: &[SnapAction],
    ) -> std::result::Result<Vec<SnapActionResult>, StoreError> {
        let action = &actions[0];
        let snap = self
            .snaps
            .get(&action.instance_name)
            .ok_or(StoreError::NotFound)?;

        match action.op {
            ActionOp::Install => Ok(vec![self.result_for(snap, Vec::new())]),
            ActionOp::Refresh => {
                let current = include
                    .first()
                    .ok_or_else(|| StoreError::Unavailable("refresh without context".into()))?;
                if current.revision >= snap.revision {
                    return Err(StoreError::NoUpdate);
                }
                let deltas = snap
                    .deltas
                    .iter()
                    .filter(|(from, _)| *from == current.revision)
                    .map(|(from, bytes)| DeltaInfo {
                        from_revision: *from,
                        to_revision: snap.revision,
                        format: "xdelta3".to_string(),
                        download_url: snap.delta_url(*from),
                        size: bytes.len() as u64,
                        sha3_384: digest_hex(bytes),
                    })
                    .collect();
                Ok(vec![self.result_for(snap, deltas)])
            }
        }
    }
}

impl AssertionFetcher for StubStore {
    fn assertion(
        &self,
        kind: AssertionKind,
        primary_key: &[&str],
    ) -> std::result::Result<Assertion, StoreError> {
        let scalar =
            |key: &str, value: &str| (key.to_string(), HeaderValue::scalar(value.to_string()));

        match kind {
            AssertionKind::SnapDeclaration => {
                let snap_id = primary_key[1];
                let snap = self
                    .snaps
                    .values()
                    .find(|s| s.snap_id == snap_id)
                    .ok_or(StoreError::NotFound)?;
                Ok(Assertion::new(
                    vec![
                        scalar("type", "snap-declaration"),
                        scalar("authority-id", "canonical"),
                        scalar("revision", "1"),
                        scalar("series", "16"),
                        scalar("snap-id", &snap.snap_id),
                        scalar("publisher-id", &snap.publisher_id),
                        scalar("snap-name", &snap.name),
                        scalar("timestamp", "2024-01-15T10:00:00Z"),
                        scalar("sign-key-sha3-384", SIGN_KEY),
                    ],
                    Vec::new(),
                    b"DECLARATION-SIG\n".to_vec(),
                ))
            }
            AssertionKind::AccountKey => {
                if primary_key[0] != SIGN_KEY {
                    return Err(StoreError::NotFound);
                }
                Ok(Assertion::new(
                    vec![
                        scalar("type", "account-key"),
                        scalar("authority-id", "canonical"),
                        scalar("public-key-sha3-384", SIGN_KEY),
                        scalar("account-id", "canonical"),
                        scalar("name", "store"),
                        scalar("since", "2016-04-01T00:00:00.0Z"),
                        scalar("sign-key-sha3-384", SIGN_KEY),
                    ],
                    b"PUBLIC-KEY-MATERIAL".to_vec(),
                    b"ACCOUNT-KEY-SIG\n".to_vec(),
                ))
            }
            AssertionKind::Account => {
                let snap = self
                    .snaps
                    .values()
                    .find(|s| s.publisher_id == primary_key[0])
                    .ok_or(StoreError::NotFound)?;
                Ok(Assertion::new(
                    vec![
                        scalar("type", "account"),
                        scalar("authority-id", "canonical"),
                        scalar("account-id", &snap.publisher_id),
                        scalar("display-name", &snap.publisher_username),
                        scalar("timestamp", "2020-01-01T00:00:00Z"),
                        scalar("username", &snap.publisher_username),
                        scalar("validation", "unproven"),
                        scalar("sign-key-sha3-384", SIGN_KEY),
                    ],
                    Vec::new(),
                    b"ACCOUNT-SIG\n".to_vec(),
                ))
            }
            AssertionKind::SnapRevision => {
                let key = primary_key[0];
                let snap = self
                    .snaps
                    .values()
                    .find(|s| {
                        hex::decode(&s.sha3_384).is_ok_and(|digest| {
                            use base64::engine::general_purpose::URL_SAFE_NO_PAD;
                            use base64::Engine;
                            format!("{}/", URL_SAFE_NO_PAD.encode(digest)) == key
                        })
                    })
                    .ok_or(StoreError::NotFound)?;
                Ok(Assertion::new(
                    vec![
                        scalar("type", "snap-revision"),
                        scalar("authority-id", "canonical"),
                        scalar("snap-sha3-384", &snap.sha3_384),
                        scalar("developer-id", &snap.publisher_id),
                        scalar("snap-id", &snap.snap_id),
                        scalar("snap-revision", &snap.revision.to_string()),
                        scalar("snap-size", &snap.blob.len().to_string()),
                        scalar("timestamp", "2024-02-01T00:00:00Z"),
                        scalar("sign-key-sha3-384", SIGN_KEY),
                    ],
                    Vec::new(),
                    b"REVISION-SIG".to_vec(),
                ))
            }
        }
    }
}

/// In-memory blob transport recording every requested URL
pub struct StubTransport {
    blobs: HashMap<String, Vec<u8>>,
    pub requests: Mutex<Vec<String>>,
}

impl Transport for StubTransport {
    fn get(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        self.requests.lock().unwrap().push(url.to_string());
        let blob = self
            .blobs
            .get(url)
            .cloned()
            .ok_or_else(|| Error::Download(format!("HTTP 404 from {url}")))?;
        Ok(Box::new(Cursor::new(blob)))
    }
}

impl StubTransport {
    pub fn requested(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|u| *u == url)
            .count()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Applier stub: the delta bytes are the reconstructed blob
pub struct CopyApplier;

impl snapd_seed_glue::DeltaApplier for CopyApplier {
    fn apply(&self, old: &Path, delta: &Path, new: &Path) -> Result<()> {
        assert!(old.is_file(), "applier invoked without the old blob");
        std::fs::copy(delta, new)
            .map_err(|e| Error::DeltaApplyFailed(format!("copy failed: {e}")))?;
        Ok(())
    }
}

/// snap CLI stub: validation always passes, `snap known` serves canned
/// model-level assertions
pub struct StubSnapCli {
    pub validations: Mutex<u32>,
}

impl StubSnapCli {
    pub fn new() -> Self {
        Self {
            validations: Mutex::new(0),
        }
    }
}

impl snapd_seed_glue::SnapCli for StubSnapCli {
    fn validate_seed(&self, seed_yaml: &Path) -> Result<()> {
        assert!(seed_yaml.is_file(), "validator ran before the manifest");
        *self.validations.lock().unwrap() += 1;
        Ok(())
    }

    fn known_remote(&self, args: &[String]) -> Result<Vec<u8>> {
        let content = match args[0].as_str() {
            "model" => "type: model\nsign-key-sha3-384: model-sign-key\n\nMODEL-SIG\n",
            "account-key" => "type: account-key\naccount-id: generic\n\nKEY-SIG\n",
            "account" => "type: account\nusername: generic\n\nACCOUNT-SIG\n",
            other => panic!("unexpected snap known type {other}"),
        };
        Ok(content.as_bytes().to_vec())
    }
}

/// Build a consistent (store, transport) pair from a catalog
pub fn fixture(snaps: Vec<CatalogSnap>) -> (Arc<StubStore>, Arc<StubTransport>) {
    let mut blobs = HashMap::new();
    for snap in &snaps {
        blobs.insert(snap.blob_url(), snap.blob.clone());
        for (from, bytes) in &snap.deltas {
            blobs.insert(snap.delta_url(*from), bytes.clone());
        }
    }
    let store = Arc::new(StubStore {
        snaps: snaps
            .into_iter()
            .map(|snap| (snap.name.clone(), snap))
            .collect(),
    });
    let transport = Arc::new(StubTransport {
        blobs,
        requests: Mutex::new(Vec::new()),
    });
    (store, transport)
}

/// The standard catalog most scenarios share
pub fn base_catalog() -> Vec<CatalogSnap> {
    vec![
        CatalogSnap::new("snapd", 20000),
        CatalogSnap::new("bare", 5),
        CatalogSnap::new("core22", 1380),
        CatalogSnap::new("hello", 42).base("core22"),
        CatalogSnap::new("htop", 3600).base("core22"),
        CatalogSnap::new("btop", 500).base("core22"),
    ]
}
