// src/store/remote.rs

//! HTTP client for the snap store v2 API
//!
//! Implements [`SnapActionClient`] over `POST /v2/snaps/refresh` and
//! [`AssertionFetcher`] over `GET /v2/assertions/<type>/<key>`. Store
//! error conditions arrive as message text and are classified into
//! [`StoreError`] right here; nothing above this layer inspects strings.

use crate::assertions::{self, Assertion};
use crate::error::{Error, Result};
use crate::store::{
    ActionOp, AssertionFetcher, AssertionKind, CurrentSnap, DeltaInfo, SnapAction,
    SnapActionClient, SnapActionResult, SnapInfo, StoreError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::debug;

const DEFAULT_STORE_URL: &str = "https://api.snapcraft.io";
const SERIES: &str = "16";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Snap payload fields the engine needs back from an action
const ACTION_FIELDS: &[&str] = &[
    "name",
    "snap-id",
    "revision",
    "version",
    "base",
    "publisher",
    "download",
    "plugs",
];

/// reqwest-backed store client
pub struct RemoteStore {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl RemoteStore {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_STORE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Download(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

// Wire shapes for /v2/snaps/refresh

#[derive(Serialize)]
struct ActionRequest<'a> {
    context: Vec<ContextEntry<'a>>,
    actions: Vec<ActionEntry<'a>>,
    fields: &'static [&'static str],
}

#[derive(Serialize)]
struct ContextEntry<'a> {
    #[serde(rename = "instance-key")]
    instance_key: &'a str,
    #[serde(rename = "snap-id")]
    snap_id: &'a str,
    revision: u64,
    #[serde(rename = "tracking-channel")]
    tracking_channel: &'a str,
}

#[derive(Serialize)]
struct ActionEntry<'a> {
    action: &'static str,
    #[serde(rename = "instance-key")]
    instance_key: &'a str,
    name: &'a str,
    #[serde(rename = "snap-id", skip_serializing_if = "Option::is_none")]
    snap_id: Option<&'a str>,
    channel: &'a str,
}

#[derive(Deserialize)]
struct ActionResponse {
    #[serde(default)]
    results: Vec<ActionResult>,
    #[serde(default, rename = "error-list")]
    error_list: Vec<ApiError>,
}

#[derive(Deserialize)]
struct ActionResult {
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(default)]
    snap: Option<SnapPayload>,
    #[serde(default, rename = "effective-channel")]
    effective_channel: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    #[serde(default)]
    code: String,
    message: String,
}

#[derive(Deserialize)]
struct SnapPayload {
    name: String,
    #[serde(rename = "snap-id")]
    snap_id: String,
    revision: u64,
    #[serde(default)]
    version: String,
    #[serde(default)]
    base: Option<String>,
    publisher: Publisher,
    download: Download,
    #[serde(default)]
    plugs: HashMap<String, PlugDef>,
}

#[derive(Deserialize)]
struct Publisher {
    id: String,
    #[serde(default)]
    username: String,
}

#[derive(Deserialize)]
struct Download {
    url: String,
    size: u64,
    #[serde(rename = "sha3-384")]
    sha3_384: String,
    #[serde(default)]
    deltas: Vec<DeltaPayload>,
}

#[derive(Deserialize)]
struct DeltaPayload {
    format: String,
    source: u64,
    target: u64,
    url: String,
    size: u64,
    #[serde(rename = "sha3-384")]
    sha3_384: String,
}

#[derive(Deserialize)]
struct PlugDef {
    #[serde(default)]
    interface: Option<String>,
    #[serde(default, rename = "default-provider")]
    default_provider: Option<String>,
}

impl SnapPayload {
    fn into_result(self, effective_channel: Option<String>) -> SnapActionResult {
        let mut content_providers = BTreeMap::new();
        for (plug_name, plug) in &self.plugs {
            if plug.interface.as_deref() != Some("content") {
                continue;
            }
            let Some(provider) = plug.default_provider.as_deref() else {
                continue;
            };
            if provider.is_empty() {
                continue;
            }
            // A default provider may pin a slot as "snap:slot"
            let provider = provider.split(':').next().unwrap_or(provider);
            content_providers.insert(plug_name.clone(), provider.to_string());
        }

        let deltas = self
            .download
            .deltas
            .iter()
            .map(|delta| DeltaInfo {
                from_revision: delta.source,
                to_revision: delta.target,
                format: delta.format.clone(),
                download_url: delta.url.clone(),
                size: delta.size,
                sha3_384: delta.sha3_384.clone(),
            })
            .collect();

        debug!(
            "Fetched snap info for {}: snap-id {}, revision {} (channel {})",
            self.name,
            self.snap_id,
            self.revision,
            effective_channel.as_deref().unwrap_or("-")
        );

        SnapActionResult {
            info: SnapInfo {
                name: self.name,
                snap_id: self.snap_id,
                revision: self.revision,
                version: self.version,
                base: self.base,
                publisher_id: self.publisher.id,
                publisher_username: self.publisher.username,
                size: self.download.size,
                sha3_384: self.download.sha3_384,
                download_url: self.download.url,
                content_providers,
            },
            deltas,
        }
    }
}

impl SnapActionClient for RemoteStore {
    fn action(
        &self,
        include: &[CurrentSnap],
        actions: &[SnapAction],
    ) -> std::result::Result<Vec<SnapActionResult>, StoreError> {
        let context: Vec<ContextEntry> = include
            .iter()
            .map(|snap| ContextEntry {
                instance_key: &snap.name,
                snap_id: &snap.snap_id,
                revision: snap.revision,
                tracking_channel: &snap.channel,
            })
            .collect();
        let action_entries: Vec<ActionEntry> = actions
            .iter()
            .map(|action| ActionEntry {
                action: action.op.as_str(),
                instance_key: &action.instance_name,
                name: &action.instance_name,
                snap_id: match action.op {
                    ActionOp::Refresh => action.snap_id.as_deref(),
                    ActionOp::Install => None,
                },
                channel: &action.channel,
            })
            .collect();
        let request = ActionRequest {
            context,
            actions: action_entries,
            fields: ACTION_FIELDS,
        };

        let url = format!("{}/v2/snaps/refresh", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Snap-Device-Series", SERIES)
            .json(&request)
            .send()
            .map_err(|e| StoreError::Unavailable(format!("snap action failed: {e}")))?;

        if !response.status().is_success() {
            return Err(StoreError::Unavailable(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let parsed: ActionResponse = response
            .json()
            .map_err(|e| StoreError::Unavailable(format!("malformed action response: {e}")))?;

        if parsed.results.is_empty() {
            if let Some(error) = parsed.error_list.first() {
                return Err(StoreError::classify(&error.message));
            }
            return Err(StoreError::Unavailable("empty action response".to_string()));
        }

        let mut results = Vec::with_capacity(parsed.results.len());
        for result in parsed.results {
            if let Some(error) = result.error {
                debug!("Store error ({}): {}", error.code, error.message);
                return Err(StoreError::classify(&error.message));
            }
            let Some(snap) = result.snap else {
                return Err(StoreError::Unavailable(
                    "action result without snap payload".to_string(),
                ));
            };
            results.push(snap.into_result(result.effective_channel));
        }
        Ok(results)
    }
}

impl AssertionFetcher for RemoteStore {
    fn assertion(
        &self,
        kind: AssertionKind,
        primary_key: &[&str],
    ) -> std::result::Result<Assertion, StoreError> {
        let url = format!(
            "{}/v2/assertions/{}/{}",
            self.base_url,
            kind.as_str(),
            primary_key.join("/")
        );
        debug!("Fetching {} assertion from {}", kind, url);

        let response = self
            .client
            .get(&url)
            .header("Accept", "application/x.ubuntu.assertion")
            .send()
            .map_err(|e| StoreError::Unavailable(format!("assertion fetch failed: {e}")))?;

        match response.status().as_u16() {
            404 => return Err(StoreError::NotFound),
            status if !(200..300).contains(&status) => {
                return Err(StoreError::Unavailable(format!("HTTP {status} from {url}")))
            }
            _ => {}
        }

        let bytes = response
            .bytes()
            .map_err(|e| StoreError::Unavailable(format!("failed to read assertion: {e}")))?;
        assertions::parse(&bytes).map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}
