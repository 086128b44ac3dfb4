// src/channel.rs

//! Channel handling and snap request parsing
//!
//! A channel is a `track/risk[/branch]` string. Requests on the command
//! line take the form `<name>[=<channel>]`; when no channel is given the
//! default is `latest/stable/ubuntu-<VERSION_ID>` with `latest/stable` as
//! the fallback the resolver retries on.

use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Channel the resolver retries on when the preferred one has no revision
pub const FALLBACK_CHANNEL: &str = "latest/stable";

/// One user-requested snap, with an optional pinned channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapRequest {
    pub name: String,
    pub channel: Option<String>,
}

impl SnapRequest {
    /// Parse a `<name>[=<channel>]` argument
    pub fn parse(arg: &str) -> Self {
        match arg.split_once('=') {
            Some((name, channel)) => Self {
                name: name.to_string(),
                channel: Some(channel.to_string()),
            },
            None => Self {
                name: arg.to_string(),
                channel: None,
            },
        }
    }
}

/// Build the default channel from the host's os-release
pub fn default_channel() -> Result<String> {
    let version_id = version_id_from_os_release(Path::new("/etc/os-release"))?;
    Ok(format!("latest/stable/ubuntu-{}", version_id))
}

/// Extract `VERSION_ID` from an os-release file
pub fn version_id_from_os_release(path: &Path) -> Result<String> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("failed to read {}: {e}", path.display())))?;

    for line in content.lines() {
        if let Some(value) = line.strip_prefix("VERSION_ID=") {
            let version_id = value.trim_matches('"');
            debug!("Detected VERSION_ID {}", version_id);
            return Ok(version_id.to_string());
        }
    }

    Err(Error::IoError(format!(
        "VERSION_ID not found in {}",
        path.display()
    )))
}

/// Strip the implied `latest/` track for the manifest
pub fn normalize(channel: &str) -> &str {
    channel.strip_prefix("latest/").unwrap_or(channel)
}
