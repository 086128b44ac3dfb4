// src/download.rs

//! Checksum-verified blob downloads with retry support
//!
//! Blobs stream to a `.partial` staging file while the SHA3-384 digest is
//! computed on the fly; only a verified blob is renamed into place. Full
//! snaps and deltas carry separate retry policies: the full policy retries
//! back-to-back, the delta policy backs off exponentially from one second.
//! Both are explicit [`RetryPolicy`] values callers can override.

use crate::error::{Error, Result};
use crate::progress::ByteMeter;
use sha3::{Digest, Sha3_384};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Connection timeout for the HTTP transport (30 seconds)
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Buffer size for streaming downloads (8 KB)
const STREAM_BUFFER_SIZE: usize = 8192;

/// Raw byte transfer, separated from retry/verification logic so tests can
/// serve blobs from memory
pub trait Transport: Send + Sync {
    fn get(&self, url: &str) -> Result<Box<dyn Read + Send>>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn get(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        (**self).get(url)
    }
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::Download(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Box<dyn Read + Send>> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::Download(format!("failed to fetch {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Download(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }
        Ok(Box::new(response))
    }
}

/// Sleep schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    Fixed(Duration),
    /// Starts at the given duration and doubles each attempt
    Exponential(Duration),
}

impl Backoff {
    /// Delay after the given 1-based failed attempt
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match self {
            Backoff::None => None,
            Backoff::Fixed(duration) => Some(*duration),
            Backoff::Exponential(initial) => {
                Some(*initial * 2u32.saturating_pow(attempt.saturating_sub(1)))
            }
        }
    }
}

/// Attempt budget plus sleep schedule
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Full snaps retry back-to-back
    pub fn full_default() -> Self {
        Self {
            attempts: 5,
            backoff: Backoff::None,
        }
    }

    /// Deltas back off exponentially from one second
    pub fn delta_default() -> Self {
        Self {
            attempts: 5,
            backoff: Backoff::Exponential(Duration::from_secs(1)),
        }
    }
}

/// Downloads blobs and verifies their SHA3-384 digests
pub struct Downloader {
    transport: Box<dyn Transport>,
    full: RetryPolicy,
    delta: RetryPolicy,
}

impl Downloader {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            full: RetryPolicy::full_default(),
            delta: RetryPolicy::delta_default(),
        }
    }

    pub fn with_policies(
        transport: Box<dyn Transport>,
        full: RetryPolicy,
        delta: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            full,
            delta,
        }
    }

    /// Download a full snap blob
    pub fn download_snap(
        &self,
        url: &str,
        dest: &Path,
        expected_sha3_384: &str,
        meter: &mut ByteMeter,
    ) -> Result<()> {
        self.download(url, dest, expected_sha3_384, self.full, meter)
    }

    /// Download a delta patch
    pub fn download_delta(
        &self,
        url: &str,
        dest: &Path,
        expected_sha3_384: &str,
        meter: &mut ByteMeter,
    ) -> Result<()> {
        self.download(url, dest, expected_sha3_384, self.delta, meter)
    }

    fn download(
        &self,
        url: &str,
        dest: &Path,
        expected: &str,
        policy: RetryPolicy,
        meter: &mut ByteMeter,
    ) -> Result<()> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!("Attempt {} to download {}", attempt, url);
            match self.attempt(url, dest, expected, meter) {
                Ok(()) => {
                    meter.finish();
                    debug!("Downloaded {} to {}", url, dest.display());
                    return Ok(());
                }
                Err(e) => {
                    warn!("Attempt {} to download {} failed: {}", attempt, url, e);
                    if attempt >= policy.attempts {
                        // A digest mismatch stays a digest mismatch; the
                        // blob is untrusted no matter how it got here
                        if matches!(e, Error::ChecksumMismatch { .. }) {
                            return Err(e);
                        }
                        return Err(Error::DownloadFailed {
                            url: url.to_string(),
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                    if let Some(delay) = policy.backoff.delay(attempt) {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
    }

    fn attempt(
        &self,
        url: &str,
        dest: &Path,
        expected: &str,
        meter: &mut ByteMeter,
    ) -> Result<()> {
        let mut reader = self.transport.get(url)?;

        let partial = partial_path(dest);
        let mut file = File::create(&partial)
            .map_err(|e| Error::IoError(format!("failed to create {}: {e}", partial.display())))?;

        let mut hasher = Sha3_384::new();
        let mut buffer = [0u8; STREAM_BUFFER_SIZE];
        loop {
            let n = reader
                .read(&mut buffer)
                .map_err(|e| Error::Download(format!("failed to read response: {e}")))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])
                .map_err(|e| Error::IoError(format!("failed to write downloaded data: {e}")))?;
            hasher.update(&buffer[..n]);
            meter.add(n as u64);
        }
        drop(file);

        let actual = hex::encode(hasher.finalize());
        if !actual.eq_ignore_ascii_case(expected) {
            let _ = fs::remove_file(&partial);
            return Err(Error::ChecksumMismatch {
                path: dest.display().to_string(),
                expected: expected.to_ascii_lowercase(),
                actual,
            });
        }

        fs::rename(&partial, dest).map_err(|e| {
            Error::IoError(format!(
                "failed to move {} to {}: {e}",
                partial.display(),
                dest.display()
            ))
        })?;
        Ok(())
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".partial");
    PathBuf::from(name)
}

/// Stream a file through SHA3-384 and return the lowercase hex digest
pub fn file_sha3_384(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|e| Error::IoError(format!("failed to open {}: {e}", path.display())))?;
    let mut hasher = Sha3_384::new();
    std::io::copy(&mut file, &mut hasher)
        .map_err(|e| Error::IoError(format!("failed to read {}: {e}", path.display())))?;
    Ok(hex::encode(hasher.finalize()))
}
