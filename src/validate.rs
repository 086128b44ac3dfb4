// src/validate.rs

//! Seed validation and model-level assertions via the snap CLI
//!
//! The finished seed is checked by `snap debug validate-seed`, and the
//! three model-level assertions (`model`, `account-key`, `account`) are
//! fetched with `snap known --remote` when missing. Both sit behind the
//! [`SnapCli`] trait so tests can stub the binary.

use crate::error::{Error, Result};
use crate::layout::SeedLayout;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::debug;

const MODEL: &str = "generic-classic";
const BRAND: &str = "generic";
const SERIES: &str = "16";

/// The two snap CLI operations the engine depends on
pub trait SnapCli {
    /// `snap debug validate-seed <seed.yaml>`
    fn validate_seed(&self, seed_yaml: &Path) -> Result<()>;

    /// `snap known --remote <type> <key>=<value>...`, returning the raw
    /// assertion bytes
    fn known_remote(&self, args: &[String]) -> Result<Vec<u8>>;
}

impl<T: SnapCli + ?Sized> SnapCli for std::sync::Arc<T> {
    fn validate_seed(&self, seed_yaml: &Path) -> Result<()> {
        (**self).validate_seed(seed_yaml)
    }

    fn known_remote(&self, args: &[String]) -> Result<Vec<u8>> {
        (**self).known_remote(args)
    }
}

/// Runs the real `snap` binary
#[derive(Debug, Default)]
pub struct SnapCommand;

impl SnapCli for SnapCommand {
    fn validate_seed(&self, seed_yaml: &Path) -> Result<()> {
        let output = Command::new("snap")
            .args(["debug", "validate-seed"])
            .arg(seed_yaml)
            .output()
            .map_err(|e| Error::CommandFailed(format!("failed to run snap: {e}")))?;

        if !output.status.success() {
            return Err(Error::ValidationFailed(format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        debug!("Seed validation successful");
        Ok(())
    }

    fn known_remote(&self, args: &[String]) -> Result<Vec<u8>> {
        let output = Command::new("snap")
            .args(["known", "--remote"])
            .args(args)
            .output()
            .map_err(|e| Error::CommandFailed(format!("failed to run snap: {e}")))?;

        if !output.status.success() {
            return Err(Error::CommandFailed(format!(
                "snap known --remote {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(output.stdout)
    }
}

/// Make sure the model-level assertions exist in the seed.
///
/// Each fetch key is derived from the previous file: the model assertion
/// names the signing key, the account-key assertion names the account.
pub fn ensure_assertions(layout: &SeedLayout, cli: &dyn SnapCli) -> Result<()> {
    let model_path = layout.model_assertion_path("model");
    if !model_path.exists() {
        let output = cli.known_remote(&[
            "model".to_string(),
            format!("series={SERIES}"),
            format!("model={MODEL}"),
            format!("brand-id={BRAND}"),
        ])?;
        write_assertion_file(&model_path, &output)?;
        debug!("Fetched and saved model assertion to {}", model_path.display());
    }

    let account_key_path = layout.model_assertion_path("account-key");
    if !account_key_path.exists() {
        let sign_key = header_value_in_file(&model_path, "sign-key-sha3-384:")?;
        let output = cli.known_remote(&[
            "account-key".to_string(),
            format!("public-key-sha3-384={sign_key}"),
        ])?;
        write_assertion_file(&account_key_path, &output)?;
        debug!(
            "Fetched and saved account-key assertion to {}",
            account_key_path.display()
        );
    }

    let account_path = layout.model_assertion_path("account");
    if !account_path.exists() {
        let account_id = header_value_in_file(&account_key_path, "account-id:")?;
        let output = cli.known_remote(&[
            "account".to_string(),
            format!("account-id={account_id}"),
        ])?;
        write_assertion_file(&account_path, &output)?;
        debug!(
            "Fetched and saved account assertion to {}",
            account_path.display()
        );
    }

    Ok(())
}

fn write_assertion_file(path: &Path, content: &[u8]) -> Result<()> {
    fs::write(path, content)
        .map_err(|e| Error::IoError(format!("failed to write {}: {e}", path.display())))
}

/// Pull a header value out of an assertion file by line prefix.
///
/// Some tooling emits these values base64-wrapped; a value that decodes to
/// printable ASCII is used in decoded form.
fn header_value_in_file(path: &Path, prefix: &str) -> Result<String> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("failed to read {}: {e}", path.display())))?;

    for line in content.lines() {
        if !line.contains(prefix) {
            continue;
        }
        let Some((_, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if let Ok(decoded) = STANDARD.decode(value) {
            if decoded.iter().all(|b| b.is_ascii_graphic()) {
                if let Ok(decoded) = String::from_utf8(decoded) {
                    return Ok(decoded);
                }
            }
        }
        return Ok(value.to_string());
    }

    Err(Error::CommandFailed(format!(
        "pattern {prefix} not found in {}",
        path.display()
    )))
}
