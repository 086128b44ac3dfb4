// src/delta.rs

//! Delta application via xdelta3
//!
//! A delta turns an existing revision of a snap blob into a newer one.
//! Application is delegated to the `xdelta3` binary behind a trait so the
//! engine can be tested without it; any failure is non-fatal and the
//! caller falls back to a full download.

use crate::error::{Error, Result};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Turns (old blob, delta) into the new blob
pub trait DeltaApplier {
    fn apply(&self, old: &Path, delta: &Path, new: &Path) -> Result<()>;
}

/// Shells out to `xdelta3 -d -s <old> <delta> <new>`
#[derive(Debug, Default)]
pub struct Xdelta3Applier;

impl DeltaApplier for Xdelta3Applier {
    fn apply(&self, old: &Path, delta: &Path, new: &Path) -> Result<()> {
        debug!(
            "Applying delta from {} to {} using {}",
            old.display(),
            new.display(),
            delta.display()
        );

        let output = Command::new("xdelta3")
            .arg("-d")
            .arg("-s")
            .arg(old)
            .arg(delta)
            .arg(new)
            .output()
            .map_err(|e| {
                Error::CommandFailed(format!("failed to run xdelta3: {e}. Is xdelta3 installed?"))
            })?;

        if !output.status.success() {
            return Err(Error::DeltaApplyFailed(format!(
                "xdelta3 exited with {}: {}{}",
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }
}
