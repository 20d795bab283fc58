//! `shadercanvas index`: the directory listing an `array` entry can point at.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use canvas::{list_images, INDEX_FILE_NAME};
use serde_json::json;

/// Process exit status for an unreadable directory (a client error).
pub const INVALID_DIRECTORY_EXIT: u8 = 2;

pub enum IndexOutcome {
    Listed,
    InvalidDirectory,
}

pub fn run_index(dir: &Path, write: bool) -> Result<IndexOutcome> {
    let names = match list_images(dir) {
        Ok(names) => names,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "cannot list directory");
            println!("{}", json!({ "error": "Invalid directory" }));
            return Ok(IndexOutcome::InvalidDirectory);
        }
    };

    let listing = serde_json::to_string(&names)?;
    println!("{listing}");

    if write {
        let target = dir.join(INDEX_FILE_NAME);
        fs::write(&target, &listing)
            .with_context(|| format!("failed to write {}", target.display()))?;
        tracing::info!(path = %target.display(), images = names.len(), "index written");
    }
    Ok(IndexOutcome::Listed)
}
