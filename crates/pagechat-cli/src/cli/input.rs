//! Reading command input from files or stdin.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result};
use pagechat_core::Document;

/// Reads `path`, treating `-` as stdin.
pub fn read_source(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Parses a serialized page.
pub fn read_document(path: &Path) -> Result<Document> {
    let raw = read_source(Some(path))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse page JSON from {}", path.display()))
}
