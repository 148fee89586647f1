//! Extract command handler.

use std::path::Path;

use anyhow::{Context, Result};
use pagechat_core::config::Config;
use pagechat_core::extract::extract_with;

use crate::cli::input;

pub fn run(page: &Path, config: &Config) -> Result<()> {
    let document = input::read_document(page)?;
    let snapshot = extract_with(&document, &config.extract_options());
    let json = serde_json::to_string_pretty(&snapshot).context("serialize snapshot")?;
    println!("{json}");
    Ok(())
}
