//! Render command handler.

use std::path::Path;

use anyhow::Result;
use pagechat_core::config::Config;
use pagechat_core::{RenderMode, render_with};

use crate::cli::input;

pub fn run(file: Option<&Path>, legacy: bool, config: &Config) -> Result<()> {
    let markdown = input::read_source(file)?;
    let mode = if legacy {
        RenderMode::Legacy
    } else {
        config.render.mode
    };
    println!("{}", render_with(&markdown, mode));
    Ok(())
}
