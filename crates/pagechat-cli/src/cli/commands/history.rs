//! History command handlers.

use anyhow::{Context, Result};
use pagechat_core::history::{self, FileStore};

pub fn show(url: &str) -> Result<()> {
    let store = FileStore::open_default()?;
    let messages = history::load_messages(&store, url)
        .with_context(|| format!("load history for {url}"))?;
    if messages.is_empty() {
        println!("No messages stored for {url}.");
    } else {
        let json = serde_json::to_string_pretty(&messages).context("serialize messages")?;
        println!("{json}");
    }
    Ok(())
}

pub fn clear(url: &str) -> Result<()> {
    let store = FileStore::open_default()?;
    history::clear_messages(&store, url).with_context(|| format!("clear history for {url}"))?;
    println!("Cleared history for {url}");
    Ok(())
}
