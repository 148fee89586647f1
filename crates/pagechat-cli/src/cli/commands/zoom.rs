//! Zoom command handlers.

use anyhow::Result;
use pagechat_core::history::FileStore;
use pagechat_core::preferences::{Preferences, ZoomLevel};

pub fn show() -> Result<()> {
    let store = FileStore::open_default()?;
    println!("{}", Preferences::load(&store)?.zoom);
    Ok(())
}

pub fn step(larger: bool) -> Result<()> {
    update(|zoom| if larger { zoom.zoom_in() } else { zoom.zoom_out() })
}

pub fn set(level: &str) -> Result<()> {
    let level: ZoomLevel = level.parse()?;
    update(|_| level)
}

fn update(change: impl FnOnce(ZoomLevel) -> ZoomLevel) -> Result<()> {
    let store = FileStore::open_default()?;
    let mut prefs = Preferences::load(&store)?;
    prefs.zoom = change(prefs.zoom);
    prefs.save(&store)?;
    println!("{}", prefs.zoom);
    Ok(())
}
