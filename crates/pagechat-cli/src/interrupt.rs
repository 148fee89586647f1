//! Ctrl+C handling.
//!
//! The first Ctrl+C cancels the registered token so the running turn can
//! stop cleanly; a second one exits immediately.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static TOKEN: OnceLock<CancellationToken> = OnceLock::new();

#[derive(Debug)]
pub struct InterruptedError;

impl std::fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interrupted")
    }
}

impl std::error::Error for InterruptedError {}

/// Installs the Ctrl+C handler and returns the token it cancels.
pub fn init() -> Result<CancellationToken> {
    let token = TOKEN.get_or_init(CancellationToken::new).clone();
    ctrlc::set_handler(trigger_ctrl_c).context("set Ctrl+C handler")?;
    Ok(token)
}

fn trigger_ctrl_c() {
    if INTERRUPTED.swap(true, Ordering::SeqCst) {
        std::process::exit(130);
    }
    if let Some(token) = TOKEN.get() {
        token.cancel();
    }
}
