//! CLI command handlers.

pub mod ask;
pub mod config;
pub mod extract;
pub mod history;
pub mod render;
pub mod zoom;
