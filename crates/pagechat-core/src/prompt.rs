//! System prompt assembly.

use anyhow::{Context, Result};
use minijinja::{Environment, UndefinedBehavior};

use crate::extract::PageSnapshot;

/// Prompt template wrapping the page snapshot (`MiniJinja`).
pub const SYSTEM_PROMPT_TEMPLATE: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/system_prompt.md"
));

/// Renders the system prompt for a page snapshot.
pub fn system_prompt(page: &PageSnapshot) -> Result<String> {
    render_prompt_template(SYSTEM_PROMPT_TEMPLATE, page)
}

fn render_prompt_template(template: &str, page: &PageSnapshot) -> Result<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_template("system_prompt", template)
        .context("Failed to parse system prompt template")?;

    let output = env
        .get_template("system_prompt")
        .context("Failed to load system prompt template")?
        .render(page)
        .context("Failed to render system prompt")?;

    Ok(output.replace("\r\n", "\n").trim().to_string())
}
