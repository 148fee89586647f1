//! Markdown to HTML for assistant responses.
//!
//! Rendering is a pure function of the whole response buffer. The caller
//! re-renders after every delta, so a half-streamed construct (an unclosed
//! fence, a dangling `**`) stays literal until its closing half arrives.
//!
//! Two pipelines are available:
//! - [`RenderMode::Protected`] (default): code is split out before any inline
//!   markup is applied, blocks are parsed line by line and inline markup is
//!   handled by a single left-to-right scanner.
//! - [`RenderMode::Legacy`]: an ordered chain of regex rewrites over the whole
//!   string. Later rewrites can reach into code spans emitted by earlier ones.

mod inline;
mod legacy;
mod protected;

use serde::{Deserialize, Serialize};

/// Schemes a rendered link may point at. Scheme-less targets are allowed too.
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "mailto"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Legacy,
    #[default]
    Protected,
}

/// Renders `text` with the default mode.
pub fn render(text: &str) -> String {
    render_with(text, RenderMode::default())
}

pub fn render_with(text: &str, mode: RenderMode) -> String {
    if text.is_empty() {
        return String::new();
    }
    match mode {
        RenderMode::Legacy => legacy::render(text),
        RenderMode::Protected => protected::render(text),
    }
}

/// Escapes `&`, `<` and `>`. Applied to the raw input before any markup.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

/// Returns the attribute-safe form of a link target, or `None` when the
/// target must not become an anchor.
///
/// `target` is already HTML-escaped, so entity tricks cannot smuggle a colon
/// past the scheme check.
pub fn safe_href(target: &str) -> Option<String> {
    if target.is_empty()
        || target
            .chars()
            .any(|c| c.is_control() || c.is_whitespace())
    {
        return None;
    }
    if let Some(end) = target.find([':', '/', '?', '#'])
        && target[end..].starts_with(':')
    {
        let scheme = &target[..end];
        if !ALLOWED_SCHEMES
            .iter()
            .any(|allowed| scheme.eq_ignore_ascii_case(allowed))
        {
            return None;
        }
    }
    Some(target.replace('"', "&quot;"))
}

fn anchor(href: &str, label: &str) -> String {
    format!(r#"<a href="{href}" target="_blank" rel="noopener noreferrer">{label}</a>"#)
}
