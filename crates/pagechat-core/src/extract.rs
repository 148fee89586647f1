//! Page text extraction cascade.
//!
//! Turns a serialized document into a bounded plain-text [`PageSnapshot`].
//! Strategies run in order and the first one whose output passes its
//! acceptance predicate wins. Each strategy is fallible on its own; a failed
//! stage is logged and the cascade moves on, so `extract` itself never fails.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dom::{Document, Element, Node};

/// Upper bound on snapshot text, in characters.
pub const MAX_TEXT_CHARS: usize = 15_000;
/// Appended to text that was clamped to [`MAX_TEXT_CHARS`].
pub const TRUNCATION_MARKER: &str = "...";

pub const NO_CONTENT_TEXT: &str = "No readable content found on this page.";
pub const ERROR_TEXT: &str = "Error extracting page content.";
pub const LOADING_TEXT: &str = "Page loading...";
pub const UNTITLED: &str = "Untitled";
pub const ERROR_TITLE: &str = "Error";
pub const BLANK_URL: &str = "about:blank";

/// Node visits allowed per stage before it gives up on a pathological tree.
pub const DEFAULT_NODE_BUDGET: usize = 200_000;

const DENY_LIST: &[&str] = &[
    "script", "style", "nav", "header", "footer", "aside", "noscript",
];

const SAMPLED_TAGS: &[&str] = &[
    "p", "h1", "h2", "h3", "h4", "h5", "h6", "div", "span", "article", "section", "main",
];

/// Bounded plain-text view of a page, attached to outgoing prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub text: String,
    pub title: String,
    pub url: String,
}

/// Tunables for a single extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    pub max_chars: usize,
    pub node_budget: usize,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_chars: MAX_TEXT_CHARS,
            node_budget: DEFAULT_NODE_BUDGET,
        }
    }
}

/// Why a stage (or the whole cascade) failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    /// A stage failed or was skipped; the cascade continues.
    Degraded,
    /// Every stage failed.
    Exhausted,
}

impl fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionErrorKind::Degraded => write!(f, "degraded"),
            ExtractionErrorKind::Exhausted => write!(f, "exhausted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionError {
    pub kind: ExtractionErrorKind,
    pub stage: &'static str,
    pub message: String,
}

impl ExtractionError {
    pub fn degraded(stage: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ExtractionErrorKind::Degraded,
            stage,
            message: message.into(),
        }
    }

    fn exhausted(last: &ExtractionError) -> Self {
        Self {
            kind: ExtractionErrorKind::Exhausted,
            stage: last.stage,
            message: format!("all extraction stages failed (last: {})", last.message),
        }
    }
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.stage, self.kind, self.message)
    }
}

impl std::error::Error for ExtractionError {}

pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;

/// One step of the cascade.
pub trait ExtractionStrategy {
    fn name(&self) -> &'static str;

    /// Produces candidate text, `None` when the stage found nothing.
    ///
    /// # Errors
    /// Returns a degraded error when the stage could not complete.
    fn extract(&self, body: &Element, options: &ExtractOptions) -> ExtractionResult<Option<String>>;

    /// Whether the candidate is good enough to stop the cascade.
    fn accepts(&self, text: &str) -> bool;
}

/// Stage 1: visible text leaves outside boilerplate containers.
#[derive(Debug, Clone, Copy)]
pub struct StructuralWalk {
    pub min_chars: usize,
}

/// Stage 2: text of block/text-bearing elements.
#[derive(Debug, Clone, Copy)]
pub struct ElementSampling {
    pub min_chars: usize,
}

/// Stage 3: whatever text the body has.
#[derive(Debug, Clone, Copy)]
pub struct RawFallback;

impl ExtractionStrategy for StructuralWalk {
    fn name(&self) -> &'static str {
        "structural_walk"
    }

    fn extract(
        &self,
        body: &Element,
        options: &ExtractOptions,
    ) -> ExtractionResult<Option<String>> {
        let mut budget = Budget::new(self.name(), options.node_budget);
        let mut texts = Vec::new();
        budget.charge()?;
        let mut stack: Vec<Frame<'_>> = Vec::new();
        push_children(&mut stack, body, is_denied(body), body.is_hidden());

        while let Some(frame) = stack.pop() {
            budget.charge()?;
            match frame.node {
                Node::Element(element) => {
                    let denied = frame.denied || is_denied(element);
                    let hidden = frame.hidden || element.is_hidden();
                    push_children(&mut stack, element, denied, hidden);
                }
                Node::Text { text } => {
                    if frame.denied || frame.hidden {
                        continue;
                    }
                    let trimmed = text.trim();
                    if trimmed.chars().count() >= 2 {
                        texts.push(trimmed);
                    }
                }
                Node::Comment { .. } => {}
            }
        }

        Ok(non_empty(normalize_whitespace(&texts.join(" "))))
    }

    fn accepts(&self, text: &str) -> bool {
        text.chars().count() >= self.min_chars
    }
}

impl ExtractionStrategy for ElementSampling {
    fn name(&self) -> &'static str {
        "element_sampling"
    }

    fn extract(
        &self,
        body: &Element,
        options: &ExtractOptions,
    ) -> ExtractionResult<Option<String>> {
        let mut budget = Budget::new(self.name(), options.node_budget);
        let mut texts = Vec::new();
        let mut stack: Vec<(&Element, bool, bool)> = vec![(body, false, false)];

        while let Some((element, parent_denied, parent_hidden)) = stack.pop() {
            budget.charge()?;
            let denied = parent_denied || is_denied(element);
            let hidden = parent_hidden || element.is_hidden();

            if !denied && !hidden && is_sampled(element) {
                let content = bounded_text_content(element, &mut budget)?;
                let trimmed = content.trim();
                if trimmed.chars().count() > 10 {
                    texts.push(trimmed.to_string());
                }
            }

            for child in element.children.iter().rev() {
                if let Node::Element(child) = child {
                    stack.push((child, denied, hidden));
                }
            }
        }

        Ok(non_empty(normalize_whitespace(&texts.join(" "))))
    }

    fn accepts(&self, text: &str) -> bool {
        text.chars().count() >= self.min_chars
    }
}

impl ExtractionStrategy for RawFallback {
    fn name(&self) -> &'static str {
        "raw_fallback"
    }

    fn extract(
        &self,
        body: &Element,
        options: &ExtractOptions,
    ) -> ExtractionResult<Option<String>> {
        // Layout-rendered text is authoritative when present, even if empty:
        // the host saw nothing visible.
        if let Some(rendered) = &body.rendered_text {
            return Ok(Some(rendered.clone()));
        }
        let mut budget = Budget::new(self.name(), options.node_budget);
        bounded_text_content(body, &mut budget).map(Some)
    }

    fn accepts(&self, _text: &str) -> bool {
        true
    }
}

/// The default cascade: structural walk, element sampling, raw fallback.
pub fn default_strategies() -> Vec<Box<dyn ExtractionStrategy + Send + Sync>> {
    vec![
        Box::new(StructuralWalk { min_chars: 50 }),
        Box::new(ElementSampling { min_chars: 20 }),
        Box::new(RawFallback),
    ]
}

/// Extracts a snapshot with default options.
pub fn extract(document: &Document) -> PageSnapshot {
    extract_with(document, &ExtractOptions::default())
}

/// Extracts a snapshot. Never fails; degraded input yields sentinel text.
pub fn extract_with(document: &Document, options: &ExtractOptions) -> PageSnapshot {
    let title = non_blank(document.title.as_deref());
    let url = non_blank(document.url.as_deref())
        .unwrap_or(BLANK_URL)
        .to_string();

    let Some(body) = &document.body else {
        debug!("document has no body yet");
        return PageSnapshot {
            text: title.unwrap_or(LOADING_TEXT).to_string(),
            title: title.unwrap_or(UNTITLED).to_string(),
            url,
        };
    };

    match run_cascade(body, &default_strategies(), options) {
        Ok(text) => PageSnapshot {
            text: finalize_text(&text, options.max_chars),
            title: title.unwrap_or(UNTITLED).to_string(),
            url,
        },
        Err(err) => {
            warn!(error = %err, "text extraction failed");
            PageSnapshot {
                text: ERROR_TEXT.to_string(),
                title: title.unwrap_or(ERROR_TITLE).to_string(),
                url,
            }
        }
    }
}

/// Runs strategies in order, short-circuiting on the first accepted output.
///
/// When nothing is accepted the last produced candidate is returned. Fails
/// only when no stage produced anything and at least one stage failed.
///
/// # Errors
/// Returns [`ExtractionErrorKind::Exhausted`] when every productive stage failed.
pub fn run_cascade(
    body: &Element,
    strategies: &[Box<dyn ExtractionStrategy + Send + Sync>],
    options: &ExtractOptions,
) -> ExtractionResult<String> {
    let mut fallback: Option<String> = None;
    let mut last_error: Option<ExtractionError> = None;

    for strategy in strategies {
        match strategy.extract(body, options) {
            Ok(Some(text)) => {
                if strategy.accepts(&text) {
                    debug!(
                        stage = strategy.name(),
                        chars = text.chars().count(),
                        "stage accepted"
                    );
                    return Ok(text);
                }
                debug!(
                    stage = strategy.name(),
                    chars = text.chars().count(),
                    "stage output too short"
                );
                fallback = Some(text);
            }
            Ok(None) => debug!(stage = strategy.name(), "stage found no text"),
            Err(err) => {
                warn!(stage = strategy.name(), error = %err, "extraction stage degraded");
                last_error = Some(err);
            }
        }
    }

    match (fallback, last_error) {
        (Some(text), _) => Ok(text),
        (None, Some(err)) => Err(ExtractionError::exhausted(&err)),
        (None, None) => Ok(String::new()),
    }
}

/// Clamps to `max_chars` (appending the marker) and substitutes the
/// no-content sentinel for blank text.
pub fn finalize_text(text: &str, max_chars: usize) -> String {
    if text.trim().is_empty() {
        return NO_CONTENT_TEXT.to_string();
    }
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

/// Collapses whitespace runs to single spaces and trims.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_denied(element: &Element) -> bool {
    DENY_LIST.iter().any(|tag| element.is_tag(tag))
}

fn is_sampled(element: &Element) -> bool {
    SAMPLED_TAGS.iter().any(|tag| element.is_tag(tag))
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn bounded_text_content(element: &Element, budget: &mut Budget) -> ExtractionResult<String> {
    element.try_text_content(|| budget.charge())
}

struct Budget {
    stage: &'static str,
    remaining: usize,
}

impl Budget {
    fn new(stage: &'static str, limit: usize) -> Self {
        Self {
            stage,
            remaining: limit,
        }
    }

    fn charge(&mut self) -> ExtractionResult<()> {
        if self.remaining == 0 {
            return Err(ExtractionError::degraded(
                self.stage,
                "node budget exceeded",
            ));
        }
        self.remaining -= 1;
        Ok(())
    }
}

struct Frame<'a> {
    node: &'a Node,
    denied: bool,
    hidden: bool,
}

fn push_children<'a>(stack: &mut Vec<Frame<'a>>, element: &'a Element, denied: bool, hidden: bool) {
    for node in element.children.iter().rev() {
        stack.push(Frame {
            node,
            denied,
            hidden,
        });
    }
}
