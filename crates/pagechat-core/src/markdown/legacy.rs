use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::{anchor, escape_html, safe_href};

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").expect("fence regex"));
static INLINE_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]+)`").expect("inline code regex"));
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-*] (.*)$").expect("bullet regex"));
static ORDINAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\. (.*)$").expect("ordinal regex"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{1,3}) (.*)$").expect("heading regex"));
static STRONG_STAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("strong regex"));
static STRONG_UNDERSCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__(.+?)__").expect("strong regex"));
static EM_STAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").expect("emphasis regex"));
static EM_UNDERSCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_([^_\n]+)_").expect("emphasis regex"));
static STRIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~~(.+?)~~").expect("strikethrough regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("link regex"));
static BLANK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("blank line regex"));

/// Segments starting with one of these are emitted without a `<p>` wrapper.
const BLOCK_PREFIXES: &[&str] = &["<ul>", "<ol>", "<h1>", "<h2>", "<h3>", "<pre>"];

pub(super) fn render(text: &str) -> String {
    let html = escape_html(text);
    let html = FENCE_RE.replace_all(&html, "<pre><code>$1</code></pre>");
    let html = INLINE_CODE_RE.replace_all(&html, "<code>$1</code>");
    let html = wrap_lists(&html);
    let html = HEADING_RE.replace_all(&html, |caps: &Captures| {
        let level = caps[1].len();
        format!("<h{level}>{}</h{level}>", &caps[2])
    });
    let html = STRONG_STAR_RE.replace_all(&html, "<strong>$1</strong>");
    let html = STRONG_UNDERSCORE_RE.replace_all(&html, "<strong>$1</strong>");
    let html = EM_STAR_RE.replace_all(&html, "<em>$1</em>");
    let html = EM_UNDERSCORE_RE.replace_all(&html, "<em>$1</em>");
    let html = STRIKE_RE.replace_all(&html, "<del>$1</del>");
    let html = LINK_RE.replace_all(&html, |caps: &Captures| match safe_href(&caps[2]) {
        Some(href) => anchor(&href, &caps[1]),
        None => caps[0].to_string(),
    });
    paragraphs(&html)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Bullet,
    Ordinal,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            ListKind::Bullet => "ul",
            ListKind::Ordinal => "ol",
        }
    }
}

/// Turns item lines into `<li>` and wraps each contiguous run of one kind in
/// a single list element on one line.
fn wrap_lists(html: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut open: Option<(ListKind, String)> = None;

    for line in html.split('\n') {
        let item = BULLET_RE
            .captures(line)
            .map(|caps| (ListKind::Bullet, caps[1].to_string()))
            .or_else(|| {
                ORDINAL_RE
                    .captures(line)
                    .map(|caps| (ListKind::Ordinal, caps[1].to_string()))
            });

        match item {
            Some((kind, body)) => {
                if let Some((open_kind, items)) = open.as_mut()
                    && *open_kind == kind
                {
                    items.push_str(&format!("<li>{body}</li>"));
                } else {
                    if let Some(list) = open.take() {
                        lines.push(close_list(list));
                    }
                    open = Some((kind, format!("<li>{body}</li>")));
                }
            }
            None => {
                if let Some(list) = open.take() {
                    lines.push(close_list(list));
                }
                lines.push(line.to_string());
            }
        }
    }
    if let Some(list) = open.take() {
        lines.push(close_list(list));
    }
    lines.join("\n")
}

fn close_list((kind, items): (ListKind, String)) -> String {
    let tag = kind.tag();
    format!("<{tag}>{items}</{tag}>")
}

fn paragraphs(html: &str) -> String {
    BLANK_LINE_RE
        .split(html)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            if BLOCK_PREFIXES.iter().any(|p| segment.starts_with(p)) {
                segment.to_string()
            } else {
                format!("<p>{}</p>", segment.replace('\n', " "))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
