//! Left-to-right inline scanner.
//!
//! Precedence at a position is code span, then link, then strong,
//! strikethrough and emphasis. Closer searches skip over code spans and
//! links, so a delimiter inside backticks or link syntax never pairs with one
//! outside them. Code span content is emitted as-is and never scanned again.

use super::{anchor, safe_href};

/// Nesting limit for markup inside markup; deeper content is emitted literally.
pub(super) const MAX_DEPTH: usize = 16;

pub(super) fn render(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    render_into(text, 0, &mut out);
    out
}

fn render_into(text: &str, depth: usize, out: &mut String) {
    if depth >= MAX_DEPTH {
        out.push_str(text);
        return;
    }
    Scanner::new(text).scan(depth, out);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delim {
    Strong,
    StrongUnderscore,
    Strike,
    Em,
    EmUnderscore,
}

impl Delim {
    const COUNT: usize = 5;

    fn marker(self) -> &'static str {
        match self {
            Delim::Strong => "**",
            Delim::StrongUnderscore => "__",
            Delim::Strike => "~~",
            Delim::Em => "*",
            Delim::EmUnderscore => "_",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Delim::Strong | Delim::StrongUnderscore => "strong",
            Delim::Strike => "del",
            Delim::Em | Delim::EmUnderscore => "em",
        }
    }

    /// Underscore markers do not open or close inside a word.
    fn word_bound(self) -> bool {
        matches!(self, Delim::StrongUnderscore | Delim::EmUnderscore)
    }
}

enum Step {
    /// Replace `[position, end)` with markup.
    Emit(String, usize),
    /// Keep `[position, end)` as literal text.
    Skip(usize),
}

struct Scanner<'a> {
    text: &'a str,
    /// `(start, end)` byte ranges of code spans, backticks included.
    code_spans: Vec<(usize, usize)>,
    /// `(start, close, end)` of each `[label](target)`; `close` is the `]`.
    link_spans: Vec<(usize, usize, usize)>,
    /// Delimiters whose closer search found nothing to close with.
    exhausted: [bool; Delim::COUNT],
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        let bytes = text.as_bytes();
        let code_spans = find_code_spans(bytes);
        let link_spans = find_link_spans(bytes, &code_spans);
        Self {
            text,
            code_spans,
            link_spans,
            exhausted: [false; Delim::COUNT],
        }
    }

    fn scan(&mut self, depth: usize, out: &mut String) {
        let len = self.text.len();
        let mut literal = 0;
        let mut i = 0;
        while i < len {
            match self.step(i, depth) {
                Some(Step::Emit(html, end)) => {
                    out.push_str(&self.text[literal..i]);
                    out.push_str(&html);
                    literal = end;
                    i = end;
                }
                Some(Step::Skip(end)) => i = end,
                None => i += 1,
            }
        }
        out.push_str(&self.text[literal..]);
    }

    fn step(&mut self, i: usize, depth: usize) -> Option<Step> {
        match self.text.as_bytes()[i] {
            b'`' => Some(self.code(i)),
            b'[' => self.link(i, depth),
            b'*' | b'_' | b'~' => self.delimited(i, depth),
            _ => None,
        }
    }

    fn code_span_at(&self, i: usize) -> Option<usize> {
        self.code_spans
            .binary_search_by_key(&i, |&(start, _)| start)
            .ok()
            .map(|idx| self.code_spans[idx].1)
    }

    fn link_span_at(&self, i: usize) -> Option<(usize, usize)> {
        self.link_spans
            .binary_search_by_key(&i, |&(start, _, _)| start)
            .ok()
            .map(|idx| {
                let (_, close, end) = self.link_spans[idx];
                (close, end)
            })
    }

    fn code(&self, i: usize) -> Step {
        let bytes = self.text.as_bytes();
        let run = delimiter_run(bytes, i);
        match self.code_span_at(i) {
            Some(end) => {
                let content = &self.text[i + run..end - run];
                Step::Emit(format!("<code>{content}</code>"), end)
            }
            None => Step::Skip(i + run),
        }
    }

    fn link(&self, i: usize, depth: usize) -> Option<Step> {
        let (close, end) = self.link_span_at(i)?;
        let Some(href) = safe_href(&self.text[close + 2..end - 1]) else {
            return Some(Step::Skip(end));
        };
        let mut label = String::new();
        render_into(&self.text[i + 1..close], depth + 1, &mut label);
        Some(Step::Emit(anchor(&href, &label), end))
    }

    fn delimited(&mut self, i: usize, depth: usize) -> Option<Step> {
        let bytes = self.text.as_bytes();
        let doubled = bytes.get(i + 1) == Some(&bytes[i]);
        let delim = match (bytes[i], doubled) {
            (b'*', true) => Delim::Strong,
            (b'_', true) => Delim::StrongUnderscore,
            (b'~', true) => Delim::Strike,
            (b'*', false) => Delim::Em,
            (b'_', false) => Delim::EmUnderscore,
            _ => return None,
        };
        let run = delimiter_run(bytes, i);
        let marker_len = delim.marker().len();
        if run != marker_len || self.exhausted[delim as usize] || !self.flanking(delim, i).0 {
            return Some(Step::Skip(i + run));
        }
        let Some(close) = self.find_closer(delim, i + marker_len) else {
            return Some(Step::Skip(i + marker_len));
        };
        let mut inner = String::new();
        render_into(&self.text[i + marker_len..close], depth + 1, &mut inner);
        let tag = delim.tag();
        Some(Step::Emit(
            format!("<{tag}>{inner}</{tag}>"),
            close + marker_len,
        ))
    }

    /// Finds the closer matching an opener whose content starts at `from`,
    /// balancing nested openers of the same marker.
    fn find_closer(&mut self, delim: Delim, from: usize) -> Option<usize> {
        let bytes = self.text.as_bytes();
        let marker = delim.marker();
        let first = marker.as_bytes()[0];
        let mut nested = 0usize;
        let mut saw_closer = false;
        let mut k = from;
        while k < bytes.len() {
            if let Some(end) = self.code_span_at(k) {
                k = end;
                continue;
            }
            if let Some((_, end)) = self.link_span_at(k) {
                k = end;
                continue;
            }
            if bytes[k] != first {
                k += 1;
                continue;
            }
            let run = delimiter_run(bytes, k);
            if run == marker.len() {
                let (can_open, can_close) = self.flanking(delim, k);
                if can_close && k > from {
                    saw_closer = true;
                    if nested == 0 {
                        return Some(k);
                    }
                    nested -= 1;
                } else if can_open {
                    nested += 1;
                }
            }
            k += run;
        }
        if !saw_closer {
            self.exhausted[delim as usize] = true;
        }
        None
    }

    /// Whether a marker at `k` may open and may close a span.
    fn flanking(&self, delim: Delim, k: usize) -> (bool, bool) {
        let before = self.text[..k].chars().next_back();
        let after = self.text[k + delim.marker().len()..].chars().next();
        let mut can_open = after.is_some_and(|c| !c.is_whitespace());
        let mut can_close = before.is_some_and(|c| !c.is_whitespace());
        if delim.word_bound() {
            can_open &= !before.is_some_and(char::is_alphanumeric);
            can_close &= !after.is_some_and(char::is_alphanumeric);
        }
        (can_open, can_close)
    }
}

fn delimiter_run(bytes: &[u8], start: usize) -> usize {
    let marker = bytes[start];
    bytes[start..].iter().take_while(|&&b| b == marker).count()
}

/// Pairs backtick runs of equal length (one or two backticks). Runs of three
/// or more are left literal, as are runs with no partner.
fn find_code_spans(bytes: &[u8]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut unmatched = [false; 3];
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'`' {
            i += 1;
            continue;
        }
        let run = delimiter_run(bytes, i);
        let open_end = i + run;
        if run < 3 && !unmatched[run] {
            if let Some(close) = find_run(bytes, open_end, run) {
                spans.push((i, close + run));
                i = close + run;
                continue;
            }
            unmatched[run] = true;
        }
        i = open_end;
    }
    spans
}

/// Finds `[label](target)` ranges outside code spans. The innermost bracket
/// pair wins; the label must be non-empty and the target must be non-empty
/// with no whitespace.
fn find_link_spans(bytes: &[u8], code_spans: &[(usize, usize)]) -> Vec<(usize, usize, usize)> {
    let mut spans = Vec::new();
    let mut code = code_spans.iter().peekable();
    let mut open = None;
    let mut i = 0;
    while i < bytes.len() {
        if let Some(&&(start, end)) = code.peek()
            && start <= i
        {
            code.next();
            i = i.max(end);
            continue;
        }
        match bytes[i] {
            b'[' => open = Some(i),
            b']' => {
                if let Some(start) = open.take()
                    && let Some(end) = link_end(bytes, start, i)
                {
                    spans.push((start, i, end));
                    i = end;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    spans
}

/// End of `(target)` following the `]` at `close`, closing paren included.
fn link_end(bytes: &[u8], open: usize, close: usize) -> Option<usize> {
    if close == open + 1 || bytes.get(close + 1) != Some(&b'(') {
        return None;
    }
    let target_start = close + 2;
    let target_len = bytes[target_start..]
        .iter()
        .position(|&b| b == b')' || b.is_ascii_whitespace())?;
    let target_end = target_start + target_len;
    if target_len == 0 || bytes[target_end] != b')' {
        return None;
    }
    Some(target_end + 1)
}

/// Start of the next backtick run of exactly `len` at or after `from`.
fn find_run(bytes: &[u8], from: usize, len: usize) -> Option<usize> {
    let mut k = from;
    while k < bytes.len() {
        if bytes[k] == b'`' {
            let run = delimiter_run(bytes, k);
            if run == len {
                return Some(k);
            }
            k += run;
        } else {
            k += 1;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passes_through() {
        assert_eq!(render("just text &amp; more"), "just text &amp; more");
    }

    #[test]
    fn test_emphasis_forms() {
        assert_eq!(
            render("*a* _b_ **c** __d__ ~~e~~"),
            "<em>a</em> <em>b</em> <strong>c</strong> <strong>d</strong> <del>e</del>"
        );
    }

    #[test]
    fn test_underscore_inside_word_is_literal() {
        assert_eq!(render("snake_case_name"), "snake_case_name");
        assert_eq!(render("call my_fn_ now"), "call my_fn_ now");
    }

    #[test]
    fn test_star_inside_word_still_emphasizes() {
        assert_eq!(render("un*frigging*believable"), "un<em>frigging</em>believable");
    }

    #[test]
    fn test_spaced_stars_are_literal() {
        assert_eq!(render("2 * 3 * 4"), "2 * 3 * 4");
    }

    #[test]
    fn test_unbalanced_markers_stay_literal() {
        assert_eq!(render("**bold"), "**bold");
        assert_eq!(render("`open"), "`open");
        assert_eq!(render("[text](no-close"), "[text](no-close");
    }

    #[test]
    fn test_code_span_wins_over_delimiters() {
        assert_eq!(render("**`x**`**"), "<strong><code>x**</code></strong>");
        assert_eq!(render("`*a*` *b*"), "<code>*a*</code> <em>b</em>");
    }

    #[test]
    fn test_double_backtick_span_may_contain_single() {
        assert_eq!(render("``a ` b``"), "<code>a ` b</code>");
    }

    #[test]
    fn test_triple_backticks_are_literal() {
        assert_eq!(render("```rust fn"), "```rust fn");
    }

    #[test]
    fn test_nested_same_marker_balances() {
        assert_eq!(
            render("**a **b** c**"),
            "<strong>a <strong>b</strong> c</strong>"
        );
        assert_eq!(render("*a **b** c*"), "<em>a <strong>b</strong> c</em>");
    }

    #[test]
    fn test_link_label_is_scanned() {
        assert_eq!(
            render("see [**docs**](https://docs.rs)"),
            "see <a href=\"https://docs.rs\" target=\"_blank\" rel=\"noopener noreferrer\"><strong>docs</strong></a>"
        );
    }

    #[test]
    fn test_innermost_bracket_forms_link() {
        assert_eq!(
            render("[a [b](/x)"),
            "[a <a href=\"/x\" target=\"_blank\" rel=\"noopener noreferrer\">b</a>"
        );
    }

    #[test]
    fn test_emphasis_does_not_close_inside_link() {
        assert_eq!(
            render("*[a*](http://x)"),
            "*<a href=\"http://x\" target=\"_blank\" rel=\"noopener noreferrer\">a*</a>"
        );
        assert_eq!(
            render("*see [b*](/x) now*"),
            "<em>see <a href=\"/x\" target=\"_blank\" rel=\"noopener noreferrer\">b*</a> now</em>"
        );
    }

    #[test]
    fn test_rejected_link_is_kept_verbatim() {
        assert_eq!(
            render("[x](javascript:void) *y*"),
            "[x](javascript:void) <em>y</em>"
        );
    }

    #[test]
    fn test_nesting_is_capped() {
        let mut text = "x".to_string();
        for level in 0..40 {
            text = if level % 2 == 0 {
                format!("**a {text} a**")
            } else {
                format!("*b {text} b*")
            };
        }
        let html = render(&text);
        let opened = html.matches("<strong>").count() + html.matches("<em>").count();
        assert!(html.starts_with("<em>"));
        assert!(html.contains('x'));
        assert!(opened <= MAX_DEPTH);
    }

    #[test]
    fn test_non_ascii_text_around_markers() {
        assert_eq!(render("héllo *wörld* ✓"), "héllo <em>wörld</em> ✓");
    }
}
