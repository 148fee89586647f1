use std::fmt::Write;

use super::{escape_html, inline};

const FENCE: &str = "```";

pub(super) fn render(text: &str) -> String {
    let escaped = escape_html(text);
    let mut blocks = Vec::new();
    for segment in split_fences(&escaped) {
        match segment {
            Segment::Text(text) => blocks.extend(parse_blocks(text).iter().map(render_block)),
            Segment::Code { body, info } => blocks.push(code_block(body, info)),
        }
    }
    blocks.join("\n")
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    /// `info` is set when the opening fence starts a line, so its first
    /// line may name a language.
    Code { body: &'a str, info: bool },
}

/// Pairs fences in order of appearance. A trailing unpaired fence stays in
/// the text segment.
fn split_fences(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after = &rest[open + FENCE.len()..];
        let Some(close) = after.find(FENCE) else {
            break;
        };
        let before = &rest[..open];
        let at_line_start = before.is_empty() || before.ends_with('\n');
        segments.push(Segment::Text(before));
        segments.push(Segment::Code {
            body: &after[..close],
            info: at_line_start,
        });
        rest = &after[close + FENCE.len()..];
    }
    segments.push(Segment::Text(rest));
    segments
}

fn code_block(body: &str, info: bool) -> String {
    let (language, code) = if info {
        split_info(body)
    } else {
        (None, body.strip_prefix('\n').unwrap_or(body))
    };
    let code = code.strip_suffix('\n').unwrap_or(code);
    match language {
        Some(language) => {
            format!(r#"<pre><code class="language-{language}">{code}</code></pre>"#)
        }
        None => format!("<pre><code>{code}</code></pre>"),
    }
}

/// Splits an info word (` ```rust `) off the first line of a fenced body.
fn split_info(body: &str) -> (Option<&str>, &str) {
    let Some((first, rest)) = body.split_once('\n') else {
        return (None, body);
    };
    let info = first.trim();
    if info.is_empty() {
        return (None, rest);
    }
    if info
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.' | '#'))
    {
        return (Some(info), rest);
    }
    (None, body)
}

#[derive(Debug, PartialEq, Eq)]
enum Block<'a> {
    Heading(usize, &'a str),
    List { ordered: bool, items: Vec<&'a str> },
    Paragraph(Vec<&'a str>),
}

enum Line<'a> {
    Blank,
    Heading(usize, &'a str),
    Item { ordered: bool, text: &'a str },
    Text(&'a str),
}

fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Line::Blank;
    }
    if let Some((level, text)) = heading(line) {
        return Line::Heading(level, text);
    }
    let indented = line.trim_start();
    if let Some(text) = indented
        .strip_prefix("- ")
        .or_else(|| indented.strip_prefix("* "))
    {
        return Line::Item {
            ordered: false,
            text: text.trim(),
        };
    }
    if let Some(text) = ordinal(indented) {
        return Line::Item {
            ordered: true,
            text,
        };
    }
    Line::Text(trimmed)
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.bytes().take_while(|&b| b == b'#').count();
    if !(1..=3).contains(&level) {
        return None;
    }
    line[level..]
        .strip_prefix(' ')
        .map(|text| (level, text.trim()))
}

fn ordinal(line: &str) -> Option<&str> {
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    line[digits..].strip_prefix(". ").map(str::trim)
}

fn parse_blocks(text: &str) -> Vec<Block<'_>> {
    let mut blocks = Vec::new();
    let mut current: Option<Block<'_>> = None;

    for line in text.lines() {
        match classify(line) {
            Line::Blank => blocks.extend(current.take()),
            Line::Heading(level, text) => {
                blocks.extend(current.take());
                blocks.push(Block::Heading(level, text));
            }
            Line::Item { ordered, text } => {
                if let Some(Block::List {
                    ordered: open,
                    items,
                }) = current.as_mut()
                    && *open == ordered
                {
                    items.push(text);
                } else {
                    blocks.extend(current.take());
                    current = Some(Block::List {
                        ordered,
                        items: vec![text],
                    });
                }
            }
            Line::Text(text) => {
                if let Some(Block::Paragraph(lines)) = current.as_mut() {
                    lines.push(text);
                } else {
                    blocks.extend(current.take());
                    current = Some(Block::Paragraph(vec![text]));
                }
            }
        }
    }
    blocks.extend(current);
    blocks
}

fn render_block(block: &Block<'_>) -> String {
    match block {
        Block::Heading(level, text) => {
            format!("<h{level}>{}</h{level}>", inline::render(text))
        }
        Block::List { ordered, items } => {
            let tag = if *ordered { "ol" } else { "ul" };
            let mut html = format!("<{tag}>");
            for item in items {
                let _ = write!(html, "<li>{}</li>", inline::render(item));
            }
            let _ = write!(html, "</{tag}>");
            html
        }
        Block::Paragraph(lines) => format!("<p>{}</p>", inline::render(&lines.join(" "))),
    }
}
