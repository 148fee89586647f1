//! Serialized document tree sent across the host messaging boundary.
//!
//! The page context owns the live DOM; it serializes the body into this shape
//! together with whatever it managed to resolve per element (computed style,
//! layout-rendered text). Anything the host could not resolve is simply absent.

use std::convert::Infallible;

use serde::{Deserialize, Serialize};

/// A page as seen by the content script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// `None` while the page is still loading.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Element>,
}

impl Document {
    pub fn new(title: impl Into<String>, url: impl Into<String>, body: Element) -> Self {
        Self {
            title: Some(title.into()),
            url: Some(url.into()),
            body: Some(body),
        }
    }
}

/// A node in the serialized tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Element(Element),
    Text { text: String },
    Comment { text: String },
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text { text: text.into() }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

/// An element with the host-resolved data the extractor relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    /// Resolved computed style. Absent when resolution failed (detached or
    /// cross-origin nodes); such elements are treated as visible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<ComputedStyle>,
    /// Layout-rendered text (`innerText`), when the host computed it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            style: None,
            rendered_text: None,
            children: Vec::new(),
        }
    }

    #[must_use]
    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    #[must_use]
    pub fn text(self, text: impl Into<String>) -> Self {
        self.child(Node::text(text))
    }

    #[must_use]
    pub fn style(mut self, style: ComputedStyle) -> Self {
        self.style = Some(style);
        self
    }

    #[must_use]
    pub fn rendered_text(mut self, text: impl Into<String>) -> Self {
        self.rendered_text = Some(text.into());
        self
    }

    /// Case-insensitive tag comparison.
    pub fn is_tag(&self, tag: &str) -> bool {
        self.tag.eq_ignore_ascii_case(tag)
    }

    /// Whether the resolved style hides this element. Unresolved style counts
    /// as visible.
    pub fn is_hidden(&self) -> bool {
        self.style.as_ref().is_some_and(ComputedStyle::is_hidden)
    }

    /// Concatenated text of all descendant text nodes (`textContent`).
    pub fn text_content(&self) -> String {
        let Ok(text) = self.try_text_content(|| Ok::<(), Infallible>(()));
        text
    }

    /// Like [`Element::text_content`], calling `visit` before each descendant
    /// node and stopping at its first error.
    pub fn try_text_content<E>(
        &self,
        mut visit: impl FnMut() -> Result<(), E>,
    ) -> Result<String, E> {
        let mut out = String::new();
        let mut stack: Vec<&Node> = self.children.iter().rev().collect();
        while let Some(node) = stack.pop() {
            visit()?;
            match node {
                Node::Text { text } => out.push_str(text),
                Node::Element(element) => stack.extend(element.children.iter().rev()),
                Node::Comment { .. } => {}
            }
        }
        Ok(out)
    }
}

/// The subset of computed style that decides visibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComputedStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<String>,
}

impl ComputedStyle {
    pub fn hidden_display() -> Self {
        Self {
            display: Some("none".to_string()),
            ..Self::default()
        }
    }

    pub fn hidden_visibility() -> Self {
        Self {
            visibility: Some("hidden".to_string()),
            ..Self::default()
        }
    }

    pub fn transparent() -> Self {
        Self {
            opacity: Some("0".to_string()),
            ..Self::default()
        }
    }

    pub fn is_hidden(&self) -> bool {
        let display_none = self
            .display
            .as_deref()
            .is_some_and(|d| d.trim().eq_ignore_ascii_case("none"));
        let visibility_hidden = self
            .visibility
            .as_deref()
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("hidden"));
        // Unparseable opacity is left to the browser's interpretation: visible.
        let transparent = self
            .opacity
            .as_deref()
            .and_then(|o| o.trim().parse::<f32>().ok())
            .is_some_and(|o| o <= 0.0);
        display_none || visibility_hidden || transparent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_content_walks_in_document_order() {
        let body = Element::new("body")
            .text("a")
            .child(Element::new("p").text("b").child(Element::new("em").text("c")))
            .child(Node::Comment {
                text: "ignored".to_string(),
            })
            .text("d");

        assert_eq!(body.text_content(), "abcd");
    }

    #[test]
    fn test_style_hidden_variants() {
        assert!(ComputedStyle::hidden_display().is_hidden());
        assert!(ComputedStyle::hidden_visibility().is_hidden());
        assert!(ComputedStyle::transparent().is_hidden());
        assert!(
            ComputedStyle {
                opacity: Some("0.0".to_string()),
                ..ComputedStyle::default()
            }
            .is_hidden()
        );
        assert!(
            !ComputedStyle {
                opacity: Some("0.5".to_string()),
                display: Some("block".to_string()),
                visibility: Some("visible".to_string()),
            }
            .is_hidden()
        );
        assert!(!Element::new("div").is_hidden());
    }

    #[test]
    fn test_document_deserializes_from_host_json() {
        let json = r#"{
            "title": "Example",
            "url": "https://example.com/",
            "body": {
                "tag": "body",
                "children": [
                    {"type": "element", "tag": "p", "style": {"opacity": "0"},
                     "children": [{"type": "text", "text": "hidden"}]},
                    {"type": "text", "text": "visible"}
                ]
            }
        }"#;

        let doc: Document = serde_json::from_str(json).unwrap();
        let body = doc.body.unwrap();
        assert_eq!(body.children.len(), 2);
        match &body.children[0] {
            Node::Element(p) => {
                assert!(p.is_tag("P"));
                assert!(p.is_hidden());
            }
            other => panic!("expected element, got {other:?}"),
        }
        assert_eq!(body.text_content(), "hiddenvisible");
    }

    #[test]
    fn test_try_text_content_stops_at_first_error() {
        let body = Element::new("body")
            .text("a")
            .child(Element::new("p").text("b"))
            .text("c");

        let mut visited = 0;
        let full = body.try_text_content(|| {
            visited += 1;
            Ok::<(), ()>(())
        });
        assert_eq!(full, Ok("abc".to_string()));
        assert_eq!(visited, 4);

        let mut allowed = 2;
        let cut = body.try_text_content(|| {
            if allowed == 0 {
                return Err("budget");
            }
            allowed -= 1;
            Ok(())
        });
        assert_eq!(cut, Err("budget"));
    }
}
