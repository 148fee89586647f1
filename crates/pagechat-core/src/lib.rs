//! Core pagechat library (page extraction, stream decoding, markdown rendering).

pub mod config;
pub mod dom;
pub mod extract;
pub mod history;
pub mod host;
pub mod markdown;
pub mod preferences;
pub mod prompt;
pub mod provider;
pub mod stream;
pub mod turn;

pub use dom::{Document, Element, Node};
pub use extract::{PageSnapshot, extract};
pub use markdown::{RenderMode, render, render_with};
pub use stream::{DeltaStream, StreamError, StreamErrorKind};
