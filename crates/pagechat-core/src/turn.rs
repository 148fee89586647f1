//! Conversation turns over a streamed response.
//!
//! A [`Turn`] borrows its [`Conversation`] mutably for as long as the response
//! streams, so a second question cannot start until the first one finishes.
//! Every delta is appended to the running buffer and the whole buffer is
//! re-rendered before the next read.

use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::extract::PageSnapshot;
use crate::markdown::{RenderMode, render_with};
use crate::prompt::system_prompt;
use crate::provider::{ChatClient, Role};
use crate::stream::{StreamError, StreamResult};

/// Shown in place of the answer when the request or the stream fails.
pub const FAILURE_MESSAGE: &str =
    "Sorry, I encountered an error. Please check your API key and try again.";

/// A stored chat message. `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: i64,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Messages exchanged about one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<ConversationMessage>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<ConversationMessage> {
        self.messages
    }

    /// Records the question and an empty assistant placeholder, and returns
    /// the turn that will fill the placeholder in.
    pub fn begin_turn(&mut self, question: &str) -> Turn<'_> {
        self.messages
            .push(ConversationMessage::new(Role::User, question));
        self.messages
            .push(ConversationMessage::new(Role::Assistant, String::new()));
        let message_index = self.messages.len() - 1;
        Turn {
            conversation: self,
            buffer: String::new(),
            message_index,
            status: TurnStatus::Streaming,
            render_mode: RenderMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

/// Passed to the caller after every delta.
#[derive(Debug, Clone, Copy)]
pub struct TurnUpdate<'a> {
    pub delta: &'a str,
    pub buffer: &'a str,
    pub html: &'a str,
}

/// Final state of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub status: TurnStatus,
    /// Content stored in the assistant message.
    pub content: String,
    /// `content` rendered with the turn's mode.
    pub html: String,
    pub error: Option<StreamError>,
}

/// State of the in-flight exchange.
pub struct Turn<'c> {
    conversation: &'c mut Conversation,
    buffer: String,
    message_index: usize,
    status: TurnStatus,
    render_mode: RenderMode,
}

impl Turn<'_> {
    #[must_use]
    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }

    pub fn status(&self) -> TurnStatus {
        self.status
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Index of the assistant message this turn fills in.
    pub fn message_index(&self) -> usize {
        self.message_index
    }

    /// Appends a delta and renders the whole buffer.
    pub fn push_delta(&mut self, delta: &str) -> String {
        self.buffer.push_str(delta);
        render_with(&self.buffer, self.render_mode)
    }

    /// Reads `stream` to the end, one delta at a time.
    pub async fn drive<S>(
        mut self,
        mut stream: S,
        cancel: &CancellationToken,
        mut on_update: impl FnMut(TurnUpdate<'_>),
    ) -> TurnOutcome
    where
        S: Stream<Item = StreamResult<String>> + Unpin,
    {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return self.cancel(),
                item = stream.next() => item,
            };
            match next {
                Some(Ok(delta)) => {
                    let html = self.push_delta(&delta);
                    on_update(TurnUpdate {
                        delta: &delta,
                        buffer: &self.buffer,
                        html: &html,
                    });
                }
                Some(Err(err)) => return self.fail(err),
                None => return self.complete(),
            }
        }
    }

    /// Stores the full buffer as the answer.
    pub fn complete(self) -> TurnOutcome {
        self.finish(TurnStatus::Completed, None)
    }

    /// Keeps what arrived so far as the answer.
    pub fn cancel(self) -> TurnOutcome {
        self.finish(TurnStatus::Cancelled, None)
    }

    /// Replaces the answer with [`FAILURE_MESSAGE`].
    pub fn fail(self, error: StreamError) -> TurnOutcome {
        warn!(kind = %error.kind, error = %error, "turn failed");
        self.finish(TurnStatus::Failed, Some(error))
    }

    fn finish(mut self, status: TurnStatus, error: Option<StreamError>) -> TurnOutcome {
        self.status = status;
        let content = match status {
            TurnStatus::Failed => FAILURE_MESSAGE.to_string(),
            _ => std::mem::take(&mut self.buffer),
        };
        if let Some(message) = self.conversation.messages.get_mut(self.message_index) {
            message.content.clone_from(&content);
        }
        info!(?status, chars = content.chars().count(), "turn finished");
        TurnOutcome {
            status,
            html: render_with(&content, self.render_mode),
            content,
            error,
        }
    }
}

/// Asks `question` about `page`: builds the prompt, opens the stream and
/// drives the turn to completion, failure or cancellation.
pub async fn run_turn(
    client: &ChatClient,
    conversation: &mut Conversation,
    page: &PageSnapshot,
    question: &str,
    mode: RenderMode,
    cancel: &CancellationToken,
    on_update: impl FnMut(TurnUpdate<'_>),
) -> anyhow::Result<TurnOutcome> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("Question is empty");
    }
    let prompt = system_prompt(page)?;
    debug!(prompt_chars = prompt.chars().count(), "system prompt built");

    let turn = conversation.begin_turn(question).with_render_mode(mode);
    info!(model = client.model(), url = %page.url, "turn started");

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => turn.cancel(),
        result = client.send_chat_stream(&prompt, question) => match result {
            Ok(stream) => turn.drive(stream, cancel, on_update).await,
            Err(err) => turn.fail(err),
        },
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::provider::ChatConfig;
    use crate::stream::StreamErrorKind;

    fn deltas(parts: &[&str]) -> impl Stream<Item = StreamResult<String>> + Unpin {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(p.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn test_begin_turn_adds_placeholder() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_turn("What is this?");
        assert_eq!(turn.message_index(), 1);
        assert_eq!(turn.status(), TurnStatus::Streaming);
        drop(turn);

        let messages = conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "What is this?");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].content, "");
        assert!(messages[0].timestamp <= messages[1].timestamp);
    }

    #[tokio::test]
    async fn test_drive_rerenders_full_buffer_each_delta() {
        let mut conversation = Conversation::new();
        let turn = conversation.begin_turn("q");
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();

        let outcome = turn
            .drive(deltas(&["Hello **wor", "ld**"]), &cancel, |update| {
                seen.push((update.buffer.to_string(), update.html.to_string()));
            })
            .await;

        assert_eq!(
            seen,
            vec![
                ("Hello **wor".to_string(), "<p>Hello **wor</p>".to_string()),
                (
                    "Hello **world**".to_string(),
                    "<p>Hello <strong>world</strong></p>".to_string()
                ),
            ]
        );
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.content, "Hello **world**");
        assert_eq!(outcome.html, "<p>Hello <strong>world</strong></p>");
        assert_eq!(conversation.messages()[1].content, "Hello **world**");
    }

    #[tokio::test]
    async fn test_stream_error_fails_turn_with_generic_message() {
        let mut conversation = Conversation::new();
        let source = stream::iter(vec![
            Ok("partial".to_string()),
            Err(StreamError::transport("connection reset")),
        ]);
        let outcome = conversation
            .begin_turn("q")
            .drive(source, &CancellationToken::new(), |_| {})
            .await;

        assert_eq!(outcome.status, TurnStatus::Failed);
        assert_eq!(outcome.content, FAILURE_MESSAGE);
        assert_eq!(
            outcome.error.map(|e| e.kind),
            Some(StreamErrorKind::Transport)
        );
        assert_eq!(conversation.messages()[1].content, FAILURE_MESSAGE);

        // The conversation accepts the next question.
        let outcome = conversation
            .begin_turn("again")
            .drive(deltas(&["ok"]), &CancellationToken::new(), |_| {})
            .await;
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(conversation.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_buffer() {
        let mut conversation = Conversation::new();
        let cancel = CancellationToken::new();
        let source = deltas(&["partial"]).chain(stream::pending());

        let outcome = conversation
            .begin_turn("q")
            .drive(source, &cancel, |_| cancel.cancel())
            .await;

        assert_eq!(outcome.status, TurnStatus::Cancelled);
        assert_eq!(outcome.content, "partial");
        assert_eq!(conversation.messages()[1].content, "partial");
    }

    #[tokio::test]
    async fn test_run_turn_streams_from_service() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string(concat!(
                "data: {\"choices\":[{\"delta\":{\"content\":\"- a\\n\"}}]}\n\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"- b\"}}]}\n\n",
                "data: [DONE]\n\n",
            )))
            .mount(&server)
            .await;

        let client = ChatClient::new(ChatConfig {
            api_key: "k".to_string(),
            base_url: server.uri(),
            model: "gpt-4.1-mini".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
        });
        let page = PageSnapshot {
            text: "Some page".to_string(),
            title: "Title".to_string(),
            url: "https://example.com/".to_string(),
        };
        let mut conversation = Conversation::new();
        let mut updates = 0;

        let outcome = run_turn(
            &client,
            &mut conversation,
            &page,
            "  list?  ",
            RenderMode::Protected,
            &CancellationToken::new(),
            |_| updates += 1,
        )
        .await
        .unwrap();

        assert_eq!(updates, 2);
        assert_eq!(outcome.status, TurnStatus::Completed);
        assert_eq!(outcome.html, "<ul><li>a</li><li>b</li></ul>");
        assert_eq!(conversation.messages()[0].content, "list?");
    }

    #[tokio::test]
    async fn test_run_turn_http_error_fails_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = ChatClient::new(ChatConfig {
            api_key: "k".to_string(),
            base_url: server.uri(),
            model: "m".to_string(),
            max_tokens: 10,
            temperature: 0.0,
        });
        let page = PageSnapshot {
            text: "t".to_string(),
            title: "t".to_string(),
            url: "u".to_string(),
        };
        let mut conversation = Conversation::new();
        let outcome = run_turn(
            &client,
            &mut conversation,
            &page,
            "q",
            RenderMode::default(),
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, TurnStatus::Failed);
        assert_eq!(
            outcome.error.map(|e| e.kind),
            Some(StreamErrorKind::HttpStatus)
        );
    }

    #[tokio::test]
    async fn test_run_turn_rejects_blank_question() {
        let client = ChatClient::new(ChatConfig {
            api_key: "k".to_string(),
            base_url: "http://127.0.0.1:9".to_string(),
            model: "m".to_string(),
            max_tokens: 10,
            temperature: 0.0,
        });
        let page = PageSnapshot {
            text: "t".to_string(),
            title: "t".to_string(),
            url: "u".to_string(),
        };
        let mut conversation = Conversation::new();
        let result = run_turn(
            &client,
            &mut conversation,
            &page,
            "   ",
            RenderMode::default(),
            &CancellationToken::new(),
            |_| {},
        )
        .await;
        assert!(result.is_err());
        assert!(conversation.messages().is_empty());
    }
}
