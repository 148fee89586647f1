//! Ask command handler.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use pagechat_core::config::Config;
use pagechat_core::history::{self, FileStore};
use pagechat_core::host::{self, DocumentHost, RetryPolicy};
use pagechat_core::provider::{ChatClient, ChatConfig};
use pagechat_core::turn::{self, Conversation, TurnStatus};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::input;
use crate::interrupt::InterruptedError;

pub struct AskOptions<'a> {
    pub page: &'a Path,
    pub question: &'a str,
    pub config: &'a Config,
    pub model_override: Option<&'a str>,
    pub html: bool,
    pub no_save: bool,
    pub cancel: CancellationToken,
}

pub async fn run(options: AskOptions<'_>) -> Result<()> {
    let document = input::read_document(options.page)?;
    let mut page_host = DocumentHost::new(document, options.config.extract_options());
    let page = host::fetch_snapshot(&mut page_host, &RetryPolicy::default())
        .await?
        .context(host::UNREACHABLE_MESSAGE)?;

    let chat_config = ChatConfig::from_config(options.config, options.model_override)?;
    let client = ChatClient::new(chat_config);

    let store = FileStore::open_default()?;
    let stored = if options.no_save {
        Vec::new()
    } else {
        history::load_messages(&store, &page.url)
            .with_context(|| format!("load history for {}", page.url))?
    };
    debug!(stored = stored.len(), url = %page.url, "history loaded");
    let mut conversation = Conversation::from_messages(stored);

    let stream_deltas = !options.html;
    let outcome = turn::run_turn(
        &client,
        &mut conversation,
        &page,
        options.question,
        options.config.render.mode,
        &options.cancel,
        |update| {
            if stream_deltas {
                let mut stdout = io::stdout();
                let _ = stdout.write_all(update.delta.as_bytes());
                let _ = stdout.flush();
            }
        },
    )
    .await?;

    if options.html {
        println!("{}", outcome.html);
    } else if !outcome.content.is_empty() && outcome.status != TurnStatus::Failed {
        println!();
    }

    if !options.no_save {
        history::save_messages(&store, &page.url, conversation.messages())
            .with_context(|| format!("save history for {}", page.url))?;
    }

    match outcome.status {
        TurnStatus::Completed | TurnStatus::Streaming => Ok(()),
        TurnStatus::Cancelled => Err(InterruptedError.into()),
        TurnStatus::Failed => {
            let message = outcome.content;
            match outcome.error {
                Some(err) => Err(anyhow::Error::new(err).context(message)),
                None => Err(anyhow::anyhow!(message)),
            }
        }
    }
}
