//! Chat command handler.

use relaychat_client::{
    ChatSession, ClientConfig, ConversationStore, PickedFile, RelayClient, ResolvedFile,
    SendOutcome, TranscriptEvent, UploadQueue,
};
use relaychat_core::{ConversationSummary, MessageStatus};
use relaychat_error::{ClientError, ClientErrorKind, RelayChatError, RelayChatResult};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const ALIAS_CHARS: usize = 40;

/// Inputs of one `chat` invocation.
#[derive(Debug, Clone, Default)]
pub struct ChatArgs {
    /// Saved conversation to continue
    pub conversation: Option<String>,
    /// Files to attach
    pub files: Vec<PathBuf>,
    /// Message text
    pub prompt: String,
    /// Whether to persist the transcript
    pub save: bool,
}

/// What a `chat` invocation did.
#[derive(Debug, Clone)]
pub struct ChatReport {
    /// Conversation the message went to
    pub conversation_id: String,
    /// How the send ended
    pub outcome: SendOutcome,
}

/// Sends one message, writing the reply to `out` as it arrives.
///
/// Ctrl-C cancels the reply in flight; the partial text stays in the saved
/// transcript.
#[instrument(skip_all, fields(conversation = ?args.conversation, files = args.files.len()))]
pub async fn handle_chat_command<W: Write>(
    config: &ClientConfig,
    store: &dyn ConversationStore,
    args: ChatArgs,
    out: &mut W,
) -> RelayChatResult<ChatReport> {
    let client = RelayClient::new(config)?;

    let (conversation_id, summary, history) = match &args.conversation {
        Some(id) => {
            let summary = store
                .list()
                .await?
                .into_iter()
                .find(|entry| &entry.conversation_id == id);
            (id.clone(), summary, store.load_messages(id).await?)
        }
        None => (ConversationSummary::generate_id(), None, Vec::new()),
    };

    let attachments = upload_attachments(&client, config, &args.files).await?;
    let session = ChatSession::with_messages(client, *config.generation(), history);
    let mut events = session.subscribe();

    let send = session.send(&args.prompt, attachments);
    tokio::pin!(send);
    let outcome = loop {
        tokio::select! {
            result = &mut send => break result?,
            event = events.recv() => {
                if let Ok(event) = event {
                    print_event(&event, out)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                if session.cancel().await {
                    warn!("Reply cancelled");
                }
            }
        }
    };
    while let Ok(event) = events.try_recv() {
        print_event(&event, out)?;
    }

    let messages = session.messages().await;
    match &outcome {
        SendOutcome::Buffered { message } => {
            if let Some(reply) = messages.iter().find(|m| m.id() == message) {
                writeln!(out, "{}", reply.text()).map_err(io_error)?;
            }
        }
        SendOutcome::Streamed { .. } | SendOutcome::Cancelled { .. } => {
            writeln!(out).map_err(io_error)?;
        }
        SendOutcome::Failed { error_message, .. } => {
            if let Some(entry) = messages.iter().find(|m| m.id() == error_message) {
                eprintln!("{}", entry.text());
            }
        }
    }

    if args.save {
        let summary = summary.unwrap_or_else(|| {
            ConversationSummary::new(conversation_id.clone(), alias_for(&args.prompt))
        });
        store.add(summary).await?;
        store.save_messages(&conversation_id, &messages).await?;
        info!(conversation = %conversation_id, messages = messages.len(), "Saved conversation");
    }

    Ok(ChatReport {
        conversation_id,
        outcome,
    })
}

fn print_event<W: Write>(event: &TranscriptEvent, out: &mut W) -> RelayChatResult<()> {
    match event {
        TranscriptEvent::TokenAppended { token, .. } => {
            write!(out, "{}", token).map_err(io_error)?;
            out.flush().map_err(io_error)?;
        }
        TranscriptEvent::MessageFinished {
            status: MessageStatus::Interrupted,
            ..
        } => {
            write!(out, " [interrupted]").map_err(io_error)?;
        }
        TranscriptEvent::MessageFinished {
            status: MessageStatus::Cancelled,
            ..
        } => {
            write!(out, " [cancelled]").map_err(io_error)?;
        }
        _ => {}
    }
    Ok(())
}

/// Uploads attachments through an [`UploadQueue`], failing on the first
/// rejected or failed file.
async fn upload_attachments(
    client: &RelayClient,
    config: &ClientConfig,
    paths: &[PathBuf],
) -> RelayChatResult<Vec<ResolvedFile>> {
    if paths.is_empty() {
        return Ok(Vec::new());
    }

    let mut picked = Vec::with_capacity(paths.len());
    for path in paths {
        picked.push(PickedFile::from_path(path).await?);
    }

    let mut queue = UploadQueue::new(
        Arc::new(client.clone()),
        *config.max_files(),
        *config.max_file_bytes(),
    );
    let mut notices = queue.add_files(picked).notices;
    notices.extend(queue.wait_settled().await);
    for notice in &notices {
        warn!(?notice, "Attachment rejected");
    }
    if let Some(notice) = notices.first() {
        return Err(notice.to_error().into());
    }
    Ok(queue.take_for_send()?)
}

fn alias_for(prompt: &str) -> String {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return "New chat".to_string();
    }
    let mut alias: String = prompt.chars().take(ALIAS_CHARS).collect();
    if prompt.chars().count() > ALIAS_CHARS {
        alias.push('…');
    }
    alias
}

#[track_caller]
pub(crate) fn io_error(err: std::io::Error) -> RelayChatError {
    ClientError::new(ClientErrorKind::Io(err.to_string())).into()
}
