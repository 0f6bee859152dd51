//! Chat session: sends messages through the relay and folds the reply into
//! the transcript.

use crate::{GenerationReply, RecordDecoder, RelayClient, ReplyStream, ResolvedFile, Transcript};
use futures::StreamExt;
use futures::future::{AbortHandle, Abortable};
use relaychat_core::{
    GenerationOptions, GenerationRequest, Message, MessageId, MessageStatus, Part, Role,
    StreamRecord,
};
use relaychat_error::{ClientError, ClientErrorKind, ClientResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, instrument, warn};

const EVENT_CAPACITY: usize = 256;

/// Change applied to the transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    /// A message was appended.
    MessageAdded(Message),
    /// A token was appended to a streaming message.
    TokenAppended {
        /// Message receiving the token
        id: MessageId,
        /// The token text
        token: String,
    },
    /// A streaming message reached a final status.
    MessageFinished {
        /// The message
        id: MessageId,
        /// Its final status
        status: MessageStatus,
    },
}

/// How a send ended.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// A buffered reply was appended as one assistant message.
    Buffered {
        /// The assistant message
        message: MessageId,
    },
    /// A streamed reply was folded into a placeholder.
    Streamed {
        /// The assistant message
        message: MessageId,
        /// Tokens appended
        tokens: usize,
        /// Records skipped because they did not parse
        malformed: usize,
    },
    /// The request failed; an error entry was appended.
    Failed {
        /// The error entry
        error_message: MessageId,
        /// What went wrong
        error: ClientError,
    },
    /// The request was cancelled.
    Cancelled {
        /// Placeholder left in the transcript, if streaming had begun
        placeholder: Option<MessageId>,
    },
}

#[derive(Debug)]
struct InFlight {
    abort: AbortHandle,
    cancelled: AtomicBool,
    placeholder: OnceLock<MessageId>,
}

impl InFlight {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// One conversation's send pipeline.
///
/// At most one request is in flight; sending a new message cancels the
/// previous one. Transcript mutations happen under a single lock, and a
/// cancelled placeholder is finalized under that lock, so no token can land
/// in it after [`ChatSession::cancel`] returns.
#[derive(Debug)]
pub struct ChatSession {
    client: RelayClient,
    options: GenerationOptions,
    transcript: Mutex<Transcript>,
    events: broadcast::Sender<TranscriptEvent>,
    in_flight: Mutex<Option<Arc<InFlight>>>,
}

impl ChatSession {
    /// Creates a session with an empty transcript.
    pub fn new(client: RelayClient, options: GenerationOptions) -> Self {
        Self::with_messages(client, options, Vec::new())
    }

    /// Resumes a session from stored messages.
    pub fn with_messages(
        client: RelayClient,
        options: GenerationOptions,
        messages: Vec<Message>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            options,
            transcript: Mutex::new(Transcript::from_messages(messages)),
            events,
            in_flight: Mutex::new(None),
        }
    }

    /// Receive transcript changes as they happen.
    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the transcript.
    pub async fn messages(&self) -> Vec<Message> {
        self.transcript.lock().await.messages().to_vec()
    }

    /// Whether a request is in flight.
    pub async fn is_busy(&self) -> bool {
        self.in_flight.lock().await.is_some()
    }

    /// Removes a message.
    ///
    /// Removing the placeholder of the reply in flight abandons that request;
    /// no token reaches the transcript for it afterwards.
    pub async fn remove_message(&self, id: &MessageId) -> bool {
        if self.transcript.lock().await.remove(id).is_none() {
            return false;
        }
        let mut slot = self.in_flight.lock().await;
        let streaming_into_removed = slot
            .as_ref()
            .is_some_and(|flight| flight.placeholder.get() == Some(id));
        if streaming_into_removed {
            if let Some(flight) = slot.take() {
                flight.cancelled.store(true, Ordering::SeqCst);
                flight.abort.abort();
                info!(message = %id, "Abandoned reply whose placeholder was removed");
            }
        }
        true
    }

    /// Drops the message at `index` and everything after it.
    pub async fn truncate_from(&self, index: usize) {
        self.transcript.lock().await.truncate_from(index);
    }

    /// Send a message with already uploaded attachments.
    ///
    /// The user message is appended before anything goes over the network.
    /// Every failure after that appends an error entry and is reported as
    /// [`SendOutcome::Failed`].
    ///
    /// # Errors
    ///
    /// `EmptyMessage` if there is neither text nor an attachment; the
    /// transcript is left untouched.
    #[instrument(
        skip(self, text, attachments),
        fields(text_len = text.len(), attachments = attachments.len())
    )]
    pub async fn send(
        &self,
        text: &str,
        attachments: Vec<ResolvedFile>,
    ) -> ClientResult<SendOutcome> {
        if text.trim().is_empty() && attachments.is_empty() {
            return Err(ClientError::new(ClientErrorKind::EmptyMessage));
        }
        if self.cancel().await {
            debug!("Superseded the previous request");
        }

        let mut parts = Vec::with_capacity(attachments.len() + 1);
        if !text.is_empty() {
            parts.push(Part::text(text));
        }
        parts.extend(attachments.iter().map(|file| Part::image(file.reference.clone())));
        self.add_message(Message::new(Role::User, parts)).await;

        let references = attachments.into_iter().map(|file| file.reference).collect();
        let request = GenerationRequest::new(text, references, &self.options);

        let (abort, registration) = AbortHandle::new_pair();
        let flight = Arc::new(InFlight {
            abort,
            cancelled: AtomicBool::new(false),
            placeholder: OnceLock::new(),
        });
        *self.in_flight.lock().await = Some(flight.clone());

        let outcome = match Abortable::new(self.exchange(&request, &flight), registration).await {
            Ok(outcome) => outcome,
            Err(_aborted) => SendOutcome::Cancelled {
                placeholder: flight.placeholder.get().cloned(),
            },
        };

        let mut slot = self.in_flight.lock().await;
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, &flight)) {
            *slot = None;
        }
        Ok(outcome)
    }

    /// Abandon the in-flight request, if any.
    ///
    /// Its placeholder is marked cancelled and the response body is dropped,
    /// closing the connection. Returns `false` if nothing was in flight.
    pub async fn cancel(&self) -> bool {
        let Some(flight) = self.in_flight.lock().await.take() else {
            return false;
        };
        {
            let mut transcript = self.transcript.lock().await;
            flight.cancelled.store(true, Ordering::SeqCst);
            if let Some(id) = flight.placeholder.get() {
                if transcript.finish(id, MessageStatus::Cancelled) {
                    self.emit(TranscriptEvent::MessageFinished {
                        id: id.clone(),
                        status: MessageStatus::Cancelled,
                    });
                }
            }
        }
        flight.abort.abort();
        info!("Cancelled in-flight request");
        true
    }

    async fn exchange(&self, request: &GenerationRequest, flight: &InFlight) -> SendOutcome {
        let reply = match self.client.generate(request).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(e).await,
        };

        match reply {
            GenerationReply::Buffered(body) => match body.text() {
                Some(text) => {
                    let mut transcript = self.transcript.lock().await;
                    if flight.is_cancelled() {
                        return SendOutcome::Cancelled { placeholder: None };
                    }
                    let message = Message::assistant(text);
                    let id = transcript.push(message.clone());
                    self.emit(TranscriptEvent::MessageAdded(message));
                    debug!(message = %id, "Buffered reply appended");
                    SendOutcome::Buffered { message: id }
                }
                None => {
                    let reason = body
                        .error()
                        .clone()
                        .unwrap_or_else(|| "reply contained no text".to_string());
                    self.fail(ClientError::new(ClientErrorKind::InvalidResponse(reason)))
                        .await
                }
            },
            GenerationReply::Stream(stream) => self.consume_stream(stream, flight).await,
        }
    }

    async fn consume_stream(&self, mut stream: ReplyStream, flight: &InFlight) -> SendOutcome {
        let placeholder = {
            let mut transcript = self.transcript.lock().await;
            if flight.is_cancelled() {
                return SendOutcome::Cancelled { placeholder: None };
            }
            let message = Message::placeholder();
            let id = transcript.push(message.clone());
            let _ = flight.placeholder.set(id.clone());
            self.emit(TranscriptEvent::MessageAdded(message));
            id
        };

        let mut decoder = RecordDecoder::new();
        let mut tokens = 0;
        let mut malformed = 0;
        loop {
            let (records, ended) = match stream.next().await {
                Some(Ok(chunk)) => (decoder.push(&chunk), false),
                Some(Err(e)) => return self.interrupt(&placeholder, e).await,
                None => (decoder.finish().into_iter().collect(), true),
            };

            for record in records {
                match record {
                    StreamRecord::Token(token) => {
                        if !self.append_token(&placeholder, token).await {
                            debug!(message = %placeholder, "Placeholder gone, abandoning stream");
                            return SendOutcome::Cancelled {
                                placeholder: Some(placeholder),
                            };
                        }
                        tokens += 1;
                    }
                    StreamRecord::Done => {
                        return self.complete(placeholder, tokens, malformed).await;
                    }
                    StreamRecord::Other => {}
                    StreamRecord::Malformed(raw) => {
                        malformed += 1;
                        let err = ClientErrorKind::StreamParse(raw);
                        warn!(error = %err, "Skipping stream record");
                    }
                }
            }

            if ended {
                warn!(tokens, "Stream ended without end marker");
                return self.complete(placeholder, tokens, malformed).await;
            }
        }
    }

    async fn append_token(&self, id: &MessageId, token: String) -> bool {
        let mut transcript = self.transcript.lock().await;
        if !transcript.append_token(id, &token) {
            return false;
        }
        self.emit(TranscriptEvent::TokenAppended {
            id: id.clone(),
            token,
        });
        true
    }

    async fn complete(&self, id: MessageId, tokens: usize, malformed: usize) -> SendOutcome {
        let mut transcript = self.transcript.lock().await;
        if !transcript.finish(&id, MessageStatus::Complete) {
            return SendOutcome::Cancelled {
                placeholder: Some(id),
            };
        }
        self.emit(TranscriptEvent::MessageFinished {
            id: id.clone(),
            status: MessageStatus::Complete,
        });
        debug!(message = %id, tokens, malformed, "Stream complete");
        SendOutcome::Streamed {
            message: id,
            tokens,
            malformed,
        }
    }

    async fn interrupt(&self, id: &MessageId, error: ClientError) -> SendOutcome {
        let mut transcript = self.transcript.lock().await;
        if !transcript.finish(id, MessageStatus::Interrupted) {
            return SendOutcome::Cancelled {
                placeholder: Some(id.clone()),
            };
        }
        self.emit(TranscriptEvent::MessageFinished {
            id: id.clone(),
            status: MessageStatus::Interrupted,
        });
        warn!(error = %error, "Stream interrupted");
        self.push_error(&mut transcript, error)
    }

    async fn fail(&self, error: ClientError) -> SendOutcome {
        let mut transcript = self.transcript.lock().await;
        warn!(error = %error, "Send failed");
        self.push_error(&mut transcript, error)
    }

    fn push_error(&self, transcript: &mut Transcript, error: ClientError) -> SendOutcome {
        let message = Message::error(format!("Failed to send message: {}", error.kind));
        let id = transcript.push(message.clone());
        self.emit(TranscriptEvent::MessageAdded(message));
        SendOutcome::Failed {
            error_message: id,
            error,
        }
    }

    async fn add_message(&self, message: Message) -> MessageId {
        let id = self.transcript.lock().await.push(message.clone());
        self.emit(TranscriptEvent::MessageAdded(message));
        id
    }

    fn emit(&self, event: TranscriptEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
