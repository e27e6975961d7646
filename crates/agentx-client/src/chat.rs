//! Chat transcript driven by the progress stream.
//!
//! Each send appends the user's message and an assistant placeholder, then
//! rewrites only that placeholder (found by id) as records arrive.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::client::ApiClient;
use crate::dispatch::{StreamHandlers, StreamOutcome};
use crate::errors::ClientError;

/// Text shown in place of a placeholder whose stream failed.
pub const RETRY_MESSAGE: &str =
    "Sorry, something went wrong while building your app. Please try again.";

/// Initial placeholder text before the first record arrives.
pub const PENDING_MESSAGE: &str = "Thinking...";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Lifecycle of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageStatus {
    /// Placeholder still receiving progress.
    Pending,
    Completed,
    Failed,
    /// The stream ended without a terminal record; content is the last progress text.
    Closed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub id: uuid::Uuid,
    pub role: Role,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

/// Messages of one project plus what the last completion reported.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    sandbox_id: Option<String>,
    preview_url: Option<String>,
    title: Option<String>,
    written_files: Vec<String>,
}

impl Transcript {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn message(&self, id: uuid::Uuid) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Sandbox reported by the latest completion.
    pub fn sandbox_id(&self) -> Option<&str> {
        self.sandbox_id.as_deref()
    }

    /// Preview URL reported by the latest completion.
    pub fn preview_url(&self) -> Option<&str> {
        self.preview_url.as_deref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Files the latest completion reported as written. A codebase view
    /// refreshes its listing when this changes.
    pub fn written_files(&self) -> &[String] {
        &self.written_files
    }

    fn push(&mut self, role: Role, content: String, status: MessageStatus) -> uuid::Uuid {
        let id = uuid::Uuid::new_v4();
        self.messages.push(ChatMessage {
            id,
            role,
            content,
            status,
            created_at: Utc::now(),
        });
        id
    }

    fn update(&mut self, id: uuid::Uuid, f: impl FnOnce(&mut ChatMessage)) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            f(message);
        }
    }
}

/// Result of one [`ChatSession::send`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendReport {
    pub placeholder_id: uuid::Uuid,
    pub outcome: StreamOutcome,
}

/// Chat against one project.
pub struct ChatSession {
    client: ApiClient,
    project_id: uuid::Uuid,
    transcript: Arc<Mutex<Transcript>>,
    turn: tokio::sync::Mutex<()>,
}

impl ChatSession {
    pub fn new(client: ApiClient, project_id: uuid::Uuid) -> Self {
        Self {
            client,
            project_id,
            transcript: Arc::new(Mutex::new(Transcript::default())),
            turn: tokio::sync::Mutex::new(()),
        }
    }

    pub fn project_id(&self) -> uuid::Uuid {
        self.project_id
    }

    /// Snapshot of the transcript.
    pub fn transcript(&self) -> Transcript {
        lock(&self.transcript).clone()
    }

    /// Sends `message` and follows its progress stream to the end.
    ///
    /// Sends on one session run one at a time; a second call waits for the
    /// first stream to finish before its own placeholder is created.
    pub async fn send(&self, message: impl Into<String>) -> Result<SendReport, ClientError> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(ClientError::Validation(
                "chat message must not be empty".into(),
            ));
        }

        let _turn = self.turn.lock().await;
        let placeholder_id = {
            let mut transcript = lock(&self.transcript);
            transcript.push(Role::User, message.clone(), MessageStatus::Completed);
            transcript.push(
                Role::Assistant,
                PENDING_MESSAGE.to_string(),
                MessageStatus::Pending,
            )
        };
        debug!(project_id = %self.project_id, %placeholder_id, "chat send started");

        let handlers = placeholder_handlers(self.transcript.clone(), placeholder_id);
        let outcome = self
            .client
            .stream_chat(self.project_id, &message, handlers)
            .await;
        if outcome == StreamOutcome::Closed {
            lock(&self.transcript).update(placeholder_id, |m| m.status = MessageStatus::Closed);
        }
        Ok(SendReport {
            placeholder_id,
            outcome,
        })
    }
}

fn lock(transcript: &Mutex<Transcript>) -> std::sync::MutexGuard<'_, Transcript> {
    transcript.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Callbacks that rewrite the placeholder `id` inside `transcript`.
pub(crate) fn placeholder_handlers(
    transcript: Arc<Mutex<Transcript>>,
    id: uuid::Uuid,
) -> StreamHandlers {
    let progress = move |transcript: Arc<Mutex<Transcript>>| {
        move |text: String| {
            lock(&transcript).update(id, |m| m.content = text);
        }
    };
    let on_message = progress(transcript.clone());
    let on_file_write = progress(transcript.clone());
    let on_file_read = progress(transcript.clone());
    let on_terminal = progress(transcript.clone());
    let on_complete = {
        let transcript = transcript.clone();
        move |completion: crate::event::Completion| {
            let mut transcript = lock(&transcript);
            transcript.update(id, |m| {
                m.content = completion.summary;
                m.status = MessageStatus::Completed;
            });
            if completion.sandbox_id.is_some() {
                transcript.sandbox_id = completion.sandbox_id;
            }
            if completion.url.is_some() {
                transcript.preview_url = completion.url;
            }
            if completion.title.is_some() {
                transcript.title = completion.title;
            }
            transcript.written_files = completion.files;
        }
    };
    let on_error = move |error: ClientError| {
        debug!(%id, %error, "chat placeholder failed");
        lock(&transcript).update(id, |m| {
            m.content = RETRY_MESSAGE.to_string();
            m.status = MessageStatus::Failed;
        });
    };

    StreamHandlers::new()
        .on_message(on_message)
        .on_file_write(move |activity| on_file_write(activity.message))
        .on_file_read(move |activity| on_file_read(activity.message))
        .on_terminal(move |activity| on_terminal(activity.message))
        .on_complete(on_complete)
        .on_error(on_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::StreamDispatcher;

    fn transcript_with_placeholder() -> (Arc<Mutex<Transcript>>, uuid::Uuid, uuid::Uuid) {
        let mut transcript = Transcript::default();
        let other = transcript.push(Role::Assistant, "earlier".into(), MessageStatus::Completed);
        let id = transcript.push(
            Role::Assistant,
            PENDING_MESSAGE.into(),
            MessageStatus::Pending,
        );
        (Arc::new(Mutex::new(transcript)), id, other)
    }

    #[test]
    fn progress_then_completion_rewrites_only_the_placeholder() {
        let (transcript, id, other) = transcript_with_placeholder();
        let mut dispatcher = StreamDispatcher::new(placeholder_handlers(transcript.clone(), id));
        dispatcher.push_chunk(
            b"data: {\"action\":\"file_write\",\"message\":\"Updating files...\",\"data\":{\"files\":[\"/a\"]}}\n",
        );
        assert_eq!(
            lock(&transcript).message(id).map(|m| m.content.clone()),
            Some("Updating files...".to_string())
        );
        dispatcher.push_chunk(
            b"data: {\"action\":\"complete\",\"message\":\"Task completed.\",\"data\":{\"sandbox_id\":\"sb\",\"summary\":\"Built it\",\"url\":\"https://sb.example\",\"title\":\"Todo\",\"files\":[\"/app/page.tsx\"]}}\n",
        );
        assert_eq!(dispatcher.finish(), StreamOutcome::Completed);

        let transcript = lock(&transcript);
        let placeholder = transcript.message(id).expect("placeholder");
        assert_eq!(placeholder.content, "Built it");
        assert_eq!(placeholder.status, MessageStatus::Completed);
        assert_eq!(transcript.sandbox_id(), Some("sb"));
        assert_eq!(transcript.preview_url(), Some("https://sb.example"));
        assert_eq!(transcript.title(), Some("Todo"));
        assert_eq!(transcript.written_files(), ["/app/page.tsx".to_string()]);
        assert_eq!(
            transcript.message(other).map(|m| m.content.as_str()),
            Some("earlier")
        );
    }

    #[test]
    fn error_replaces_placeholder_with_retry_message() {
        let (transcript, id, _) = transcript_with_placeholder();
        let mut dispatcher = StreamDispatcher::new(placeholder_handlers(transcript.clone(), id));
        dispatcher.push_chunk(b"data: {\"action\":\"error\",\"message\":\"Error: sandbox died\"}\n");
        assert_eq!(dispatcher.finish(), StreamOutcome::Failed);
        let transcript = lock(&transcript);
        let placeholder = transcript.message(id).expect("placeholder");
        assert_eq!(placeholder.content, RETRY_MESSAGE);
        assert_eq!(placeholder.status, MessageStatus::Failed);
    }

    #[test]
    fn quiet_close_keeps_last_progress_text() {
        let (transcript, id, _) = transcript_with_placeholder();
        let mut dispatcher = StreamDispatcher::new(placeholder_handlers(transcript.clone(), id));
        dispatcher.push_chunk(b"data: {\"action\":\"terminal\",\"message\":\"Executing terminal command...\"}\n");
        assert_eq!(dispatcher.finish(), StreamOutcome::Closed);
        let transcript = lock(&transcript);
        let placeholder = transcript.message(id).expect("placeholder");
        assert_eq!(placeholder.content, "Executing terminal command...");
        assert_eq!(placeholder.status, MessageStatus::Pending);
    }

    #[tokio::test]
    async fn send_rejects_blank_message_without_touching_transcript() {
        let client = ApiClient::builder(crate::ClientConfig::default())
            .build()
            .expect("client");
        let session = ChatSession::new(client, uuid::Uuid::new_v4());
        let err = session.send("  ").await.expect_err("blank");
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(session.transcript().messages().is_empty());
    }
}
