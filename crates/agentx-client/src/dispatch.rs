//! Stateful dispatcher for the chat progress stream.
//!
//! Bytes go in through [`StreamDispatcher::push_chunk`] (or a whole body
//! stream through [`StreamDispatcher::drive`]); every well-formed record is
//! handed to the matching callback in arrival order. A `complete` or `error`
//! record ends processing and everything after it is ignored.

use std::fmt;
use std::time::Duration;

use futures::{Stream, StreamExt as _};
use tracing::{debug, warn};

use crate::errors::ClientError;
use crate::event::{Completion, FileActivity, StreamEvent, TerminalActivity};
use crate::sse::{LineDecoder, record_payload};

type Callback<T> = Box<dyn FnMut(T) + Send>;

/// Optional callbacks, one per record action.
///
/// Callbacks run synchronously on the task that drives the stream.
#[derive(Default)]
pub struct StreamHandlers {
    on_message: Option<Callback<String>>,
    on_file_write: Option<Callback<FileActivity>>,
    on_file_read: Option<Callback<FileActivity>>,
    on_terminal: Option<Callback<TerminalActivity>>,
    on_complete: Option<Callback<Completion>>,
    on_error: Option<Callback<ClientError>>,
}

impl StreamHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress message callback.
    pub fn on_message(mut self, f: impl FnMut(String) + Send + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    /// Files written callback.
    pub fn on_file_write(mut self, f: impl FnMut(FileActivity) + Send + 'static) -> Self {
        self.on_file_write = Some(Box::new(f));
        self
    }

    /// Files read callback.
    pub fn on_file_read(mut self, f: impl FnMut(FileActivity) + Send + 'static) -> Self {
        self.on_file_read = Some(Box::new(f));
        self
    }

    /// Terminal command callback.
    pub fn on_terminal(mut self, f: impl FnMut(TerminalActivity) + Send + 'static) -> Self {
        self.on_terminal = Some(Box::new(f));
        self
    }

    /// Completion callback. Runs at most once per stream.
    pub fn on_complete(mut self, f: impl FnMut(Completion) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Error callback. Runs at most once per stream and receives every
    /// failure: transport, HTTP status, timeout, and server `error` records.
    pub fn on_error(mut self, f: impl FnMut(ClientError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub(crate) fn emit_error(&mut self, error: ClientError) {
        if let Some(cb) = self.on_error.as_mut() {
            cb(error);
        }
    }
}

impl fmt::Debug for StreamHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamHandlers")
            .field("on_message", &self.on_message.is_some())
            .field("on_file_write", &self.on_file_write.is_some())
            .field("on_file_read", &self.on_file_read.is_some())
            .field("on_terminal", &self.on_terminal.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Whether the dispatcher accepts more input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Continue,
    Terminated,
}

/// How a stream ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A `complete` record arrived.
    Completed,
    /// An `error` record, a transport failure, or a timeout ended the stream.
    Failed,
    /// The body ended without a terminal record.
    Closed,
}

/// Incremental record parser and dispatcher for one stream.
pub struct StreamDispatcher {
    decoder: LineDecoder,
    handlers: StreamHandlers,
    outcome: Option<StreamOutcome>,
    dispatched: u64,
    skipped: u64,
}

impl StreamDispatcher {
    pub fn new(handlers: StreamHandlers) -> Self {
        Self {
            decoder: LineDecoder::default(),
            handlers,
            outcome: None,
            dispatched: 0,
            skipped: 0,
        }
    }

    /// Records handed to a callback slot so far (including unset slots).
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Malformed records skipped so far.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Terminal outcome, once a terminal record or failure has been seen.
    pub fn outcome(&self) -> Option<StreamOutcome> {
        self.outcome
    }

    /// Feeds one body chunk and dispatches every record it completes.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> DispatchState {
        if self.outcome.is_some() {
            return DispatchState::Terminated;
        }
        for line in self.decoder.push_chunk(chunk) {
            if self.handle_line(&line) == DispatchState::Terminated {
                return DispatchState::Terminated;
            }
        }
        DispatchState::Continue
    }

    /// Processes any unterminated tail at end of stream and returns the outcome.
    ///
    /// Without a terminal record the outcome is [`StreamOutcome::Closed`] and
    /// no completion or error callback runs.
    pub fn finish(&mut self) -> StreamOutcome {
        if self.outcome.is_none()
            && let Some(tail) = self.decoder.finish()
        {
            self.handle_line(&tail);
        }
        *self.outcome.get_or_insert(StreamOutcome::Closed)
    }

    /// Reports a failure outside the record flow and terminates.
    pub fn fail(&mut self, error: ClientError) -> StreamOutcome {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        self.handlers.emit_error(error);
        self.outcome = Some(StreamOutcome::Failed);
        StreamOutcome::Failed
    }

    /// Reads `stream` to its end, one chunk at a time.
    ///
    /// Each chunk is fully dispatched before the next read. When
    /// `idle_timeout` is set, a read that waits longer than that fails the
    /// stream with [`ClientError::TimedOut`]. The stream is dropped on
    /// return, releasing the underlying connection.
    pub async fn drive<S, B, E>(mut self, stream: S, idle_timeout: Option<Duration>) -> StreamOutcome
    where
        S: Stream<Item = Result<B, E>>,
        B: AsRef<[u8]>,
        E: fmt::Display,
    {
        let mut stream = std::pin::pin!(stream);
        loop {
            let next = match idle_timeout {
                Some(after) => match tokio::time::timeout(after, stream.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            timeout_ms = after.as_millis() as u64,
                            "progress stream idle timeout"
                        );
                        return self.fail(ClientError::TimedOut { after });
                    }
                },
                None => stream.next().await,
            };
            match next {
                Some(Ok(chunk)) => {
                    if self.push_chunk(chunk.as_ref()) == DispatchState::Terminated {
                        return self.outcome.unwrap_or(StreamOutcome::Failed);
                    }
                }
                Some(Err(e)) => {
                    return self.fail(ClientError::transport(format!(
                        "progress stream read failed: {e}"
                    )));
                }
                None => {
                    let outcome = self.finish();
                    debug!(
                        dispatched = self.dispatched,
                        skipped = self.skipped,
                        ?outcome,
                        "progress stream ended"
                    );
                    return outcome;
                }
            }
        }
    }

    fn handle_line(&mut self, line: &str) -> DispatchState {
        let Some(payload) = record_payload(line) else {
            return DispatchState::Continue;
        };
        match StreamEvent::parse(payload) {
            Ok(event) => self.dispatch(event),
            Err(e) => {
                self.skipped += 1;
                warn!(error = %e, record_len = payload.len(), "skipping malformed stream record");
                DispatchState::Continue
            }
        }
    }

    fn dispatch(&mut self, event: StreamEvent) -> DispatchState {
        self.dispatched += 1;
        debug!(action = event.action(), seq = self.dispatched, "stream record");
        let handlers = &mut self.handlers;
        match event {
            StreamEvent::Message { message, .. } => {
                if let Some(cb) = handlers.on_message.as_mut() {
                    cb(message);
                }
            }
            StreamEvent::FileWrite { message, data, .. } => {
                if let Some(cb) = handlers.on_file_write.as_mut() {
                    cb(FileActivity::from_record(data, message));
                }
            }
            StreamEvent::FileRead { message, data, .. } => {
                if let Some(cb) = handlers.on_file_read.as_mut() {
                    cb(FileActivity::from_record(data, message));
                }
            }
            StreamEvent::Terminal { message, data, .. } => {
                if let Some(cb) = handlers.on_terminal.as_mut() {
                    cb(TerminalActivity::from_record(data, message));
                }
            }
            StreamEvent::Complete { message, data, .. } => {
                if let Some(cb) = handlers.on_complete.as_mut() {
                    cb(Completion::from_record(data, message));
                }
                self.outcome = Some(StreamOutcome::Completed);
                return DispatchState::Terminated;
            }
            StreamEvent::Error { message, .. } => {
                handlers.emit_error(ClientError::server(message));
                self.outcome = Some(StreamOutcome::Failed);
                return DispatchState::Terminated;
            }
        }
        DispatchState::Continue
    }
}

impl fmt::Debug for StreamDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDispatcher")
            .field("handlers", &self.handlers)
            .field("outcome", &self.outcome)
            .field("dispatched", &self.dispatched)
            .field("skipped", &self.skipped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Message(String),
        FileWrite(Vec<String>, String),
        FileRead(Vec<String>, String),
        Terminal(Option<String>, Option<String>, String),
        Complete(Completion),
        Error(ClientError),
    }

    fn recording_handlers() -> (StreamHandlers, Arc<Mutex<Vec<Seen>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handlers = StreamHandlers::new()
            .on_message({
                let seen = seen.clone();
                move |m| seen.lock().expect("lock").push(Seen::Message(m))
            })
            .on_file_write({
                let seen = seen.clone();
                move |a| seen.lock().expect("lock").push(Seen::FileWrite(a.files, a.message))
            })
            .on_file_read({
                let seen = seen.clone();
                move |a| seen.lock().expect("lock").push(Seen::FileRead(a.files, a.message))
            })
            .on_terminal({
                let seen = seen.clone();
                move |t| {
                    seen.lock()
                        .expect("lock")
                        .push(Seen::Terminal(t.command, t.output, t.message))
                }
            })
            .on_complete({
                let seen = seen.clone();
                move |c| seen.lock().expect("lock").push(Seen::Complete(c))
            })
            .on_error({
                let seen = seen.clone();
                move |e| seen.lock().expect("lock").push(Seen::Error(e))
            });
        (handlers, seen)
    }

    fn taken(seen: &Arc<Mutex<Vec<Seen>>>) -> Vec<Seen> {
        std::mem::take(&mut *seen.lock().expect("lock"))
    }

    const BODY: &str = concat!(
        "data: {\"action\":\"message\",\"message\":\"Thinking…\",\"timestamp\":1}\n\n",
        "data: {\"action\":\"file_write\",\"message\":\"Updating files...\",\"timestamp\":2,\"data\":{\"files\":[\"/app/page.tsx\",\"/app/ünï.css\"]}}\n\n",
        "data: {\"action\":\"file_read\",\"message\":\"Reading files...\",\"timestamp\":3}\n\n",
        "data: {\"action\":\"terminal\",\"message\":\"Executing terminal command...\",\"timestamp\":4,\"data\":{\"command\":\"npm i\"}}\n\n",
        "data: {\"action\":\"complete\",\"message\":\"Task completed.\",\"timestamp\":5,\"data\":{\"sandbox_id\":\"sb-1\",\"summary\":\"Built a todo app ✓\"}}\n\n",
    );

    fn expected_body_events() -> Vec<Seen> {
        vec![
            Seen::Message("Thinking…".into()),
            Seen::FileWrite(
                vec!["/app/page.tsx".into(), "/app/ünï.css".into()],
                "Updating files...".into(),
            ),
            Seen::FileRead(Vec::new(), "Reading files...".into()),
            Seen::Terminal(
                Some("npm i".into()),
                None,
                "Executing terminal command...".into(),
            ),
            Seen::Complete(Completion {
                sandbox_id: Some("sb-1".into()),
                summary: "Built a todo app ✓".into(),
                title: None,
                url: None,
                files: Vec::new(),
            }),
        ]
    }

    #[test]
    fn dispatch_is_independent_of_chunk_boundaries() {
        let bytes = BODY.as_bytes();
        for split in 0..=bytes.len() {
            let (handlers, seen) = recording_handlers();
            let mut dispatcher = StreamDispatcher::new(handlers);
            dispatcher.push_chunk(&bytes[..split]);
            dispatcher.push_chunk(&bytes[split..]);
            assert_eq!(dispatcher.finish(), StreamOutcome::Completed, "split at {split}");
            assert_eq!(taken(&seen), expected_body_events(), "split at {split}");
        }
    }

    proptest! {
        /// Any set of cut points yields the same callbacks in the same order.
        #[test]
        fn dispatch_survives_arbitrary_chunking(
            mut cuts in prop::collection::vec(0..=BODY.len(), 0..24)
        ) {
            let bytes = BODY.as_bytes();
            cuts.sort_unstable();
            let (handlers, seen) = recording_handlers();
            let mut dispatcher = StreamDispatcher::new(handlers);
            let mut start = 0;
            for cut in cuts {
                dispatcher.push_chunk(&bytes[start..cut]);
                start = cut;
            }
            dispatcher.push_chunk(&bytes[start..]);
            prop_assert_eq!(dispatcher.finish(), StreamOutcome::Completed);
            prop_assert_eq!(dispatcher.skipped(), 0);
            prop_assert_eq!(taken(&seen), expected_body_events());
        }
    }

    #[test]
    fn byte_at_a_time_delivery_dispatches_all_records() {
        let (handlers, seen) = recording_handlers();
        let mut dispatcher = StreamDispatcher::new(handlers);
        for b in BODY.as_bytes() {
            dispatcher.push_chunk(std::slice::from_ref(b));
        }
        assert_eq!(dispatcher.finish(), StreamOutcome::Completed);
        assert_eq!(dispatcher.dispatched(), 5);
        assert_eq!(taken(&seen), expected_body_events());
    }

    #[test]
    fn malformed_record_is_skipped_and_stream_continues() {
        let (handlers, seen) = recording_handlers();
        let mut dispatcher = StreamDispatcher::new(handlers);
        let state = dispatcher.push_chunk(
            concat!(
                "data: {\"action\":\"message\",\"message\":\"one\"}\n",
                "data: {not json\n",
                "data: {\"action\":\"file_creation\",\"message\":\"legacy\"}\n",
                "data: {\"action\":\"message\",\"message\":\"two\"}\n",
            )
            .as_bytes(),
        );
        assert_eq!(state, DispatchState::Continue);
        assert_eq!(dispatcher.skipped(), 2);
        assert_eq!(
            taken(&seen),
            vec![Seen::Message("one".into()), Seen::Message("two".into())]
        );
    }

    #[test]
    fn complete_stops_processing_of_the_rest_of_the_chunk() {
        let (handlers, seen) = recording_handlers();
        let mut dispatcher = StreamDispatcher::new(handlers);
        let state = dispatcher.push_chunk(
            concat!(
                "data: {\"action\":\"complete\",\"message\":\"ok\",\"timestamp\":1,\"data\":{\"sandbox_id\":\"s1\",\"summary\":\"done\"}}\n",
                "data: {\"action\":\"message\",\"message\":\"late\"}\n",
            )
            .as_bytes(),
        );
        assert_eq!(state, DispatchState::Terminated);
        assert_eq!(
            dispatcher.push_chunk(b"data: {\"action\":\"message\",\"message\":\"later\"}\n"),
            DispatchState::Terminated
        );
        assert_eq!(dispatcher.finish(), StreamOutcome::Completed);
        assert_eq!(
            taken(&seen),
            vec![Seen::Complete(Completion {
                sandbox_id: Some("s1".into()),
                summary: "done".into(),
                title: None,
                url: None,
                files: Vec::new(),
            })]
        );
    }

    #[test]
    fn error_record_is_terminal() {
        let (handlers, seen) = recording_handlers();
        let mut dispatcher = StreamDispatcher::new(handlers);
        dispatcher.push_chunk(
            concat!(
                "data: {\"action\":\"error\",\"message\":\"boom\",\"timestamp\":1}\n",
                "data: {\"action\":\"complete\",\"message\":\"ok\"}\n",
            )
            .as_bytes(),
        );
        assert_eq!(dispatcher.finish(), StreamOutcome::Failed);
        let seen = taken(&seen);
        assert_eq!(seen.len(), 1);
        match &seen[0] {
            Seen::Error(err) => assert_eq!(err.message(), "boom"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn eof_without_terminal_record_is_quiet() {
        let (handlers, seen) = recording_handlers();
        let mut dispatcher = StreamDispatcher::new(handlers);
        dispatcher.push_chunk(b"data: {\"action\":\"message\",\"message\":\"working\"}\n");
        assert_eq!(dispatcher.finish(), StreamOutcome::Closed);
        assert_eq!(taken(&seen), vec![Seen::Message("working".into())]);
    }

    #[test]
    fn unterminated_final_record_is_dispatched_at_eof() {
        let (handlers, seen) = recording_handlers();
        let mut dispatcher = StreamDispatcher::new(handlers);
        dispatcher.push_chunk(b"data: {\"action\":\"message\",\"message\":\"tail\"}");
        assert!(taken(&seen).is_empty());
        assert_eq!(dispatcher.finish(), StreamOutcome::Closed);
        assert_eq!(taken(&seen), vec![Seen::Message("tail".into())]);
    }

    #[test]
    fn missing_callbacks_are_ignored() {
        let mut dispatcher = StreamDispatcher::new(StreamHandlers::new());
        let state = dispatcher.push_chunk(BODY.as_bytes());
        assert_eq!(state, DispatchState::Terminated);
        assert_eq!(dispatcher.dispatched(), 5);
        assert_eq!(dispatcher.outcome(), Some(StreamOutcome::Completed));
    }

    #[tokio::test]
    async fn drive_consumes_chunked_stream_in_order() {
        let bytes = BODY.as_bytes();
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            bytes.chunks(7).map(|c| Ok(c.to_vec())).collect();
        let (handlers, seen) = recording_handlers();
        let outcome = StreamDispatcher::new(handlers)
            .drive(stream::iter(chunks), None)
            .await;
        assert_eq!(outcome, StreamOutcome::Completed);
        assert_eq!(taken(&seen), expected_body_events());
    }

    #[tokio::test]
    async fn drive_stops_reading_after_terminal_record() {
        let reads = Arc::new(Mutex::new(0_usize));
        let chunks = vec![
            "data: {\"action\":\"error\",\"message\":\"boom\"}\n",
            "data: {\"action\":\"message\",\"message\":\"never\"}\n",
        ];
        let counted = stream::iter(chunks).map({
            let reads = reads.clone();
            move |c| {
                *reads.lock().expect("lock") += 1;
                Ok::<_, std::io::Error>(c.as_bytes().to_vec())
            }
        });
        let (handlers, seen) = recording_handlers();
        let outcome = StreamDispatcher::new(handlers).drive(counted, None).await;
        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(*reads.lock().expect("lock"), 1);
        assert_eq!(taken(&seen).len(), 1);
    }

    #[tokio::test]
    async fn drive_reports_read_failure_once() {
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"data: {\"action\":\"message\",\"message\":\"a\"}\n".to_vec()),
            Err(std::io::Error::other("connection reset")),
        ];
        let (handlers, seen) = recording_handlers();
        let outcome = StreamDispatcher::new(handlers)
            .drive(stream::iter(chunks), None)
            .await;
        assert_eq!(outcome, StreamOutcome::Failed);
        let seen = taken(&seen);
        assert_eq!(seen.len(), 2);
        assert!(matches!(
            &seen[1],
            Seen::Error(ClientError::Transport { message }) if message.contains("connection reset")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn drive_times_out_on_idle_stream() {
        let first = stream::iter(vec![Ok::<_, std::io::Error>(
            b"data: {\"action\":\"message\",\"message\":\"a\"}\n".to_vec(),
        )]);
        let hung = first.chain(stream::pending());
        let (handlers, seen) = recording_handlers();
        let outcome = StreamDispatcher::new(handlers)
            .drive(hung, Some(Duration::from_secs(30)))
            .await;
        assert_eq!(outcome, StreamOutcome::Failed);
        assert_eq!(
            taken(&seen),
            vec![
                Seen::Message("a".into()),
                Seen::Error(ClientError::TimedOut {
                    after: Duration::from_secs(30)
                }),
            ]
        );
    }
}
