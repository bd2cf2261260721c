use std::future::Future;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::codec::WireCodec;
use crate::decoder::Utf8StreamDecoder;
use crate::dispatch::{DeltaSink, Dispatcher};
use crate::errors::StreamError;
use crate::message::StreamRequest;
use crate::transport::StreamTransport;

/// Lifecycle of one streaming session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Requesting,
    Streaming,
    Completed,
    Failed,
}

/// Handle used to request cancellation of a running session.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Best-effort: the session observes it at its next suspension point and
    /// reports `StreamError::Cancelled` through `on_error`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiving side of an [`AbortHandle`].
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortSignal {
    /// Resolves once abort was requested. Never resolves if every handle was
    /// dropped without aborting.
    async fn aborted(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Creates a connected abort handle and signal.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

/// Per-call state for one request/response streaming lifecycle.
///
/// Owns the byte source while streaming; it is dropped (closing the
/// connection) on every exit path of [`StreamSession::run`].
pub struct StreamSession<'a, S> {
    id: uuid::Uuid,
    transport: &'a dyn StreamTransport,
    dispatcher: Dispatcher<S>,
    decoder: Utf8StreamDecoder,
    codec: WireCodec,
    abort: Option<AbortSignal>,
    phase: Phase,
}

impl<'a, S: DeltaSink> StreamSession<'a, S> {
    pub fn new(transport: &'a dyn StreamTransport, sink: S) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            transport,
            dispatcher: Dispatcher::new(sink),
            decoder: Utf8StreamDecoder::new(),
            codec: WireCodec::new(),
            abort: None,
            phase: Phase::Idle,
        }
    }

    /// Makes the session observe `signal` at every suspension point.
    pub fn with_abort(mut self, signal: AbortSignal) -> Self {
        self.abort = Some(signal);
        self
    }

    /// Uses a caller-chosen id in log records.
    pub fn with_id(mut self, id: uuid::Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Sends `request` and streams the reply into the sink.
    ///
    /// Returns the final phase: [`Phase::Completed`] or [`Phase::Failed`].
    pub async fn run(mut self, request: &StreamRequest) -> Phase {
        self.phase = Phase::Requesting;
        info!(session_id = %self.id, thread_id = %request.thread_id(), messages = request.messages().len(), "agent stream session started");

        let transport = self.transport;
        let mut source = match until_aborted(&mut self.abort, transport.open(request)).await {
            Some(Ok(source)) => source,
            Some(Err(err)) => return self.fail(err).await,
            None => return self.fail(StreamError::Cancelled).await,
        };

        self.phase = Phase::Streaming;
        loop {
            let pulled = match until_aborted(&mut self.abort, source.pull_next()).await {
                Some(pulled) => pulled,
                None => return self.fail(StreamError::Cancelled).await,
            };
            match pulled {
                Ok(Some(chunk)) => {
                    let text = self.decoder.decode(&chunk, false);
                    let content = self.codec.push(&text);
                    if !content.is_empty() {
                        debug!(session_id = %self.id, bytes = chunk.len(), chars = content.chars().count(), "agent text delta");
                        self.dispatcher.chunk(&content).await;
                    }
                    if self.dispatcher.sink_closed() {
                        debug!(session_id = %self.id, "consumer closed, stopping stream");
                        return self.fail(StreamError::Cancelled).await;
                    }
                }
                Ok(None) => {
                    let tail = self.decoder.finish();
                    let content = self.codec.push(&tail);
                    self.codec.finish();
                    self.dispatcher.chunk(&content).await;
                    return self.complete().await;
                }
                Err(err) => return self.fail(err).await,
            }
        }
    }

    /// Ends a session whose request could not be built. The transport is
    /// never called; the sink still sees exactly one `on_error`.
    pub async fn reject(self, error: StreamError) -> Phase {
        debug!(session_id = %self.id, %error, "agent stream request rejected");
        self.fail(error).await
    }

    async fn complete(mut self) -> Phase {
        self.phase = Phase::Completed;
        self.dispatcher.complete().await;
        info!(session_id = %self.id, chunks = self.dispatcher.chunks_sent(), "agent stream session completed");
        self.phase
    }

    async fn fail(mut self, error: StreamError) -> Phase {
        self.phase = Phase::Failed;
        info!(session_id = %self.id, %error, chunks = self.dispatcher.chunks_sent(), "agent stream session failed");
        self.dispatcher.fail(error).await;
        self.phase
    }
}

async fn until_aborted<F: Future>(signal: &mut Option<AbortSignal>, fut: F) -> Option<F::Output> {
    match signal {
        Some(signal) => tokio::select! {
            biased;
            _ = signal.aborted() => None,
            out = fut => Some(out),
        },
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_token;
    use crate::dispatch::tests::{Recorded, Recorder};
    use crate::message::{ChatMessage, RunParameters};
    use crate::transport::ByteSource;
    use bytes::Bytes;
    use futures::stream;
    use std::sync::Mutex;

    enum FakeBehavior {
        Status(u16, &'static str),
        Chunks(Vec<Result<Bytes, StreamError>>),
        Pending,
    }

    struct FakeTransport {
        behavior: Mutex<Option<FakeBehavior>>,
    }

    impl FakeTransport {
        fn new(behavior: FakeBehavior) -> Self {
            Self {
                behavior: Mutex::new(Some(behavior)),
            }
        }

        fn chunks<const N: usize>(chunks: [&'static str; N]) -> Self {
            Self::new(FakeBehavior::Chunks(
                chunks
                    .into_iter()
                    .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                    .collect(),
            ))
        }
    }

    #[async_trait::async_trait]
    impl StreamTransport for FakeTransport {
        async fn open(&self, _request: &StreamRequest) -> Result<ByteSource, StreamError> {
            let behavior = self
                .behavior
                .lock()
                .expect("lock")
                .take()
                .expect("transport opened once");
            match behavior {
                FakeBehavior::Status(status, reason) => Err(StreamError::status(status, reason)),
                FakeBehavior::Chunks(chunks) => Ok(ByteSource::from_chunks(chunks)),
                FakeBehavior::Pending => Ok(ByteSource::from_stream(stream::pending())),
            }
        }
    }

    fn request() -> StreamRequest {
        StreamRequest::from_history(
            &[ChatMessage::user("weather in Oslo?")],
            12345_i64,
            RunParameters::default(),
        )
        .expect("request")
    }

    async fn run_with(transport: &FakeTransport) -> (Phase, Recorder) {
        let mut recorder = Recorder::default();
        let phase = StreamSession::new(transport, &mut recorder)
            .run(&request())
            .await;
        (phase, recorder)
    }

    #[tokio::test]
    async fn three_chunk_stream_emits_per_chunk_then_completes_once() {
        let transport = FakeTransport::chunks([
            "f:{\"messageId\":\"msg-1\"}\n0:\"It is \"\n",
            "0:\"sunny \"\n0:\"and \"\n",
            "0:\"warm.\"\ne:{\"finishReason\":\"stop\"}\nd:{\"finishReason\":\"stop\"}\n",
        ]);
        let (phase, recorder) = run_with(&transport).await;
        assert_eq!(phase, Phase::Completed);
        assert_eq!(
            recorder.events,
            vec![
                Recorded::Chunk("It is ".into()),
                Recorded::Chunk("sunny and ".into()),
                Recorded::Chunk("warm.".into()),
                Recorded::Complete,
            ]
        );
    }

    #[tokio::test]
    async fn chunks_are_not_merged_across_pulls() {
        let transport = FakeTransport::chunks(["0:\"Hello, \"", "0:\"world!\""]);
        let (_, recorder) = run_with(&transport).await;
        assert_eq!(recorder.chunks(), vec!["Hello, ", "world!"]);
        assert_eq!(recorder.terminal_count(), 1);
    }

    #[tokio::test]
    async fn chunks_without_tokens_are_silent() {
        let transport = FakeTransport::chunks([
            "f:{\"messageId\":\"msg-1\"}\n",
            "0:\"only\"\n",
            "e:{\"finishReason\":\"stop\"}\n",
        ]);
        let (_, recorder) = run_with(&transport).await;
        assert_eq!(
            recorder.events,
            vec![Recorded::Chunk("only".into()), Recorded::Complete]
        );
    }

    #[tokio::test]
    async fn status_failure_emits_single_error_and_nothing_else() {
        let transport = FakeTransport::new(FakeBehavior::Status(500, "Internal Server Error"));
        let (phase, recorder) = run_with(&transport).await;
        assert_eq!(phase, Phase::Failed);
        assert_eq!(
            recorder.events,
            vec![Recorded::Error(StreamError::status(
                500,
                "Internal Server Error"
            ))]
        );
    }

    #[tokio::test]
    async fn read_failure_mid_stream_stops_after_single_error() {
        let transport = FakeTransport::new(FakeBehavior::Chunks(vec![
            Ok(Bytes::from(encode_token(0, "partial "))),
            Err(StreamError::read("connection reset")),
            Ok(Bytes::from(encode_token(0, "never seen"))),
        ]));
        let (phase, recorder) = run_with(&transport).await;
        assert_eq!(phase, Phase::Failed);
        assert_eq!(
            recorder.events,
            vec![
                Recorded::Chunk("partial ".into()),
                Recorded::Error(StreamError::read("connection reset")),
            ]
        );
    }

    #[tokio::test]
    async fn multibyte_char_split_between_chunks_reaches_sink_whole() {
        let line = encode_token(0, "21°C");
        let bytes = line.as_bytes();
        let cut = line.find('°').expect("degree sign") + 1;
        let transport = FakeTransport::new(FakeBehavior::Chunks(vec![
            Ok(Bytes::copy_from_slice(&bytes[..cut])),
            Ok(Bytes::copy_from_slice(&bytes[cut..])),
        ]));
        let (_, recorder) = run_with(&transport).await;
        assert_eq!(recorder.chunks().concat(), "21°C");
        assert!(!recorder.chunks().concat().contains(char::REPLACEMENT_CHARACTER));
    }

    #[tokio::test]
    async fn token_split_across_chunks_is_reassembled() {
        let transport = FakeTransport::chunks(["0:\"Rain expec", "ted later.\"\n"]);
        let (_, recorder) = run_with(&transport).await;
        assert_eq!(
            recorder.events,
            vec![
                Recorded::Chunk("Rain expected later.".into()),
                Recorded::Complete
            ]
        );
    }

    #[tokio::test]
    async fn abort_before_data_emits_cancelled_once() {
        let transport = FakeTransport::new(FakeBehavior::Pending);
        let (handle, signal) = abort_pair();
        let mut recorder = Recorder::default();
        let req = request();
        let session = StreamSession::new(&transport, &mut recorder).with_abort(signal);
        let run = session.run(&req);
        handle.abort();
        assert_eq!(run.await, Phase::Failed);
        assert_eq!(recorder.events, vec![Recorded::Error(StreamError::Cancelled)]);
    }

    #[tokio::test]
    async fn rejected_session_fails_once_without_opening() {
        let transport = FakeTransport::chunks(["0:\"unused\""]);
        let mut recorder = Recorder::default();
        let phase = StreamSession::new(&transport, &mut recorder)
            .reject(StreamError::invalid_request("no user turns"))
            .await;
        assert_eq!(phase, Phase::Failed);
        assert_eq!(
            recorder.events,
            vec![Recorded::Error(StreamError::invalid_request("no user turns"))]
        );
        assert!(transport.behavior.lock().expect("lock").is_some());
    }

    #[tokio::test]
    async fn dropped_abort_handle_does_not_cancel() {
        let transport = FakeTransport::chunks(["0:\"ok\""]);
        let (handle, signal) = abort_pair();
        drop(handle);
        let mut recorder = Recorder::default();
        let phase = StreamSession::new(&transport, &mut recorder)
            .with_abort(signal)
            .run(&request())
            .await;
        assert_eq!(phase, Phase::Completed);
        assert_eq!(recorder.chunks(), vec!["ok"]);
    }
}
