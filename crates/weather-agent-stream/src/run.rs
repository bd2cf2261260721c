use std::sync::Arc;

use tokio::sync::mpsc;

use crate::dispatch::DeltaSink;
use crate::errors::{ClientError, StreamError};
use crate::message::StreamRequest;
use crate::session::{AbortHandle, StreamSession, abort_pair};
use crate::transport::StreamTransport;

/// Events yielded by [`AgentStream`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Text extracted from one pulled chunk.
    Delta {
        session_id: uuid::Uuid,
        seq: u64,
        text: String,
    },
    /// Terminal success event.
    Completed { session_id: uuid::Uuid },
    /// Terminal failure event.
    Error {
        session_id: uuid::Uuid,
        error: StreamError,
    },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}

struct ChannelSink {
    session_id: uuid::Uuid,
    tx: mpsc::Sender<StreamEvent>,
    seq: u64,
    closed: bool,
}

impl ChannelSink {
    async fn send(&mut self, event: StreamEvent) {
        if self.tx.send(event).await.is_err() {
            self.closed = true;
        }
    }
}

#[async_trait::async_trait]
impl DeltaSink for ChannelSink {
    async fn on_chunk(&mut self, text: &str) {
        let event = StreamEvent::Delta {
            session_id: self.session_id,
            seq: self.seq,
            text: text.to_string(),
        };
        self.seq = self.seq.saturating_add(1);
        self.send(event).await;
    }

    async fn on_complete(&mut self) {
        let event = StreamEvent::Completed {
            session_id: self.session_id,
        };
        self.send(event).await;
    }

    async fn on_error(&mut self, error: StreamError) {
        let event = StreamEvent::Error {
            session_id: self.session_id,
            error,
        };
        self.send(event).await;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Channel-backed handle over a session running on its own task.
///
/// Use `next_event()` to consume events as they arrive and `finish()` to obtain
/// the full reply after the terminal event. Dropping the handle aborts the
/// session, which releases the connection.
pub struct AgentStream {
    session_id: uuid::Uuid,
    rx: mpsc::Receiver<StreamEvent>,
    abort_handle: AbortHandle,
    text: String,
    outcome: Option<Result<(), StreamError>>,
}

impl AgentStream {
    pub(crate) fn spawn(
        transport: Arc<dyn StreamTransport>,
        request: StreamRequest,
        buffer_capacity: usize,
    ) -> Self {
        let session_id = uuid::Uuid::new_v4();
        let (tx, rx) = mpsc::channel(buffer_capacity);
        let (abort_handle, signal) = abort_pair();
        let sink = ChannelSink {
            session_id,
            tx,
            seq: 0,
            closed: false,
        };
        tokio::spawn(async move {
            StreamSession::new(transport.as_ref(), sink)
                .with_id(session_id)
                .with_abort(signal)
                .run(&request)
                .await;
        });
        Self {
            session_id,
            rx,
            abort_handle,
            text: String::new(),
            outcome: None,
        }
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    /// Returns a handle that can cancel the session.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next event. Returns `None` once the session task is gone.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let event = self.rx.recv().await?;
        match &event {
            StreamEvent::Delta { text, .. } => self.text.push_str(text),
            StreamEvent::Completed { .. } => self.outcome = Some(Ok(())),
            StreamEvent::Error { error, .. } => self.outcome = Some(Err(error.clone())),
        }
        Some(event)
    }

    /// Drains remaining events and returns the concatenated reply text.
    pub async fn finish(mut self) -> Result<String, ClientError> {
        while self.outcome.is_none() {
            if self.next_event().await.is_none() {
                break;
            }
        }
        match self.outcome.take() {
            Some(Ok(())) => Ok(std::mem::take(&mut self.text)),
            Some(Err(error)) => Err(ClientError::Stream(error)),
            None => Err(ClientError::protocol_msg(format!(
                "session {} ended without a terminal event",
                self.session_id
            ))),
        }
    }
}

impl Drop for AgentStream {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChatMessage, RunParameters};
    use crate::transport::ByteSource;
    use bytes::Bytes;
    use futures::stream;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::task::{Context, Poll};
    use std::time::Duration;

    struct ScriptedTransport {
        chunks: Vec<&'static str>,
        pending_after: bool,
    }

    #[async_trait::async_trait]
    impl StreamTransport for ScriptedTransport {
        async fn open(&self, _request: &StreamRequest) -> Result<ByteSource, StreamError> {
            let chunks = stream::iter(
                self.chunks
                    .clone()
                    .into_iter()
                    .map(|c| Ok(Bytes::from_static(c.as_bytes()))),
            );
            if self.pending_after {
                Ok(ByteSource::from_stream(
                    futures::StreamExt::chain(chunks, stream::pending()),
                ))
            } else {
                Ok(ByteSource::from_stream(chunks))
            }
        }
    }

    /// Body that never yields and flags its own drop.
    struct StalledBody(Arc<AtomicBool>);

    impl futures::Stream for StalledBody {
        type Item = Result<Bytes, StreamError>;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Pending
        }
    }

    impl Drop for StalledBody {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct StalledTransport {
        opened: AtomicBool,
        released: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl StreamTransport for StalledTransport {
        async fn open(&self, _request: &StreamRequest) -> Result<ByteSource, StreamError> {
            self.opened.store(true, Ordering::SeqCst);
            Ok(ByteSource::from_stream(StalledBody(self.released.clone())))
        }
    }

    async fn wait_until(flag: &AtomicBool) -> bool {
        for _ in 0..100 {
            if flag.load(Ordering::SeqCst) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        flag.load(Ordering::SeqCst)
    }

    fn request() -> StreamRequest {
        StreamRequest::from_history(
            &[ChatMessage::user("hi")],
            "thread-a",
            RunParameters::default(),
        )
        .expect("request")
    }

    fn spawn(chunks: Vec<&'static str>, pending_after: bool) -> AgentStream {
        let request = request();
        AgentStream::spawn(
            Arc::new(ScriptedTransport {
                chunks,
                pending_after,
            }),
            request,
            4,
        )
    }

    #[tokio::test]
    async fn emits_monotonic_deltas_then_completed() {
        let mut stream = spawn(vec!["0:\"a\"\n", "x:1\n", "0:\"b\"\n"], false);
        let mut seqs = Vec::new();
        let mut terminals = 0;
        while let Some(event) = stream.next_event().await {
            match event {
                StreamEvent::Delta { seq, .. } => seqs.push(seq),
                StreamEvent::Completed { .. } => terminals += 1,
                StreamEvent::Error { error, .. } => panic!("unexpected error: {error}"),
            }
        }
        assert_eq!(seqs, vec![0, 1]);
        assert_eq!(terminals, 1);
        assert_eq!(stream.finish().await.expect("finish"), "ab");
    }

    #[tokio::test]
    async fn abort_surfaces_cancelled_through_finish() {
        let mut stream = spawn(vec!["0:\"partial\"\n"], true);
        let first = stream.next_event().await.expect("first delta");
        assert!(matches!(first, StreamEvent::Delta { ref text, .. } if text == "partial"));
        stream.abort_handle().abort();
        assert_eq!(
            stream.finish().await,
            Err(ClientError::Stream(StreamError::Cancelled))
        );
    }

    #[tokio::test]
    async fn dropping_the_stream_releases_a_stalled_body() {
        let transport = Arc::new(StalledTransport::default());
        let stream = AgentStream::spawn(transport.clone(), request(), 4);
        assert!(wait_until(&transport.opened).await, "session never opened");
        assert!(!transport.released.load(Ordering::SeqCst));

        drop(stream);

        assert!(wait_until(&transport.released).await);
    }
}
