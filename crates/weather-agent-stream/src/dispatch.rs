use tracing::warn;

use crate::errors::StreamError;

/// Receiver of streamed reply text.
///
/// A session calls `on_chunk` zero or more times, then exactly one of
/// `on_complete` or `on_error`.
#[async_trait::async_trait]
pub trait DeltaSink: Send {
    /// Non-empty text extracted from one pulled chunk.
    async fn on_chunk(&mut self, text: &str);
    /// The stream ended normally.
    async fn on_complete(&mut self);
    /// The session failed.
    async fn on_error(&mut self, error: StreamError);

    /// Reports that the consumer is gone and the session may stop early.
    fn is_closed(&self) -> bool {
        false
    }
}

#[async_trait::async_trait]
impl<S: DeltaSink + ?Sized> DeltaSink for &mut S {
    async fn on_chunk(&mut self, text: &str) {
        (**self).on_chunk(text).await
    }

    async fn on_complete(&mut self) {
        (**self).on_complete().await
    }

    async fn on_error(&mut self, error: StreamError) {
        (**self).on_error(error).await
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// [`DeltaSink`] built from three closures.
///
/// The terminal callbacks are `FnOnce`.
pub struct CallbackSink<C, D, E> {
    on_chunk: C,
    on_complete: Option<D>,
    on_error: Option<E>,
}

impl<C, D, E> CallbackSink<C, D, E>
where
    C: FnMut(&str) + Send,
    D: FnOnce() + Send,
    E: FnOnce(StreamError) + Send,
{
    pub fn new(on_chunk: C, on_complete: D, on_error: E) -> Self {
        Self {
            on_chunk,
            on_complete: Some(on_complete),
            on_error: Some(on_error),
        }
    }
}

#[async_trait::async_trait]
impl<C, D, E> DeltaSink for CallbackSink<C, D, E>
where
    C: FnMut(&str) + Send,
    D: FnOnce() + Send,
    E: FnOnce(StreamError) + Send,
{
    async fn on_chunk(&mut self, text: &str) {
        (self.on_chunk)(text);
    }

    async fn on_complete(&mut self) {
        if let Some(callback) = self.on_complete.take() {
            callback();
        }
    }

    async fn on_error(&mut self, error: StreamError) {
        if let Some(callback) = self.on_error.take() {
            callback(error);
        }
    }
}

/// How a session ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Terminal {
    Completed,
    Failed(StreamError),
}

/// Forwards session output to a sink and enforces the callback contract.
///
/// After the first terminal signal every further call is ignored, so a sink
/// never sees a chunk after its terminal callback or two terminal callbacks.
pub struct Dispatcher<S> {
    sink: S,
    terminal: Option<Terminal>,
    chunks: u64,
}

impl<S: DeltaSink> Dispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            terminal: None,
            chunks: 0,
        }
    }

    /// Forwards `text` unless it is empty or the dispatcher is closed.
    ///
    /// Returns `true` when the sink received the text.
    pub async fn chunk(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        if self.terminal.is_some() {
            warn!("dropping chunk after terminal callback");
            return false;
        }
        self.sink.on_chunk(text).await;
        self.chunks = self.chunks.saturating_add(1);
        true
    }

    /// Signals completion once.
    pub async fn complete(&mut self) -> bool {
        if self.terminal.is_some() {
            warn!("ignoring second terminal signal (complete)");
            return false;
        }
        self.terminal = Some(Terminal::Completed);
        self.sink.on_complete().await;
        true
    }

    /// Signals failure once.
    pub async fn fail(&mut self, error: StreamError) -> bool {
        if self.terminal.is_some() {
            warn!(%error, "ignoring second terminal signal (error)");
            return false;
        }
        self.terminal = Some(Terminal::Failed(error.clone()));
        self.sink.on_error(error).await;
        true
    }

    pub fn terminal(&self) -> Option<&Terminal> {
        self.terminal.as_ref()
    }

    /// Number of chunks delivered so far.
    pub fn chunks_sent(&self) -> u64 {
        self.chunks
    }

    pub fn sink_closed(&self) -> bool {
        self.sink.is_closed()
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
