use std::pin::Pin;

use bytes::Bytes;
use futures::{StreamExt as _, TryStreamExt as _, stream};
use tracing::{debug, warn};

use crate::config::StreamConfig;
use crate::errors::{ClientError, StreamError};
use crate::message::StreamRequest;

type ByteStream = Pin<Box<dyn futures::Stream<Item = Result<Bytes, StreamError>> + Send + 'static>>;

/// Pull-based source over a response body.
///
/// Owns the underlying connection; dropping it closes the connection.
pub struct ByteSource {
    stream: ByteStream,
}

impl ByteSource {
    /// Wraps any stream of byte results.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: futures::Stream<Item = Result<Bytes, StreamError>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
        }
    }

    /// Builds a source that yields the given chunks in order.
    pub fn from_chunks<I>(chunks: I) -> Self
    where
        I: IntoIterator<Item = Result<Bytes, StreamError>>,
        I::IntoIter: Send + 'static,
    {
        Self::from_stream(stream::iter(chunks))
    }

    /// Pulls the next fragment.
    ///
    /// `Ok(None)` marks end of stream; an `Err` is a mid-stream read failure.
    pub async fn pull_next(&mut self) -> Result<Option<Bytes>, StreamError> {
        self.stream.next().await.transpose()
    }
}

/// Opens a streaming response for a request.
///
/// Implementations must check the response status before handing out the
/// body, and must not retry.
#[async_trait::async_trait]
pub trait StreamTransport: Send + Sync {
    /// Sends `request` and returns a source over the accepted response body.
    async fn open(&self, request: &StreamRequest) -> Result<ByteSource, StreamError>;
}

/// HTTP transport backed by `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    config: StreamConfig,
}

impl HttpTransport {
    /// Creates a transport from explicit configuration.
    pub fn new(config: StreamConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Creates a transport configured from the environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(StreamConfig::from_env()?)
    }

    /// Returns the configuration this transport was built with.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl StreamTransport for HttpTransport {
    async fn open(&self, request: &StreamRequest) -> Result<ByteSource, StreamError> {
        let body = request
            .to_wire_body()
            .map_err(|e| StreamError::transport(format!("failed to serialize request: {e}")))?;
        debug!(endpoint = %self.config.endpoint, thread_id = %request.thread_id(), "opening agent stream");

        let mut http_req = self.client.post(&self.config.endpoint);
        for (name, value) in &self.config.headers {
            http_req = http_req.header(name.as_str(), value.as_str());
        }

        let response = http_req
            .json(&body)
            .send()
            .await
            .map_err(|e| StreamError::transport(format!("agent request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), endpoint = %self.config.endpoint, "agent stream rejected");
            return Err(StreamError::status(
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
            ));
        }

        let body = response
            .bytes_stream()
            .map_err(|e| StreamError::read(format!("agent stream read failed: {e}")));
        Ok(ByteSource::from_stream(body))
    }
}
