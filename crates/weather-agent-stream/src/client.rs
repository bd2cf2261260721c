use std::sync::Arc;

use crate::config::StreamConfig;
use crate::dispatch::DeltaSink;
use crate::errors::{ClientError, StreamError};
use crate::message::{ChatMessage, StreamRequest, ThreadId};
use crate::run::AgentStream;
use crate::session::{AbortSignal, Phase, StreamSession};
use crate::transport::{HttpTransport, StreamTransport};

/// Entry point for streaming weather agent replies.
#[derive(Clone)]
pub struct WeatherAgentClient {
    transport: Arc<dyn StreamTransport>,
    config: StreamConfig,
}

impl WeatherAgentClient {
    /// Starts a builder for configuring the client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Creates a client that talks HTTP to `config.endpoint`.
    pub fn new(config: StreamConfig) -> Result<Self, ClientError> {
        Self::builder().config(config).build()
    }

    /// Creates an HTTP client configured from the environment.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(StreamConfig::from_env()?)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Builds the request for `history`, keeping only user turns.
    pub fn request(
        &self,
        history: &[ChatMessage],
        thread_id: impl Into<ThreadId>,
    ) -> Result<StreamRequest, ClientError> {
        StreamRequest::from_history(history, thread_id, self.config.run.clone())
    }

    /// Streams the agent's reply to `history` into `sink`.
    ///
    /// The sink sees zero or more `on_chunk` calls followed by exactly one of
    /// `on_complete`/`on_error`. A history without user turns is reported as
    /// [`StreamError::InvalidRequest`] without contacting the agent.
    pub async fn stream_response<S: DeltaSink>(
        &self,
        history: &[ChatMessage],
        thread_id: impl Into<ThreadId>,
        sink: S,
    ) -> Phase {
        self.run_session(history, thread_id.into(), sink, None).await
    }

    /// Like [`WeatherAgentClient::stream_response`], stopping early when
    /// `signal` fires.
    pub async fn stream_response_with_abort<S: DeltaSink>(
        &self,
        history: &[ChatMessage],
        thread_id: impl Into<ThreadId>,
        sink: S,
        signal: AbortSignal,
    ) -> Phase {
        self.run_session(history, thread_id.into(), sink, Some(signal))
            .await
    }

    async fn run_session<S: DeltaSink>(
        &self,
        history: &[ChatMessage],
        thread_id: ThreadId,
        sink: S,
        signal: Option<AbortSignal>,
    ) -> Phase {
        let mut session = StreamSession::new(self.transport.as_ref(), sink);
        let request = match self.request(history, thread_id) {
            Ok(request) => request,
            Err(err) => return session.reject(rejection(err)).await,
        };
        if let Some(signal) = signal {
            session = session.with_abort(signal);
        }
        session.run(&request).await
    }

    /// Starts a session on a background task and returns its event stream.
    ///
    /// Must be called within a tokio runtime.
    pub fn start_stream(
        &self,
        history: &[ChatMessage],
        thread_id: impl Into<ThreadId>,
    ) -> Result<AgentStream, ClientError> {
        let request = self.request(history, thread_id)?;
        Ok(AgentStream::spawn(
            self.transport.clone(),
            request,
            self.config.stream_buffer_capacity,
        ))
    }

    /// Runs a session to completion and returns the full reply text.
    pub async fn collect_text(
        &self,
        history: &[ChatMessage],
        thread_id: impl Into<ThreadId>,
    ) -> Result<String, ClientError> {
        self.start_stream(history, thread_id)?.finish().await
    }
}

fn rejection(err: ClientError) -> StreamError {
    match err {
        ClientError::Validation(message) => StreamError::invalid_request(message),
        ClientError::Stream(err) => err,
        other => StreamError::invalid_request(other.to_string()),
    }
}

/// Builder for [`WeatherAgentClient`].
#[derive(Default)]
pub struct ClientBuilder {
    config: Option<StreamConfig>,
    transport: Option<Arc<dyn StreamTransport>>,
}

impl ClientBuilder {
    /// Sets the client configuration. Defaults to [`StreamConfig::default`].
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Uses a custom transport instead of HTTP.
    ///
    /// Only the run parameters and buffer capacity of the config apply then.
    pub fn transport(mut self, transport: Arc<dyn StreamTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validates the configuration and builds the client.
    pub fn build(self) -> Result<WeatherAgentClient, ClientError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(config.clone())?),
        };
        Ok(WeatherAgentClient { transport, config })
    }
}
