use std::time::Duration;

use crate::errors::ClientError;
use crate::message::RunParameters;

/// Default weather agent stream endpoint.
pub const DEFAULT_ENDPOINT: &str =
    "https://millions-screeching-vultur.mastra.cloud/api/agents/weatherAgent/stream";

/// Client-identifying header sent with every request.
pub const CLIENT_HEADER: (&str, &str) = ("x-mastra-dev-playground", "true");

/// Configuration for the streaming client.
///
/// Passed explicitly to [`crate::transport::HttpTransport::new`] so tests can
/// point the client at a mock endpoint.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Agent stream endpoint URL.
    pub endpoint: String,
    /// Request headers, sent in order.
    pub headers: Vec<(String, String)>,
    /// Run parameters forwarded in the request body.
    pub run: RunParameters,
    /// Optional whole-request timeout (connect through end of body).
    pub timeout: Option<Duration>,
    /// Bounded event buffer size used by [`crate::AgentStream`].
    pub stream_buffer_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                (CLIENT_HEADER.0.to_string(), CLIENT_HEADER.1.to_string()),
            ],
            run: RunParameters::default(),
            timeout: None,
            stream_buffer_capacity: 128,
        }
    }
}

impl StreamConfig {
    /// Creates a config with the default headers and run parameters.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Builds a config from the environment.
    ///
    /// - `WEATHER_AGENT_ENDPOINT`: endpoint override.
    /// - `WEATHER_AGENT_TIMEOUT_SECS`: request timeout in whole seconds.
    pub fn from_env() -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Ok(endpoint) = std::env::var("WEATHER_AGENT_ENDPOINT")
            && !endpoint.trim().is_empty()
        {
            config.endpoint = endpoint.trim().to_string();
        }
        if let Ok(raw) = std::env::var("WEATHER_AGENT_TIMEOUT_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ClientError::Config(format!("invalid WEATHER_AGENT_TIMEOUT_SECS: {raw:?}"))
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Overrides the endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Adds or replaces a header (case-insensitive name match).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(entry) => entry.1 = value,
            None => self.headers.push((name, value)),
        }
        self
    }

    /// Overrides the run parameters sent in the request body.
    pub fn run_parameters(mut self, run: RunParameters) -> Self {
        self.run = run;
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the bounded event buffer used between the session task and the
    /// consumer of [`crate::AgentStream`].
    pub fn stream_buffer_capacity(mut self, capacity: usize) -> Self {
        self.stream_buffer_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::Config("endpoint must not be empty".into()));
        }
        if self.stream_buffer_capacity == 0 {
            return Err(ClientError::Config(
                "stream_buffer_capacity must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
