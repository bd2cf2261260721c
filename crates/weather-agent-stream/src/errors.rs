/// Terminal failure of one streaming session, delivered through `on_error`.
///
/// Malformed escape sequences inside a content token are not represented here:
/// they are recovered inside the codec and never end a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The history could not be turned into a request, so nothing was sent.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    /// The request could not be sent (DNS failure, refused connection, timeout
    /// before response headers).
    #[error("transport error: {message}")]
    Transport { message: String },
    /// The agent answered with a status outside 200-299. The body is not read.
    #[error("API Error: {status} {reason}")]
    Status { status: u16, reason: String },
    /// The response body failed after streaming had started.
    #[error("stream read failed: {message}")]
    Read { message: String },
    /// The caller aborted the session.
    #[error("stream cancelled")]
    Cancelled,
}

impl StreamError {
    /// Creates an error for a request rejected before sending.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a status error from the numeric code and its reason phrase.
    pub fn status(status: u16, reason: impl Into<String>) -> Self {
        Self::Status {
            status,
            reason: reason.into(),
        }
    }

    /// Creates a mid-stream read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }

    /// Returns the HTTP status carried by a [`StreamError::Status`].
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid input handed to the client (for example no user messages).
    ///
    /// Callback sessions report this through `on_error` as
    /// [`StreamError::InvalidRequest`] instead.
    #[error("validation error: {0}")]
    Validation(String),
    /// A started session ended with a terminal failure.
    #[error(transparent)]
    Stream(StreamError),
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}

impl From<StreamError> for ClientError {
    fn from(value: StreamError) -> Self {
        ClientError::Stream(value)
    }
}
