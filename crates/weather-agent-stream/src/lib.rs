//! Streaming client for the weather agent.
//!
//! The agent replies with a chunked body of `<index>:"<json-escaped-text>"`
//! lines. This crate decodes that body incrementally and reports the reply as
//! ordered text deltas followed by exactly one completion or error signal.
//!
//! # Callback usage
//!
//! ```no_run
//! use weather_agent_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = WeatherAgentClient::new(StreamConfig::default())?;
//! let history = vec![ChatMessage::user("What's the weather in Lisbon?")];
//!
//! client
//!     .stream_response(
//!         &history,
//!         12345_i64,
//!         CallbackSink::new(
//!             |text: &str| print!("{text}"),
//!             || println!(),
//!             |err: StreamError| eprintln!("stream failed: {err}"),
//!         ),
//!     )
//!     .await;
//! # Ok(())
//! # }
//! ```
//!
//! # Event-stream usage
//!
//! ```no_run
//! use weather_agent_stream::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = WeatherAgentClient::from_env()?;
//! let mut stream = client.start_stream(&[ChatMessage::user("Rain in Oslo?")], "thread-1")?;
//! while let Some(event) = stream.next_event().await {
//!     if let StreamEvent::Delta { text, .. } = event {
//!         print!("{text}");
//!     }
//! }
//! let _reply = stream.finish().await?;
//! # Ok(())
//! # }
//! ```

/// Client entry point and builder.
pub mod client;
/// Wire codec for content tokens.
pub mod codec;
/// Endpoint, header, and run parameter configuration.
pub mod config;
/// Incremental UTF-8 decoding of body chunks.
pub mod decoder;
/// Sink trait and the callback contract guard.
pub mod dispatch;
/// Public error types.
pub mod errors;
/// Chat messages, thread ids, and the request body.
pub mod message;
/// Tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Channel-backed event stream and background session task.
pub mod run;
/// Per-call session state machine and cancellation.
pub mod session;
/// HTTP transport and the pull-based byte source.
pub mod transport;

pub use client::{ClientBuilder, WeatherAgentClient};
pub use codec::{WireCodec, encode_token, escape_text, extract_content, unescape_token};
pub use config::StreamConfig;
pub use decoder::Utf8StreamDecoder;
pub use dispatch::{CallbackSink, DeltaSink, Dispatcher, Terminal};
pub use errors::{ClientError, StreamError};
pub use message::{ChatMessage, Role, RunParameters, StreamRequest, ThreadId};
pub use observability::{LogSettings, init_observability, init_observability_with};
pub use run::{AgentStream, StreamEvent};
pub use session::{AbortHandle, AbortSignal, Phase, StreamSession, abort_pair};
pub use transport::{ByteSource, HttpTransport, StreamTransport};
