//! Common imports for typical client usage.
pub use crate::{
    AbortHandle, AgentStream, CallbackSink, ChatMessage, ClientError, DeltaSink, Phase, Role,
    StreamConfig, StreamError, StreamEvent, ThreadId, WeatherAgentClient,
};
