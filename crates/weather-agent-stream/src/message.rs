use std::fmt;

use crate::errors::ClientError;

/// Author of a chat turn.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Turn written by the person chatting.
    User,
    /// Turn produced by the weather agent.
    #[serde(alias = "assistant")]
    Agent,
    /// Instruction turn.
    System,
}

/// One `{role, content}` pair of the conversation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Creates a message with an explicit role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a user-authored message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an agent-authored message.
    pub fn agent(content: impl Into<String>) -> Self {
        Self::new(Role::Agent, content)
    }
}

/// Conversation thread identifier: an integer or an opaque string.
#[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum ThreadId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ThreadId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for ThreadId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ThreadId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl std::str::FromStr for ThreadId {
    type Err = std::convert::Infallible;

    /// Digits become [`ThreadId::Number`]; anything else stays opaque text.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<i64>() {
            Ok(n) => Self::Number(n),
            Err(_) => Self::Text(s.to_string()),
        })
    }
}

/// Fixed run parameters forwarded to the remote agent with every request.
///
/// `max_retries` is interpreted by the agent; the client never retries.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunParameters {
    pub run_id: String,
    pub max_retries: u32,
    pub max_steps: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub runtime_context: serde_json::Map<String, serde_json::Value>,
    pub resource_id: String,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            run_id: "weatherAgent".to_string(),
            max_retries: 2,
            max_steps: 5,
            temperature: 0.5,
            top_p: 1.0,
            runtime_context: serde_json::Map::new(),
            resource_id: "weatherAgent".to_string(),
        }
    }
}

/// Validated request for one streaming session.
///
/// `messages` only ever contains user turns; see [`StreamRequest::from_history`].
#[derive(Clone, Debug, PartialEq)]
pub struct StreamRequest {
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) thread_id: ThreadId,
    pub(crate) run: RunParameters,
}

impl StreamRequest {
    /// Builds a request from the caller's full history.
    ///
    /// Agent and system turns are dropped; the remaining user turns keep their
    /// order and are sent as-is, empty ones included. Fails when no user turn
    /// is left.
    pub fn from_history(
        history: &[ChatMessage],
        thread_id: impl Into<ThreadId>,
        run: RunParameters,
    ) -> Result<Self, ClientError> {
        let messages: Vec<ChatMessage> = history
            .iter()
            .filter(|msg| msg.role == Role::User)
            .cloned()
            .collect();
        if messages.is_empty() {
            return Err(ClientError::Validation(
                "at least one user message is required".into(),
            ));
        }
        Ok(Self {
            messages,
            thread_id: thread_id.into(),
            run,
        })
    }

    /// User turns sent to the agent.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Thread the request belongs to.
    pub fn thread_id(&self) -> &ThreadId {
        &self.thread_id
    }

    /// Serializes the request into the agent's JSON body.
    pub fn to_wire_body(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(WireBody {
            messages: &self.messages,
            run_id: &self.run.run_id,
            max_retries: self.run.max_retries,
            max_steps: self.run.max_steps,
            temperature: self.run.temperature,
            top_p: self.run.top_p,
            runtime_context: &self.run.runtime_context,
            thread_id: &self.thread_id,
            resource_id: &self.run.resource_id,
        })
    }
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBody<'a> {
    messages: &'a [ChatMessage],
    run_id: &'a str,
    max_retries: u32,
    max_steps: u32,
    #[serde(serialize_with = "whole_as_integer")]
    temperature: f64,
    #[serde(serialize_with = "whole_as_integer")]
    top_p: f64,
    runtime_context: &'a serde_json::Map<String, serde_json::Value>,
    thread_id: &'a ThreadId,
    resource_id: &'a str,
}

// The agent expects `topP: 1`, not `1.0`.
fn whole_as_integer<S: serde::Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0;
    if value.fract() == 0.0 && value.abs() <= MAX_EXACT {
        serializer.serialize_i64(*value as i64)
    } else {
        serializer.serialize_f64(*value)
    }
}
