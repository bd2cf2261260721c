//! Wire codec for the agent's indexed-string stream format.
//!
//! Each content token has the shape `<index>:"<json-escaped-text>"`. The index
//! is ignored. Any other protocol line (tool calls, finish markers, metadata
//! objects) is skipped.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\d+):"((?:[^"\\\r\n]|\\.)*)""#).expect("token pattern is valid")
});

// Tail that could still become a token once more text arrives.
static PARTIAL_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\d+(?::(?:"(?:[^"\\\r\n]|\\.)*\\?)?)?$"#).expect("partial pattern is valid")
});

/// Returns the concatenation of every content token found in `fragment`.
///
/// Stateless: a token cut off at the end of `fragment` is not seen. Use
/// [`WireCodec`] for a chunked stream.
pub fn extract_content(fragment: &str) -> String {
    let mut out = String::new();
    for caps in TOKEN_RE.captures_iter(fragment) {
        if let Some(raw) = caps.get(2) {
            out.push_str(&unescape_token(raw.as_str()));
        }
    }
    out
}

/// Resolves JSON string escapes in a captured token body.
///
/// A body with a malformed escape is returned unchanged so one bad token does
/// not lose the rest of the reply.
pub fn unescape_token(raw: &str) -> String {
    match serde_json::from_str::<String>(&format!("\"{raw}\"")) {
        Ok(text) => text,
        Err(err) => {
            debug!(error = %err, "malformed token escape, using raw text");
            raw.to_string()
        }
    }
}

/// Escapes `text` as the interior of a JSON string literal.
pub fn escape_text(text: &str) -> String {
    let quoted = serde_json::Value::String(text.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Encodes one wire line (`<index>:"<escaped>"\n`).
pub fn encode_token(index: u32, text: &str) -> String {
    format!("{index}:\"{}\"\n", escape_text(text))
}

/// Stateful codec that reassembles tokens split across fragment boundaries.
///
/// Complete tokens are returned as soon as they are seen. A trailing partial
/// token is carried into the next [`WireCodec::push`].
#[derive(Debug, Default)]
pub struct WireCodec {
    carry: String,
}

impl WireCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extracts the content of `fragment`, prefixed with any carried tail.
    pub fn push(&mut self, fragment: &str) -> String {
        let mut buf = std::mem::take(&mut self.carry);
        buf.push_str(fragment);

        let mut out = String::new();
        let mut consumed = 0;
        for caps in TOKEN_RE.captures_iter(&buf) {
            if let (Some(whole), Some(raw)) = (caps.get(0), caps.get(2)) {
                out.push_str(&unescape_token(raw.as_str()));
                consumed = whole.end();
            }
        }

        let tail = &buf[consumed..];
        if let Some(partial) = PARTIAL_TOKEN_RE.find(tail) {
            self.carry = tail[partial.start()..].to_string();
        }
        out
    }

    /// Ends the stream. An unterminated token is dropped; complete tokens were
    /// already returned by [`WireCodec::push`].
    pub fn finish(&mut self) {
        let carry = std::mem::take(&mut self.carry);
        if carry.contains(":\"") {
            warn!(
                bytes = carry.len(),
                "stream ended inside an unterminated content token"
            );
        }
    }

    /// Bytes currently carried over to the next fragment.
    pub fn pending(&self) -> &str {
        &self.carry
    }
}
