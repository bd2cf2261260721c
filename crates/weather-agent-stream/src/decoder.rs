use tracing::warn;

/// Incremental UTF-8 decoder for a chunked response body.
///
/// A multi-byte character split between two chunks is held back until the
/// rest of its bytes arrive, so it decodes to one character instead of two
/// replacement characters.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk` prefixed with any bytes retained from the previous call.
    ///
    /// With `is_final` set, retained bytes are flushed; a sequence that is still
    /// incomplete becomes U+FFFD instead of an error.
    pub fn decode(&mut self, chunk: &[u8], is_final: bool) -> String {
        self.pending.extend_from_slice(chunk);
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // Truncated sequence at the tail: keep it for the next chunk.
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let retained = rest.to_vec();
        self.pending.clear();
        if is_final && !retained.is_empty() {
            warn!(
                bytes = retained.len(),
                "stream ended inside a multi-byte character"
            );
            out.push_str(&String::from_utf8_lossy(&retained));
        } else {
            self.pending = retained;
        }
        out
    }

    /// Flushes retained bytes at end of stream.
    pub fn finish(&mut self) -> String {
        self.decode(&[], true)
    }

    /// Number of bytes currently held back.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
