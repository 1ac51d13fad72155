use cb_core::types::ControlMessage;
use cb_session::pty::TermSize;

/// Written to the client after the attached process exits, just before the
/// socket closes.
pub const DISCONNECT_NOTICE: &str = "\r\n\x1b[33m[Session disconnected]\x1b[0m\r\n";

/// Close reason for a missing or malformed `session` parameter.
pub const INVALID_SESSION_REASON: &str = "Invalid session name";

/// Close reason when the pty attach fails.
pub const ATTACH_FAILED_REASON: &str = "Failed to attach to session";

// ---------------------------------------------------------------------------
// Client frames
// ---------------------------------------------------------------------------

/// One inbound socket message after decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Consumed by the relay, never written to the process.
    Resize(TermSize),
    /// Written to the process byte-for-byte.
    Input(Vec<u8>),
}

impl ClientFrame {
    /// Decode a message payload.
    ///
    /// A payload is a resize only if it is a JSON object with
    /// `"type": "resize"` and non-zero integer `cols`/`rows` that fit in a
    /// `u16`. Everything else, including other JSON, is input.
    pub fn decode(payload: &[u8]) -> Self {
        match serde_json::from_slice::<ControlMessage>(payload) {
            Ok(ControlMessage::Resize { cols, rows }) if cols > 0 && rows > 0 => {
                ClientFrame::Resize(TermSize::new(cols, rows))
            }
            _ => ClientFrame::Input(payload.to_vec()),
        }
    }
}

// ---------------------------------------------------------------------------
// Output chunking
// ---------------------------------------------------------------------------

/// Turns raw pty output into text frames without splitting a UTF-8
/// character across two frames.
///
/// An incomplete multi-byte sequence at the end of a chunk is held back
/// until the next chunk. Invalid bytes are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Chunker {
    pending: Vec<u8>,
}

impl Utf8Chunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return whatever is ready to send.
    pub fn push(&mut self, bytes: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(bytes);
        let ready = self.pending.len() - incomplete_tail(&self.pending);
        if ready == 0 {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending[..ready]).into_owned();
        self.pending.drain(..ready);
        Some(text)
    }

    /// Drain anything still held back.
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(text)
    }
}

/// Length of a truncated UTF-8 sequence at the end of `bytes`, or 0.
fn incomplete_tail(bytes: &[u8]) -> usize {
    let len = bytes.len();
    for back in 1..=len.min(4) {
        let byte = bytes[len - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_frame_decodes() {
        assert_eq!(
            ClientFrame::decode(br#"{"type":"resize","cols":120,"rows":40}"#),
            ClientFrame::Resize(TermSize::new(120, 40))
        );
        assert_eq!(
            ClientFrame::decode(br#"{ "rows": 24, "type": "resize", "cols": 80 }"#),
            ClientFrame::Resize(TermSize::new(80, 24))
        );
    }

    #[test]
    fn everything_else_is_input() {
        let cases: &[&[u8]] = &[
            b"ls -la\r",
            b"\x1b[A",
            b"{",
            b"",
            br#"{"type":"input","data":"x"}"#,
            br#"{"type":"resize","cols":"120","rows":40}"#,
            br#"{"type":"resize","cols":120.5,"rows":40}"#,
            br#"{"type":"resize","cols":-1,"rows":40}"#,
            br#"{"type":"resize","cols":70000,"rows":40}"#,
            br#"{"type":"resize","cols":0,"rows":40}"#,
            br#"{"type":"resize","cols":120}"#,
            br#"{"cols":120,"rows":40}"#,
        ];
        for payload in cases {
            assert_eq!(
                ClientFrame::decode(payload),
                ClientFrame::Input(payload.to_vec()),
                "{:?}",
                String::from_utf8_lossy(payload)
            );
        }
    }

    #[test]
    fn chunker_passes_ascii_through() {
        let mut c = Utf8Chunker::new();
        assert_eq!(c.push(b"hello").as_deref(), Some("hello"));
        assert_eq!(c.flush(), None);
    }

    #[test]
    fn chunker_holds_split_character() {
        let euro = "€".as_bytes();
        let mut c = Utf8Chunker::new();
        assert_eq!(c.push(&[b'a', euro[0], euro[1]]).as_deref(), Some("a"));
        assert_eq!(c.push(&euro[2..]).as_deref(), Some("€"));

        assert_eq!(c.push(&euro[..1]), None);
        assert_eq!(c.flush().as_deref(), Some("\u{FFFD}"));
    }

    #[test]
    fn chunker_replaces_invalid_bytes() {
        let mut c = Utf8Chunker::new();
        assert_eq!(c.push(b"a\xffb").as_deref(), Some("a\u{FFFD}b"));
    }
}
