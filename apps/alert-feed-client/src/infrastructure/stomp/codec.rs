//! STOMP Codec
//!
//! Text encoding of STOMP 1.2 frames carried in WebSocket messages.
//!
//! ```text
//! COMMAND\n
//! name:value\n      (zero or more)
//! \n
//! body\0
//! ```
//!
//! A single WebSocket message may hold several frames, or only EOLs
//! (server heart-beats). Header names and values are escaped
//! (`\\` `\n` `\r` `\c`) except in `CONNECT`, `STOMP` and `CONNECTED` frames.
//! A `content-length` header delimits the body; otherwise it ends at the
//! first NUL byte.

use super::frame::{StompCommand, StompFrame};

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Command line is not a known STOMP command.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Header line without a colon, or with an invalid escape sequence.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// Body not followed by a NUL byte.
    #[error("frame is missing its NUL terminator")]
    MissingNullTerminator,

    /// `content-length` is not a non-negative integer.
    #[error("invalid content-length: {0}")]
    InvalidContentLength(String),

    /// Input ended before the frame did.
    #[error("incomplete frame")]
    Incomplete,

    /// Command, header, or text body is not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

/// STOMP frame codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct StompCodec;

impl StompCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode a frame as a text WebSocket payload.
    ///
    /// Frames with a body carry a `content-length` header unless one is
    /// already present.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Utf8`] if the body is not valid UTF-8.
    pub fn encode(&self, frame: &StompFrame) -> Result<String, CodecError> {
        let body = std::str::from_utf8(&frame.body)?;
        let escape = frame.command.escapes_headers();

        let mut out = String::with_capacity(64 + body.len());
        out.push_str(frame.command.as_str());
        out.push('\n');

        for (name, value) in &frame.headers {
            if escape {
                push_escaped(&mut out, name);
                out.push(':');
                push_escaped(&mut out, value);
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }

        if !body.is_empty() && frame.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&body.len().to_string());
            out.push('\n');
        }

        out.push('\n');
        out.push_str(body);
        out.push('\0');
        Ok(out)
    }

    /// Encoded client heart-beat.
    #[must_use]
    pub const fn heartbeat(&self) -> &'static str {
        "\n"
    }

    /// Decode every frame in a WebSocket payload.
    ///
    /// Heart-beat EOLs between frames are skipped; a payload holding only
    /// heart-beats yields an empty vector.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if any frame is malformed or truncated.
    pub fn decode(&self, input: &[u8]) -> Result<Vec<StompFrame>, CodecError> {
        let mut frames = Vec::new();
        let mut rest = skip_heartbeats(input);

        while !rest.is_empty() {
            let (frame, consumed) = decode_frame(rest)?;
            frames.push(frame);
            rest = skip_heartbeats(rest.get(consumed..).unwrap_or_default());
        }

        Ok(frames)
    }
}

fn skip_heartbeats(mut input: &[u8]) -> &[u8] {
    loop {
        if let Some(rest) = input.strip_prefix(b"\n") {
            input = rest;
        } else if let Some(rest) = input.strip_prefix(b"\r\n") {
            input = rest;
        } else {
            return input;
        }
    }
}

/// Read one line starting at `pos`, returning it without its EOL and the
/// position after the EOL.
fn read_line(input: &[u8], pos: usize) -> Result<(&[u8], usize), CodecError> {
    let rest = input.get(pos..).ok_or(CodecError::Incomplete)?;
    let end = rest
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(CodecError::Incomplete)?;
    let line = &rest[..end];
    Ok((line.strip_suffix(b"\r").unwrap_or(line), pos + end + 1))
}

fn decode_frame(input: &[u8]) -> Result<(StompFrame, usize), CodecError> {
    let (line, mut pos) = read_line(input, 0)?;
    let command_name = std::str::from_utf8(line)?;
    let command: StompCommand = command_name
        .parse()
        .map_err(CodecError::UnknownCommand)?;
    let unescape_headers = command.escapes_headers();

    let mut frame = StompFrame::new(command);
    loop {
        let (line, next) = read_line(input, pos)?;
        pos = next;
        if line.is_empty() {
            break;
        }

        let line = std::str::from_utf8(line)?;
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| CodecError::MalformedHeader(line.to_string()))?;
        let header = if unescape_headers {
            (unescape(name)?, unescape(value)?)
        } else {
            (name.to_string(), value.to_string())
        };
        frame.headers.push(header);
    }

    let rest = input.get(pos..).ok_or(CodecError::Incomplete)?;
    let body_len = match frame.get("content-length") {
        Some(raw) => {
            let len: usize = raw
                .trim()
                .parse()
                .map_err(|_| CodecError::InvalidContentLength(raw.to_string()))?;
            match rest.get(len) {
                Some(0) => len,
                Some(_) => return Err(CodecError::MissingNullTerminator),
                None => return Err(CodecError::Incomplete),
            }
        }
        None => rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::MissingNullTerminator)?,
    };

    frame.body = rest[..body_len].to_vec();
    Ok((frame, pos + body_len + 1))
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

fn unescape(raw: &str) -> Result<String, CodecError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(CodecError::MalformedHeader(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    const MESSAGE: &[u8] = b"MESSAGE\n\
        destination:/topic/abc123\n\
        subscription:sub-0\n\
        message-id:42\n\
        content-type:application/json\n\
        \n\
        {\"title\":\"Standup\",\"type\":\"STARTING_NOW\"}\0";

    #[test]
    fn decodes_message_frame() {
        let frames = StompCodec::new().decode(MESSAGE).unwrap();

        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.get("destination"), Some("/topic/abc123"));
        assert_eq!(frame.get("content-type"), Some("application/json"));
        assert_eq!(
            frame.body,
            br#"{"title":"Standup","type":"STARTING_NOW"}"#.to_vec()
        );
    }

    #[test_case(b"\n" ; "lf")]
    #[test_case(b"\r\n" ; "crlf")]
    #[test_case(b"\n\n\r\n" ; "several")]
    fn heartbeat_only_payload_yields_no_frames(input: &[u8]) {
        assert!(StompCodec::new().decode(input).unwrap().is_empty());
    }

    #[test]
    fn decodes_multiple_frames_with_heartbeats_between() {
        let input = b"RECEIPT\nreceipt-id:1\n\n\0\nMESSAGE\ndestination:/topic/a\n\nhi\0\r\n";
        let frames = StompCodec::new().decode(input).unwrap();

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].command, StompCommand::Receipt);
        assert_eq!(frames[1].body, b"hi".to_vec());
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let input = b"MESSAGE\ncontent-length:3\n\na\0b\0";
        let frames = StompCodec::new().decode(input).unwrap();
        assert_eq!(frames[0].body, b"a\0b".to_vec());
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let input = b"CONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\0";
        let frames = StompCodec::new().decode(input).unwrap();
        assert_eq!(frames[0].command, StompCommand::Connected);
        assert_eq!(frames[0].get("version"), Some("1.2"));
    }

    #[test]
    fn connected_headers_are_not_unescaped() {
        let input = b"CONNECTED\nserver:a\\cb\n\n\0";
        let frames = StompCodec::new().decode(input).unwrap();
        assert_eq!(frames[0].get("server"), Some("a\\cb"));
    }

    #[test]
    fn message_headers_are_unescaped() {
        let input = b"MESSAGE\ndestination:/topic/a\\cb\\nc\n\n\0";
        let frames = StompCodec::new().decode(input).unwrap();
        assert_eq!(frames[0].get("destination"), Some("/topic/a:b\nc"));
    }

    #[test_case(b"BOGUS\n\n\0", CodecError::UnknownCommand("BOGUS".to_string()) ; "unknown command")]
    #[test_case(b"MESSAGE\nno-colon\n\n\0", CodecError::MalformedHeader("no-colon".to_string()) ; "header without colon")]
    #[test_case(b"MESSAGE\nbad:\\t\n\n\0", CodecError::MalformedHeader("\\t".to_string()) ; "invalid escape")]
    #[test_case(b"MESSAGE\n\nbody", CodecError::MissingNullTerminator ; "missing nul")]
    #[test_case(b"MESSAGE\ncontent-length:x\n\n\0", CodecError::InvalidContentLength("x".to_string()) ; "bad content length")]
    #[test_case(b"MESSAGE\ncontent-length:10\n\nshort\0", CodecError::Incomplete ; "short body")]
    #[test_case(b"MESSAGE\ndestination:/topic/a", CodecError::Incomplete ; "truncated headers")]
    fn rejects_malformed_frames(input: &[u8], expected: CodecError) {
        assert_eq!(StompCodec::new().decode(input).unwrap_err(), expected);
    }

    #[test]
    fn encodes_subscribe_frame() {
        let encoded = StompCodec::new()
            .encode(&StompFrame::subscribe("sub-0", "/topic/abc123"))
            .unwrap();
        assert_eq!(
            encoded,
            "SUBSCRIBE\nid:sub-0\ndestination:/topic/abc123\nack:auto\n\n\0"
        );
    }

    #[test]
    fn encode_adds_content_length() {
        let frame = StompFrame::new(StompCommand::Send)
            .header("destination", "/app/echo")
            .body("hello");
        let encoded = StompCodec::new().encode(&frame).unwrap();
        assert!(encoded.contains("content-length:5\n\nhello\0"));
    }

    #[test]
    fn encode_keeps_connect_headers_verbatim() {
        let frame = StompFrame::new(StompCommand::Connect).header("host", "a:b");
        let encoded = StompCodec::new().encode(&frame).unwrap();
        assert!(encoded.contains("host:a:b\n"));
    }

    #[test]
    fn encode_rejects_binary_body() {
        let frame = StompFrame::new(StompCommand::Send).body(vec![0xff, 0xfe]);
        assert!(matches!(
            StompCodec::new().encode(&frame),
            Err(CodecError::Utf8(_))
        ));
    }

    proptest! {
        #[test]
        fn header_escaping_is_reversible(name in "[a-z-]{1,12}", value in "\\PC*") {
            let frame = StompFrame::new(StompCommand::Message).header(name.clone(), value.clone());
            let codec = StompCodec::new();

            let encoded = codec.encode(&frame).unwrap();
            let decoded = codec.decode(encoded.as_bytes()).unwrap();

            prop_assert_eq!(decoded.len(), 1);
            prop_assert_eq!(decoded[0].get(&name), Some(value.as_str()));
        }

        #[test]
        fn escaped_values_contain_no_raw_delimiters(value in any::<String>()) {
            let mut escaped = String::new();
            push_escaped(&mut escaped, &value);

            prop_assert!(!escaped.contains('\n'));
            prop_assert!(!escaped.contains('\r'));
            prop_assert!(!escaped.contains(':'));
            prop_assert_eq!(unescape(&escaped).unwrap(), value);
        }
    }
}
