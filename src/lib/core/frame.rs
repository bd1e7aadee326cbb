//! STOMP 1.2 frames as carried inside WebSocket messages.
//!
//! A frame is a command line, `name:value` header lines, a blank line and a body
//! terminated by NUL. Bare EOLs between frames are heart-beats and are skipped by
//! [`Frame::parse_all`].

use std::fmt;

use bytes::Bytes;

use crate::core::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Stomp => "STOMP",
            Command::Connected => "CONNECTED",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Ack => "ACK",
            Command::Nack => "NACK",
            Command::Begin => "BEGIN",
            Command::Commit => "COMMIT",
            Command::Abort => "ABORT",
            Command::Disconnect => "DISCONNECT",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    fn parse(line: &str) -> Result<Self, FrameError> {
        Ok(match line {
            "CONNECT" => Command::Connect,
            "STOMP" => Command::Stomp,
            "CONNECTED" => Command::Connected,
            "SEND" => Command::Send,
            "SUBSCRIBE" => Command::Subscribe,
            "UNSUBSCRIBE" => Command::Unsubscribe,
            "ACK" => Command::Ack,
            "NACK" => Command::Nack,
            "BEGIN" => Command::Begin,
            "COMMIT" => Command::Commit,
            "ABORT" => Command::Abort,
            "DISCONNECT" => Command::Disconnect,
            "MESSAGE" => Command::Message,
            "RECEIPT" => Command::Receipt,
            "ERROR" => Command::Error,
            other => return Err(FrameError::UnknownCommand(other.to_string())),
        })
    }

    // CONNECT and CONNECTED headers are never escaped, for 1.0 compatibility.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header. Repeated headers keep the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn encode(&self) -> Vec<u8> {
        let escape = self.command.escapes_headers();
        let mut out = Vec::with_capacity(64 + self.body.len());
        out.extend_from_slice(self.command.as_str().as_bytes());
        out.push(b'\n');
        for (name, value) in &self.headers {
            if escape {
                out.extend_from_slice(escape_header(name).as_bytes());
                out.push(b':');
                out.extend_from_slice(escape_header(value).as_bytes());
            } else {
                out.extend_from_slice(name.as_bytes());
                out.push(b':');
                out.extend_from_slice(value.as_bytes());
            }
            out.push(b'\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.extend_from_slice(format!("content-length:{}\n", self.body.len()).as_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(&self.body);
        out.push(0);
        out
    }

    /// Parses every frame in `data`, skipping heart-beat EOLs before, between and
    /// after frames. An input made only of EOLs yields no frames.
    pub fn parse_all(data: &[u8]) -> Result<Vec<Frame>, FrameError> {
        let mut frames = Vec::new();
        let mut rest = data;
        loop {
            rest = skip_eols(rest);
            if rest.is_empty() {
                return Ok(frames);
            }
            let (frame, remaining) = Self::parse_one(rest)?;
            frames.push(frame);
            rest = remaining;
        }
    }

    fn parse_one(data: &[u8]) -> Result<(Frame, &[u8]), FrameError> {
        let (line, mut rest) = next_line(data)?.ok_or(FrameError::MissingCommand)?;
        let command = Command::parse(line)?;
        let escape = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let (line, remaining) = next_line(rest)?.ok_or(FrameError::Unterminated)?;
            rest = remaining;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(n, _)| n == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let body_len = match content_length {
            Some(len) => {
                if rest.len() <= len || rest[len] != 0 {
                    return Err(FrameError::Unterminated);
                }
                len
            }
            None => rest
                .iter()
                .position(|b| *b == 0)
                .ok_or(FrameError::Unterminated)?,
        };

        let frame = Frame {
            command,
            headers,
            body: Bytes::copy_from_slice(&rest[..body_len]),
        };
        Ok((frame, &rest[body_len + 1..]))
    }
}

fn skip_eols(mut data: &[u8]) -> &[u8] {
    loop {
        match data {
            [b'\n', rest @ ..] => data = rest,
            [b'\r', b'\n', rest @ ..] => data = rest,
            _ => return data,
        }
    }
}

// Splits off one line, accepting both LF and CRLF endings.
fn next_line(data: &[u8]) -> Result<Option<(&str, &[u8])>, FrameError> {
    let Some(end) = data.iter().position(|b| *b == b'\n') else {
        return Ok(None);
    };
    let mut line = &data[..end];
    if let [head @ .., b'\r'] = line {
        line = head;
    }
    let line = std::str::from_utf8(line).map_err(|_| FrameError::InvalidUtf8)?;
    Ok(Some((line, &data[end + 1..])))
}

fn escape_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(raw: &str) -> Result<String, FrameError> {
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
            _ => return Err(FrameError::InvalidEscape(raw.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_send_with_escaped_headers_and_length() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/pledge")
            .header("note", "a:b")
            .body(&b"{}"[..]);
        let encoded = String::from_utf8(frame.encode()).unwrap();
        assert_eq!(
            encoded,
            "SEND\ndestination:/app/pledge\nnote:a\\cb\ncontent-length:2\n\n{}\0"
        );
    }

    #[test]
    fn connect_headers_are_not_escaped() {
        let frame = Frame::new(Command::Connect).header("host", "localhost:8080");
        let encoded = String::from_utf8(frame.encode()).unwrap();
        assert_eq!(encoded, "CONNECT\nhost:localhost:8080\n\n\0");
    }

    #[test]
    fn parses_message_between_heartbeats() {
        let raw = b"\n\r\nMESSAGE\r\ndestination:/topic/a\\cb\nsubscription:sub-0\n\n{\"x\":1}\0\n";
        let frames = Frame::parse_all(raw).unwrap();
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("destination"), Some("/topic/a:b"));
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(&frame.body[..], b"{\"x\":1}");
    }

    #[test]
    fn content_length_allows_nul_in_body() {
        let raw = b"MESSAGE\ncontent-length:3\n\na\0b\0RECEIPT\nreceipt-id:7\n\n\0";
        let frames = Frame::parse_all(raw).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0].body[..], b"a\0b");
        assert_eq!(frames[1].command, Command::Receipt);
        assert_eq!(frames[1].get("receipt-id"), Some("7"));
    }

    #[test]
    fn repeated_header_keeps_first_value() {
        let frames = Frame::parse_all(b"MESSAGE\nfoo:1\nfoo:2\n\n\0").unwrap();
        assert_eq!(frames[0].get("foo"), Some("1"));
    }

    #[test]
    fn heartbeat_only_input_has_no_frames() {
        assert!(Frame::parse_all(b"\n\n\r\n").unwrap().is_empty());
    }

    #[test]
    fn rejects_broken_frames() {
        assert!(matches!(
            Frame::parse_all(b"HELLO\n\n\0"),
            Err(FrameError::UnknownCommand(_))
        ));
        assert!(matches!(
            Frame::parse_all(b"MESSAGE\nnocolon\n\n\0"),
            Err(FrameError::MalformedHeader(_))
        ));
        assert!(matches!(
            Frame::parse_all(b"MESSAGE\n\nbody"),
            Err(FrameError::Unterminated)
        ));
        assert!(matches!(
            Frame::parse_all(b"MESSAGE\nbad:\\t\n\n\0"),
            Err(FrameError::InvalidEscape(_))
        ));
    }
}
