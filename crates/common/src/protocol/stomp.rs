// STOMP 1.2 text frames as carried over the `/live` WebSocket endpoint.
//
// One WebSocket text message carries exactly one frame (or a heartbeat EOL).
// Frames are `COMMAND\n(header:value\n)*\nBODY\0`.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Negotiated protocol version announced in CONNECTED frames.
pub const PROTOCOL_VERSION: &str = "1.2";

/// WebSocket subprotocols accepted on the handshake, preferred first.
pub const STOMP_SUBPROTOCOLS: [&str; 3] = ["v12.stomp", "v11.stomp", "v10.stomp"];

/// A bare EOL is a STOMP heartbeat.
pub const HEARTBEAT: &str = "\n";

pub const ACCESS_TOKEN_HEADER: &str = "accessToken";
pub const ACCEPT_VERSION_HEADER: &str = "accept-version";
pub const ACK_HEADER: &str = "ack";
pub const CONTENT_LENGTH_HEADER: &str = "content-length";
pub const CONTENT_TYPE_HEADER: &str = "content-type";
pub const DESTINATION_HEADER: &str = "destination";
pub const HEART_BEAT_HEADER: &str = "heart-beat";
pub const ID_HEADER: &str = "id";
pub const MESSAGE_HEADER: &str = "message";
pub const MESSAGE_ID_HEADER: &str = "message-id";
pub const RECEIPT_HEADER: &str = "receipt";
pub const RECEIPT_ID_HEADER: &str = "receipt-id";
pub const SUBSCRIPTION_HEADER: &str = "subscription";
pub const VERSION_HEADER: &str = "version";

/// Every command verb defined by STOMP 1.2, client and server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Stomp,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub const ALL: [Command; 15] = [
        Self::Connect,
        Self::Stomp,
        Self::Send,
        Self::Subscribe,
        Self::Unsubscribe,
        Self::Ack,
        Self::Nack,
        Self::Begin,
        Self::Commit,
        Self::Abort,
        Self::Disconnect,
        Self::Connected,
        Self::Message,
        Self::Receipt,
        Self::Error,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are sent verbatim, without escape sequences.
    pub const fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|command| command.as_str() == value)
            .ok_or_else(|| ParseError::UnknownCommand(value.to_owned()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown STOMP command `{0}`")]
    UnknownCommand(String),
    #[error("frame ends before the header block is terminated")]
    Truncated,
    #[error("malformed header line `{0}`")]
    MalformedHeader(String),
    #[error("invalid escape sequence in header `{0}`")]
    InvalidEscape(String),
    #[error("invalid content-length `{0}`")]
    InvalidContentLength(String),
    #[error("frame is missing its NUL terminator")]
    MissingNullTerminator,
}

/// Ordered header list. Repeated headers are kept, and the first one wins on lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameHeaders(Vec<(String, String)>);

impl FrameHeaders {
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.0.iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    command: Command,
    headers: FrameHeaders,
    body: String,
}

impl StompFrame {
    pub fn new(command: Command) -> Self {
        Self { command, headers: FrameHeaders::default(), body: String::new() }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn headers(&self) -> &FrameHeaders {
        &self.headers
    }

    /// First value of a native (frame-level) header.
    pub fn first_native_header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Command::Error).with_header(MESSAGE_HEADER, message)
    }
}

/// One decoded WebSocket text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Heartbeat,
    Frame(StompFrame),
}

pub fn decode_frame(raw: &str) -> Result<Inbound, ParseError> {
    let trimmed = raw.trim_start_matches(['\r', '\n']);
    if trimmed.is_empty() {
        return Ok(Inbound::Heartbeat);
    }

    let (command_line, mut rest) = split_line(trimmed).ok_or(ParseError::Truncated)?;
    let command = command_line.parse::<Command>()?;
    let escaped = command.escapes_headers();

    let mut headers = FrameHeaders::default();
    loop {
        let (line, next) = split_line(rest).ok_or(ParseError::Truncated)?;
        rest = next;
        if line.is_empty() {
            break;
        }

        let (name, value) =
            line.split_once(':').ok_or_else(|| ParseError::MalformedHeader(line.to_owned()))?;
        if escaped {
            headers.push(unescape(name)?, unescape(value)?);
        } else {
            headers.push(name, value);
        }
    }

    let body = match headers.first(CONTENT_LENGTH_HEADER) {
        Some(declared) => {
            let length = declared
                .trim()
                .parse::<usize>()
                .map_err(|_| ParseError::InvalidContentLength(declared.to_owned()))?;
            let body = rest
                .get(..length)
                .ok_or_else(|| ParseError::InvalidContentLength(declared.to_owned()))?;
            if rest.as_bytes().get(length) != Some(&0) {
                return Err(ParseError::MissingNullTerminator);
            }
            body
        }
        None => {
            let end = rest.find('\0').ok_or(ParseError::MissingNullTerminator)?;
            &rest[..end]
        }
    };

    Ok(Inbound::Frame(StompFrame { command, headers, body: body.to_owned() }))
}

pub fn encode_frame(frame: &StompFrame) -> String {
    let escaped = frame.command.escapes_headers();
    let mut out = String::with_capacity(frame.body.len() + 64);

    out.push_str(frame.command.as_str());
    out.push('\n');
    for (name, value) in frame.headers.iter() {
        if escaped {
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
    if !frame.body.is_empty() && frame.headers.first(CONTENT_LENGTH_HEADER).is_none() {
        out.push_str(CONTENT_LENGTH_HEADER);
        out.push(':');
        out.push_str(&frame.body.len().to_string());
        out.push('\n');
    }
    out.push('\n');
    out.push_str(&frame.body);
    out.push('\0');
    out
}

fn split_line(input: &str) -> Option<(&str, &str)> {
    let index = input.find('\n')?;
    let line = &input[..index];
    Some((line.strip_suffix('\r').unwrap_or(line), &input[index + 1..]))
}

fn unescape(raw: &str) -> Result<String, ParseError> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            Some('\\') => out.push('\\'),
            _ => return Err(ParseError::InvalidEscape(raw.to_owned())),
        }
    }
    Ok(out)
}

fn push_escaped(out: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(raw: &str) -> StompFrame {
        match decode_frame(raw).expect("frame should decode") {
            Inbound::Frame(frame) => frame,
            Inbound::Heartbeat => panic!("expected a frame, got a heartbeat"),
        }
    }

    #[test]
    fn decodes_connect_with_native_access_token() {
        let connect = frame("CONNECT\naccept-version:1.2\naccessToken:abc.def:ghi\n\n\0");

        assert_eq!(connect.command(), Command::Connect);
        // CONNECT headers are not unescaped, so a literal colon survives.
        assert_eq!(connect.first_native_header(ACCESS_TOKEN_HEADER), Some("abc.def:ghi"));
        assert_eq!(connect.body(), "");
    }

    #[test]
    fn eol_only_messages_are_heartbeats() {
        assert_eq!(decode_frame("\n"), Ok(Inbound::Heartbeat));
        assert_eq!(decode_frame("\r\n\r\n"), Ok(Inbound::Heartbeat));
        assert_eq!(decode_frame(""), Ok(Inbound::Heartbeat));
    }

    #[test]
    fn leading_eols_before_a_frame_are_ignored() {
        let ack = frame("\n\nACK\nid:42\n\n\0");
        assert_eq!(ack.command(), Command::Ack);
        assert_eq!(ack.first_native_header(ID_HEADER), Some("42"));
    }

    #[test]
    fn first_repeated_header_wins() {
        let ack = frame("ACK\nid:first\nid:second\n\n\0");
        assert_eq!(ack.first_native_header(ID_HEADER), Some("first"));
        assert_eq!(ack.headers().len(), 2);
    }

    #[test]
    fn unescapes_headers_outside_connect() {
        let subscribe = frame("SUBSCRIBE\nid:sub\\c0\ndestination:/user/events\\n\n\n\0");
        assert_eq!(subscribe.first_native_header(ID_HEADER), Some("sub:0"));
        assert_eq!(subscribe.first_native_header(DESTINATION_HEADER), Some("/user/events\n"));
    }

    #[test]
    fn rejects_invalid_escape_sequences() {
        assert!(matches!(
            decode_frame("ACK\nid:bad\\t\n\n\0"),
            Err(ParseError::InvalidEscape(_))
        ));
    }

    #[test]
    fn honours_content_length_with_embedded_nul() {
        let send = frame("SEND\ndestination:/x\ncontent-length:5\n\na\0b\0c\0");
        assert_eq!(send.body(), "a\0b\0c");
    }

    #[test]
    fn rejects_content_length_past_end_of_frame() {
        assert!(matches!(
            decode_frame("SEND\ncontent-length:50\n\nshort\0"),
            Err(ParseError::InvalidContentLength(_))
        ));
    }

    #[test]
    fn rejects_unknown_commands_and_missing_terminator() {
        assert_eq!(
            decode_frame("SHOUT\n\n\0"),
            Err(ParseError::UnknownCommand("SHOUT".to_owned()))
        );
        assert_eq!(decode_frame("ACK\nid:1\n\n"), Err(ParseError::MissingNullTerminator));
        assert_eq!(decode_frame("ACK\nid:1"), Err(ParseError::Truncated));
    }

    #[test]
    fn rejects_header_without_separator() {
        assert_eq!(
            decode_frame("ACK\nnonsense\n\n\0"),
            Err(ParseError::MalformedHeader("nonsense".to_owned()))
        );
    }

    #[test]
    fn accepts_crlf_line_endings() {
        let ack = frame("ACK\r\nid:7\r\n\r\n\0");
        assert_eq!(ack.first_native_header(ID_HEADER), Some("7"));
    }

    #[test]
    fn encode_escapes_message_headers_and_adds_content_length() {
        let message = StompFrame::new(Command::Message)
            .with_header(DESTINATION_HEADER, "/user/events")
            .with_header(MESSAGE_ID_HEADER, "a:b")
            .with_body("{}");

        let encoded = encode_frame(&message);

        assert_eq!(
            encoded,
            "MESSAGE\ndestination:/user/events\nmessage-id:a\\cb\ncontent-length:2\n\n{}\0"
        );
        assert_eq!(frame(&encoded), message.with_header(CONTENT_LENGTH_HEADER, "2"));
    }

    #[test]
    fn encode_leaves_connected_headers_verbatim() {
        let connected = StompFrame::new(Command::Connected).with_header(HEART_BEAT_HEADER, "0,0");
        assert_eq!(encode_frame(&connected), "CONNECTED\nheart-beat:0,0\n\n\0");
    }

    #[test]
    fn command_names_round_trip_through_from_str() {
        for command in Command::ALL {
            assert_eq!(command.as_str().parse::<Command>(), Ok(command));
        }
    }
}
