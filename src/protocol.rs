//! Serial command protocol.
//!
//! Inbound lines look like `<code>[,<param>]` followed by the terminator
//! (`;` by default). The firmware answers every line with a single `A` or
//! `E`. Integer fields are parsed the way `atoi` does: leading whitespace,
//! an optional sign and a run of digits; anything unparsable is `0`.

use arrayvec::ArrayString;
use core::fmt::Write;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use thiserror::Error;
use tracing::{debug, trace};

/// Framer buffer size, including the slot reserved for the terminator.
pub const LINE_CAPACITY: usize = 32;
/// Longest line content the framer can hold.
pub const MAX_LINE_LEN: usize = LINE_CAPACITY - 1;
pub const MAX_OUTBOUND_SIZE: usize = 32;

pub const SEPARATOR: u8 = b',';

pub const CMD_PIEZO_TEST: i32 = 2;
pub const CMD_SET_SERVO: i32 = 20;
pub const CMD_SET_LIGHT: i32 = 30;

const_assert!(LINE_CAPACITY >= 2);
// "-2147483648,-2147483648" plus a line ending must fit an outbound line.
const_assert!(MAX_OUTBOUND_SIZE >= 26);

pub type OutboundLine = ArrayString<MAX_OUTBOUND_SIZE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("outbound message exceeds buffer size")]
    MessageTooLarge,
}

/// One complete inbound line, without its terminator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawLine {
    bytes: Vec<u8, MAX_LINE_LEN>,
    truncated: bool,
}

impl RawLine {
    /// Builds a line the way the framer would, dropping bytes past capacity.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut line = Self::default();
        for &byte in bytes {
            if line.bytes.push(byte).is_err() {
                line.truncated = true;
            }
        }
        line
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether bytes were dropped while this line was accumulated.
    pub fn was_truncated(&self) -> bool {
        self.truncated
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FramerStats {
    pub lines_framed: u32,
    pub bytes_dropped: u32,
    pub truncated_lines: u32,
}

/// Accumulates bytes into [`RawLine`]s.
///
/// Overflow is dropped silently and the truncated line is still dispatched
/// when the terminator arrives; there is no resynchronisation.
#[derive(Debug)]
pub struct LineFramer {
    current: RawLine,
    terminator: u8,
    stats: FramerStats,
}

impl LineFramer {
    pub fn new(terminator: u8) -> Self {
        Self {
            current: RawLine::default(),
            terminator,
            stats: FramerStats::default(),
        }
    }

    pub fn feed(&mut self, byte: u8) -> Option<RawLine> {
        if byte == self.terminator {
            let line = core::mem::take(&mut self.current);
            self.stats.lines_framed = self.stats.lines_framed.wrapping_add(1);
            if line.truncated {
                self.stats.truncated_lines = self.stats.truncated_lines.wrapping_add(1);
            }
            return Some(line);
        }

        if self.current.bytes.push(byte).is_err() {
            self.current.truncated = true;
            self.stats.bytes_dropped = self.stats.bytes_dropped.wrapping_add(1);
            trace!(byte, "framer full, byte dropped");
        }
        None
    }

    /// Bytes accumulated towards the next line.
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    pub fn reset(&mut self) {
        self.current = RawLine::default();
    }

    pub fn get_stats(&self) -> &FramerStats {
        &self.stats
    }
}

/// Decoded operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    PiezoTest,
    SetServo(i32),
    SetLight(bool),
    Unrecognized(i32),
}

impl Command {
    pub fn from_code(code: i32, param: i32) -> Self {
        match code {
            CMD_PIEZO_TEST => Command::PiezoTest,
            CMD_SET_SERVO => Command::SetServo(param),
            CMD_SET_LIGHT => Command::SetLight(param == 1),
            other => Command::Unrecognized(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Command::PiezoTest => CMD_PIEZO_TEST,
            Command::SetServo(_) => CMD_SET_SERVO,
            Command::SetLight(_) => CMD_SET_LIGHT,
            Command::Unrecognized(code) => *code,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Command::Unrecognized(_))
    }

    pub fn ack(&self) -> AckSymbol {
        if self.is_recognized() {
            AckSymbol::Ack
        } else {
            AckSymbol::Error
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckSymbol {
    Ack,
    Error,
}

impl AckSymbol {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckSymbol::Ack => "A",
            AckSymbol::Error => "E",
        }
    }
}

/// `atoi`-style integer parse: the leading numeric prefix, or `0`.
///
/// Values beyond the `i32` range saturate.
pub fn parse_or_default(bytes: &[u8]) -> i32 {
    let mut rest = bytes;
    while let [first, tail @ ..] = rest {
        if first.is_ascii_whitespace() {
            rest = tail;
        } else {
            break;
        }
    }

    let negative = match rest.first() {
        Some(b'-') => {
            rest = &rest[1..];
            true
        }
        Some(b'+') => {
            rest = &rest[1..];
            false
        }
        _ => false,
    };

    let mut magnitude: i64 = 0;
    for &byte in rest.iter().take_while(|b| b.is_ascii_digit()) {
        magnitude = (magnitude * 10 + i64::from(byte - b'0')).min(i64::from(i32::MAX) + 1);
    }

    let value = if negative { -magnitude } else { magnitude };
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Decodes one line into a command and the acknowledgement owed for it.
pub fn decode(line: &RawLine) -> (Command, AckSymbol) {
    let bytes = line.as_bytes();
    let (code, param) = match bytes.iter().position(|&b| b == SEPARATOR) {
        Some(split) => (
            parse_or_default(&bytes[..split]),
            parse_or_default(&bytes[split + 1..]),
        ),
        None => (parse_or_default(bytes), 0),
    };

    let command = Command::from_code(code, param);
    (command, command.ack())
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub lines_decoded: u32,
    pub acks_sent: u32,
    pub errors_sent: u32,
}

/// Decoding bookkeeping plus formatting of outbound lines.
#[derive(Debug)]
pub struct ProtocolHandler {
    line_ending: ArrayString<4>,
    response_buffer: OutboundLine,
    stats: ProtocolStats,
    last_command: Option<Command>,
}

impl ProtocolHandler {
    pub fn new(line_ending: &str) -> Result<Self, ProtocolError> {
        let line_ending = ArrayString::from(line_ending).map_err(|_| ProtocolError::MessageTooLarge)?;
        Ok(Self {
            line_ending,
            response_buffer: ArrayString::new(),
            stats: ProtocolStats::default(),
            last_command: None,
        })
    }

    pub fn decode_line(&mut self, line: &RawLine) -> (Command, AckSymbol) {
        let (command, ack) = decode(line);
        self.stats.lines_decoded = self.stats.lines_decoded.wrapping_add(1);
        match ack {
            AckSymbol::Ack => self.stats.acks_sent = self.stats.acks_sent.wrapping_add(1),
            AckSymbol::Error => self.stats.errors_sent = self.stats.errors_sent.wrapping_add(1),
        }
        self.last_command = Some(command);

        debug!(
            line = %line.to_string_lossy(),
            truncated = line.was_truncated(),
            ?command,
            ack = ack.as_str(),
            "decoded command"
        );
        (command, ack)
    }

    pub fn format_ack(&mut self, ack: AckSymbol) -> Result<&str, ProtocolError> {
        self.response_buffer.clear();
        write!(self.response_buffer, "{}{}", ack.as_str(), self.line_ending)
            .map_err(|_| ProtocolError::MessageTooLarge)?;
        Ok(self.response_buffer.as_str())
    }

    /// `<channel>,<value>[<delimiter>]` followed by the line ending.
    pub fn format_channel_value(
        &mut self,
        channel: i32,
        value: i32,
        delimiter: Option<char>,
    ) -> Result<&str, ProtocolError> {
        self.response_buffer.clear();
        write!(self.response_buffer, "{},{}", channel, value).map_err(|_| ProtocolError::MessageTooLarge)?;
        if let Some(delimiter) = delimiter {
            self.response_buffer
                .try_push(delimiter)
                .map_err(|_| ProtocolError::MessageTooLarge)?;
        }
        self.response_buffer
            .try_push_str(&self.line_ending)
            .map_err(|_| ProtocolError::MessageTooLarge)?;
        Ok(self.response_buffer.as_str())
    }

    pub fn last_command(&self) -> Option<Command> {
        self.last_command
    }

    pub fn get_stats(&self) -> &ProtocolStats {
        &self.stats
    }
}
