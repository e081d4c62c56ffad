//! Host-side view of the device's output stream.
//!
//! The device writes acknowledgements (`A`, `E`) and channel reports
//! (`<id>,<value>`) on one link. [`StreamSplitter`] cuts the byte stream into
//! lines at `;` or newline, [`DeviceMessage::parse`] classifies each line and
//! [`ChannelHistory`] keeps the most recent values per channel.

use crate::protocol::MAX_OUTBOUND_SIZE;
use arrayvec::ArrayString;
use heapless::Deque;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const HISTORY_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("empty line")]
    Empty,
    #[error("malformed device line: {0:?}")]
    Malformed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceMessage {
    Ack,
    Error,
    Channel { id: i32, value: i32 },
}

impl DeviceMessage {
    pub fn parse(line: &str) -> Result<Self, MonitorError> {
        let line = line.trim();
        if line.is_empty() {
            return Err(MonitorError::Empty);
        }

        match line {
            "A" => return Ok(Self::Ack),
            "E" => return Ok(Self::Error),
            _ => {}
        }

        let malformed = || MonitorError::Malformed(line.to_string());
        let (id, value) = line.split_once(',').ok_or_else(malformed)?;
        let id = id.trim().parse::<i32>().map_err(|_| malformed())?;
        let value = value.trim().parse::<i32>().map_err(|_| malformed())?;
        Ok(Self::Channel { id, value })
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Self::Ack | Self::Error)
    }
}

/// Splits a byte stream into text lines at `;`, `\n` or `\r`.
///
/// A line holds at most [`MAX_OUTBOUND_SIZE`] bytes, the most the device ever
/// sends. Bytes past that are dropped until the next terminator.
#[derive(Debug, Default)]
pub struct StreamSplitter {
    buffer: ArrayString<MAX_OUTBOUND_SIZE>,
    bytes_dropped: u32,
}

impl StreamSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns the complete, non-empty lines it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in chunk {
            match byte {
                b';' | b'\n' | b'\r' => {
                    if !self.buffer.trim().is_empty() {
                        lines.push(self.buffer.to_string());
                    }
                    self.buffer.clear();
                }
                _ => {
                    if self.buffer.try_push(char::from(byte)).is_err() {
                        self.bytes_dropped = self.bytes_dropped.wrapping_add(1);
                    }
                }
            }
        }
        lines
    }

    pub fn bytes_dropped(&self) -> u32 {
        self.bytes_dropped
    }
}

/// The last [`HISTORY_DEPTH`] values seen on each channel.
#[derive(Debug, Default)]
pub struct ChannelHistory {
    channels: BTreeMap<i32, Deque<i32, HISTORY_DEPTH>>,
}

impl ChannelHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: i32, value: i32) {
        let values = self.channels.entry(id).or_default();
        if values.is_full() {
            values.pop_front();
        }
        // Space was made above.
        let _ = values.push_back(value);
    }

    /// Records channel messages; acknowledgements are ignored.
    pub fn observe(&mut self, message: &DeviceMessage) {
        if let DeviceMessage::Channel { id, value } = *message {
            self.record(id, value);
        }
    }

    /// Oldest first.
    pub fn values(&self, id: i32) -> Vec<i32> {
        self.channels
            .get(&id)
            .map(|values| values.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn latest(&self, id: i32) -> Option<i32> {
        self.channels.get(&id).and_then(|values| values.back().copied())
    }

    pub fn channel_ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.channels.keys().copied()
    }
}
