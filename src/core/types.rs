//! Stream identifiers and stream purposes.
//!
//! The radio assigns a 32-bit ID to every stream it creates. Zero means
//! "unassigned" and is what a torn-down stream reverts to.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Radio-assigned VITA stream identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u32);

impl StreamId {
    /// Unassigned stream
    pub const NONE: StreamId = StreamId(0);

    /// True once the radio has assigned the stream
    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Lowercase `0x%08x` form, as used when composing control-plane commands
    pub fn to_lower_hex(self) -> String {
        format!("0x{:08x}", self.0)
    }

    /// Parse `0x1234ABCD`, `0X…`, bare hex, or an object name like `stream 0x…`
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let hex = trimmed.strip_prefix("stream ").unwrap_or(trimmed);
        let hex = hex
            .strip_prefix("0x")
            .or_else(|| hex.strip_prefix("0X"))
            .unwrap_or(hex);
        u32::from_str_radix(hex, 16)
            .map(StreamId)
            .map_err(|e| Error::InvalidPacket(format!("bad stream id {:?}: {}", s, e)))
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StreamId::parse(s)
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        StreamId(id)
    }
}

/// Stream ID cell shared between the control path and the TX capture context
///
/// The capture callback reads it once per frame; the dispatcher writes it when
/// the radio grants or removes the TX stream.
#[derive(Debug, Clone, Default)]
pub struct SharedStreamId(Arc<AtomicU32>);

impl SharedStreamId {
    pub fn new(id: StreamId) -> Self {
        Self(Arc::new(AtomicU32::new(id.0)))
    }

    #[inline]
    pub fn get(&self) -> StreamId {
        StreamId(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, id: StreamId) {
        self.0.store(id.0, Ordering::Release);
    }

    /// Revert to unassigned
    pub fn clear(&self) {
        self.set(StreamId::NONE);
    }
}

/// Purpose of a radio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Waterfall,
    RxAudio,
    TxAudio,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Waterfall => "waterfall",
            StreamKind::RxAudio => "rx_audio",
            StreamKind::TxAudio => "tx_audio",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
