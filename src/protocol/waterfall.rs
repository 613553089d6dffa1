//! Waterfall tile payload
//!
//! A waterfall row is split across one or more VITA packets. Each payload is
//! a 36-byte tile header followed by `width` big-endian u16 bins:
//!
//! ```text
//! offset  size  field
//!   0      8    frame low frequency   (Hz, 44.20 fixed point)
//!   8      8    bin bandwidth         (Hz, 44.20 fixed point)
//!  16      4    line duration         (ms)
//!  20      2    width                 (bins in this tile)
//!  22      2    height
//!  24      4    timecode
//!  28      4    auto black level
//!  32      2    total bins in frame
//!  34      2    first bin index
//!  36    2*w    bins
//! ```

use crate::error::{Error, Result};

/// Tile header length in bytes
pub const TILE_HEADER_LEN: usize = 36;

const FIXED_POINT_SHIFT: u32 = 20;

/// One fragment of a waterfall row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaterfallTile {
    /// Frequency of bin 0 of the frame (Hz)
    pub frame_low_freq: u64,
    /// Width of one bin (Hz)
    pub bin_bandwidth: u64,
    pub line_duration_ms: u32,
    pub width: u16,
    pub height: u16,
    pub timecode: u32,
    pub auto_black_level: u32,
    pub total_bins_in_frame: u16,
    pub first_bin_index: u16,
    pub bins: Vec<u16>,
}

impl WaterfallTile {
    /// Parse a tile from a VITA payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < TILE_HEADER_LEN {
            return Err(Error::InvalidPacket(format!(
                "waterfall tile of {} bytes is shorter than its header",
                payload.len()
            )));
        }

        let u64_at = |o: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&payload[o..o + 8]);
            u64::from_be_bytes(b)
        };
        let u32_at = |o: usize| {
            u32::from_be_bytes([payload[o], payload[o + 1], payload[o + 2], payload[o + 3]])
        };
        let u16_at = |o: usize| u16::from_be_bytes([payload[o], payload[o + 1]]);

        let width = u16_at(20);
        let needed = TILE_HEADER_LEN + 2 * width as usize;
        if payload.len() < needed {
            return Err(Error::Truncated {
                declared: needed,
                actual: payload.len(),
            });
        }

        let bins = payload[TILE_HEADER_LEN..needed]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();

        Ok(Self {
            frame_low_freq: u64_at(0) >> FIXED_POINT_SHIFT,
            bin_bandwidth: u64_at(8) >> FIXED_POINT_SHIFT,
            line_duration_ms: u32_at(16),
            width,
            height: u16_at(22),
            timecode: u32_at(24),
            auto_black_level: u32_at(28),
            total_bins_in_frame: u16_at(32),
            first_bin_index: u16_at(34),
            bins,
        })
    }

    /// Serialize in wire layout; `width` is taken from `bins.len()`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(TILE_HEADER_LEN + 2 * self.bins.len());
        out.extend_from_slice(&(self.frame_low_freq << FIXED_POINT_SHIFT).to_be_bytes());
        out.extend_from_slice(&(self.bin_bandwidth << FIXED_POINT_SHIFT).to_be_bytes());
        out.extend_from_slice(&self.line_duration_ms.to_be_bytes());
        out.extend_from_slice(&(self.bins.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&self.timecode.to_be_bytes());
        out.extend_from_slice(&self.auto_black_level.to_be_bytes());
        out.extend_from_slice(&self.total_bins_in_frame.to_be_bytes());
        out.extend_from_slice(&self.first_bin_index.to_be_bytes());
        for bin in &self.bins {
            out.extend_from_slice(&bin.to_be_bytes());
        }
        out
    }
}
