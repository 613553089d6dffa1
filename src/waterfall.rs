//! Waterfall row reassembly
//!
//! The radio splits each waterfall row across several tiles that share a
//! timecode. [`WaterfallReassembler`] copies tiles into a single row buffer
//! and publishes the row once every bin of the frame has arrived.
//!
//! Only one frame is in flight at a time: a tile with a different timecode
//! abandons whatever was accumulated and starts a new frame.

use crate::core::events::{Event, EventBus};
use crate::error::{Error, Result};
use crate::protocol::waterfall::WaterfallTile;
use std::sync::Arc;

/// Frequency span of a frame in Hz: `(low, high)`
///
/// `high = low + (total_bins - 1) * (bin_bandwidth + 1)`. The extra hertz per
/// bin matches what the radio's display expects.
pub fn frame_range_hz(frame_low_freq: u64, total_bins: u16, bin_bandwidth: u64) -> (u64, u64) {
    let steps = (total_bins as u64).saturating_sub(1);
    (
        frame_low_freq,
        frame_low_freq + steps * (bin_bandwidth + 1),
    )
}

#[inline]
pub fn hz_to_mhz(hz: u64) -> f64 {
    hz as f64 / 1e6
}

/// Outcome of feeding one tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// Frame still missing bins
    Accumulating,
    /// Row published
    RowComplete,
}

/// Single-frame waterfall reassembler
pub struct WaterfallReassembler {
    bus: Arc<EventBus>,
    width: u16,
    bins: Vec<u16>,
    timecode: Option<u32>,
    filled: usize,
    data_low: f64,
    data_high: f64,
}

impl WaterfallReassembler {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            width: 0,
            bins: Vec::new(),
            timecode: None,
            filled: 0,
            data_low: 0.0,
            data_high: 0.0,
        }
    }

    /// Current frame width in bins
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Current frame span in MHz
    pub fn data_range(&self) -> (f64, f64) {
        (self.data_low, self.data_high)
    }

    /// Bins filled in the current frame
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Feed one tile
    ///
    /// A tile reaching past the end of the frame is rejected and leaves the
    /// frame untouched.
    pub fn process(&mut self, tile: &WaterfallTile) -> Result<TileOutcome> {
        if tile.total_bins_in_frame != self.width {
            self.width = tile.total_bins_in_frame;
            self.bins = vec![0; self.width as usize];
            self.timecode = None;
            self.filled = 0;
            log::debug!("Waterfall width changed to {} bins", self.width);
            self.bus.publish(Event::WaterfallBinsConfigured { width: self.width });
        }

        let start = tile.first_bin_index as usize;
        let count = tile.width as usize;
        let end = start + count;
        if self.bins.is_empty() || end > self.bins.len() || tile.bins.len() < count {
            return Err(Error::InvalidPacket(format!(
                "waterfall tile bins {}..{} exceed frame of {}",
                start,
                end,
                self.bins.len()
            )));
        }

        if self.timecode != Some(tile.timecode) {
            self.timecode = Some(tile.timecode);
            let (low, high) =
                frame_range_hz(tile.frame_low_freq, tile.total_bins_in_frame, tile.bin_bandwidth);
            self.data_low = hz_to_mhz(low);
            self.data_high = hz_to_mhz(high);
            self.filled = 0;
            self.bus.publish(Event::WaterfallDataRangeChanged {
                low: self.data_low,
                high: self.data_high,
            });
        }

        self.bins[start..end].copy_from_slice(&tile.bins[..count]);
        self.filled += count;

        if self.filled == self.bins.len() {
            self.bus.publish(Event::WaterfallRowReceived {
                bins: Arc::from(self.bins.as_slice()),
                black_level: tile.auto_black_level,
            });
            Ok(TileOutcome::RowComplete)
        } else {
            Ok(TileOutcome::Accumulating)
        }
    }

    /// Parse a VITA payload and feed it
    pub fn process_payload(&mut self, payload: &[u8]) -> Result<TileOutcome> {
        let tile = WaterfallTile::parse(payload)?;
        self.process(&tile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::Receiver;

    fn tile(total: u16, first: u16, bins: Vec<u16>, timecode: u32) -> WaterfallTile {
        WaterfallTile {
            frame_low_freq: 14_000_000,
            bin_bandwidth: 999,
            line_duration_ms: 100,
            width: bins.len() as u16,
            height: 1,
            timecode,
            auto_black_level: 77,
            total_bins_in_frame: total,
            first_bin_index: first,
            bins,
        }
    }

    fn setup() -> (WaterfallReassembler, Receiver<Event>) {
        let bus = Arc::new(EventBus::new());
        let rx = bus.subscribe(64);
        (WaterfallReassembler::new(bus), rx)
    }

    fn rows(rx: &Receiver<Event>) -> Vec<Arc<[u16]>> {
        rx.try_iter()
            .filter_map(|e| match e {
                Event::WaterfallRowReceived { bins, .. } => Some(bins),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_frame_range() {
        let (low, high) = frame_range_hz(14_000_000, 4, 999);
        assert_eq!(low, 14_000_000);
        assert_eq!(high, 14_003_000);
        assert!((hz_to_mhz(low) - 14.000).abs() < 1e-9);
        assert!((hz_to_mhz(high) - 14.003).abs() < 1e-9);
    }

    #[test]
    fn test_two_fragments_make_one_row() {
        let (mut wf, rx) = setup();
        let first: Vec<u16> = (0..60).collect();
        let second: Vec<u16> = (60..100).collect();

        assert_eq!(wf.process(&tile(100, 0, first, 7)).unwrap(), TileOutcome::Accumulating);
        assert!(rows(&rx).is_empty());

        assert_eq!(wf.process(&tile(100, 60, second, 7)).unwrap(), TileOutcome::RowComplete);
        let rows = rows(&rx);
        assert_eq!(rows.len(), 1);
        let expected: Vec<u16> = (0..100).collect();
        assert_eq!(&rows[0][..], expected.as_slice());
    }

    #[test]
    fn test_event_order() {
        let (mut wf, rx) = setup();
        wf.process(&tile(4, 0, vec![1, 2, 3, 4], 1)).unwrap();

        let events: Vec<Event> = rx.try_iter().collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], Event::WaterfallBinsConfigured { width: 4 });
        match events[1] {
            Event::WaterfallDataRangeChanged { low, high } => {
                assert!((low - 14.0).abs() < 1e-9);
                assert!((high - 14.003).abs() < 1e-9);
            }
            ref other => panic!("unexpected event {:?}", other),
        }
        assert_eq!(
            events[2],
            Event::WaterfallRowReceived {
                bins: Arc::from(&[1u16, 2, 3, 4][..]),
                black_level: 77,
            }
        );
    }

    #[test]
    fn test_new_timecode_abandons_partial_frame() {
        let (mut wf, rx) = setup();
        wf.process(&tile(100, 0, vec![1; 60], 1)).unwrap();
        // Fragment of the next frame: old data is not merged
        wf.process(&tile(100, 60, vec![2; 40], 2)).unwrap();
        assert_eq!(wf.filled(), 40);
        assert!(rows(&rx).is_empty());

        wf.process(&tile(100, 0, vec![3; 60], 2)).unwrap();
        assert_eq!(rows(&rx).len(), 1);
    }

    #[test]
    fn test_width_change_resets() {
        let (mut wf, rx) = setup();
        wf.process(&tile(100, 0, vec![1; 60], 1)).unwrap();
        wf.process(&tile(50, 0, vec![1; 25], 1)).unwrap();

        assert_eq!(wf.width(), 50);
        assert_eq!(wf.filled(), 25);
        let configured: Vec<u16> = rx
            .try_iter()
            .filter_map(|e| match e {
                Event::WaterfallBinsConfigured { width } => Some(width),
                _ => None,
            })
            .collect();
        assert_eq!(configured, vec![100, 50]);
    }

    #[test]
    fn test_out_of_range_tile_dropped() {
        let (mut wf, rx) = setup();
        wf.process(&tile(10, 0, vec![1; 5], 1)).unwrap();
        assert!(wf.process(&tile(10, 8, vec![1; 5], 1)).is_err());
        assert_eq!(wf.filled(), 5);
        assert!(rows(&rx).is_empty());
    }

    #[test]
    fn test_process_payload() {
        let (mut wf, rx) = setup();
        let bytes = tile(2, 0, vec![9, 8], 3).to_bytes();
        assert_eq!(wf.process_payload(&bytes).unwrap(), TileOutcome::RowComplete);
        assert_eq!(rows(&rx).len(), 1);
        assert!(wf.process_payload(&bytes[..10]).is_err());
    }
}
