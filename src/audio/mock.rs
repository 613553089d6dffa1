//! Mock codecs and audio backend for hardware-free testing
//!
//! `MockDecoder` treats a payload as big-endian i16 PCM. `MockEncoder`
//! writes a sample count followed by the samples quantized to i16, so tests
//! can inspect what was sent.

use super::codec::{AudioDecoder, AudioEncoder};
use super::engine::{AudioBackend, AudioDevice};
use super::rx::PlaybackReader;
use super::tx::{FrameAccumulator, TxPipeline};
use crate::error::{Error, Result};
use std::sync::Arc;

/// Raw PCM "decoder"
#[derive(Default)]
pub struct MockDecoder;

impl MockDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Build a payload this decoder expands to `samples`
    pub fn packet(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_be_bytes()).collect()
    }
}

impl AudioDecoder for MockDecoder {
    fn decode(&mut self, packet: &[u8], pcm: &mut [i16]) -> Result<usize> {
        if packet.len() % 2 != 0 {
            return Err(Error::Codec(format!("odd PCM payload of {} bytes", packet.len())));
        }
        let n = (packet.len() / 2).min(pcm.len());
        for (slot, c) in pcm.iter_mut().zip(packet.chunks_exact(2)).take(n) {
            *slot = i16::from_be_bytes([c[0], c[1]]);
        }
        Ok(n)
    }
}

/// Quantizing "encoder"
#[derive(Default)]
pub struct MockEncoder;

impl MockEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Sample count recorded in an encoded payload
    pub fn decoded_len(payload: &[u8]) -> usize {
        if payload.len() < 4 {
            return 0;
        }
        u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize
    }
}

impl AudioEncoder for MockEncoder {
    fn encode_float(&mut self, pcm: &[f32], out: &mut [u8]) -> Result<usize> {
        if pcm.is_empty() {
            return Err(Error::Codec("empty frame".into()));
        }
        let len = 4 + 2 * pcm.len();
        if out.len() < len {
            return Err(Error::Codec(format!(
                "frame of {} samples exceeds output buffer",
                pcm.len()
            )));
        }
        out[..4].copy_from_slice(&(pcm.len() as u32).to_be_bytes());
        for (i, s) in pcm.iter().enumerate() {
            let q = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
            out[4 + 2 * i..6 + 2 * i].copy_from_slice(&q.to_be_bytes());
        }
        Ok(len)
    }
}

/// In-memory audio backend
///
/// Keeps the playback reader so tests can drain it, and pushes samples given
/// to [`feed_capture`](MockBackend::feed_capture) through the TX pipeline in
/// codec-sized frames.
pub struct MockBackend {
    sinks: Vec<AudioDevice>,
    sources: Vec<AudioDevice>,
    reader: Option<PlaybackReader>,
    playing: bool,
    playback_device: Option<String>,
    playback_starts: usize,
    capture: Option<Arc<TxPipeline>>,
    capture_device: Option<String>,
    accumulator: FrameAccumulator,
    fail_playback: bool,
    fail_capture: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_frame_len(480)
    }

    /// `frame_len` is interleaved samples per TX frame
    pub fn with_frame_len(frame_len: usize) -> Self {
        let device = |id: &str, name: &str| AudioDevice {
            id: id.to_string(),
            name: name.to_string(),
        };
        Self {
            sinks: vec![device("mock-sink", "Mock Speakers"), device("usb-headset", "USB Headset")],
            sources: vec![device("mock-source", "Mock Microphone")],
            reader: None,
            playing: false,
            playback_device: None,
            playback_starts: 0,
            capture: None,
            capture_device: None,
            accumulator: FrameAccumulator::new(frame_len),
            fail_playback: false,
            fail_capture: false,
        }
    }

    pub fn set_fail_playback(&mut self, fail: bool) {
        self.fail_playback = fail;
    }

    pub fn set_fail_capture(&mut self, fail: bool) {
        self.fail_capture = fail;
    }

    /// Take the reader handed to the last playback start
    pub fn take_reader(&mut self) -> Option<PlaybackReader> {
        self.reader.take()
    }

    /// Read from the current playback reader like a device callback would
    pub fn pull(&self, out: &mut [f32]) -> Result<usize> {
        match &self.reader {
            Some(reader) => reader.read(out),
            None => Err(Error::Device("playback not started".into())),
        }
    }

    /// Deliver captured samples
    pub fn feed_capture(&mut self, samples: &[f32]) {
        let Some(tx) = self.capture.as_ref() else {
            return;
        };
        self.accumulator.push(samples, |frame| {
            tx.process_frame(frame);
        });
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_some()
    }

    pub fn playback_starts(&self) -> usize {
        self.playback_starts
    }

    pub fn playback_device(&self) -> Option<String> {
        self.playback_device.clone()
    }

    pub fn capture_device(&self) -> Option<String> {
        self.capture_device.clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for MockBackend {
    fn start_playback(&mut self, device: Option<&str>, reader: PlaybackReader) -> Result<()> {
        if self.fail_playback {
            return Err(Error::Device("mock playback failure".into()));
        }
        self.reader = Some(reader);
        self.playing = true;
        self.playback_device = device.map(str::to_string);
        self.playback_starts += 1;
        Ok(())
    }

    fn stop_playback(&mut self) {
        self.reader = None;
        self.playing = false;
    }

    fn start_capture(&mut self, device: Option<&str>, tx: Arc<TxPipeline>) -> Result<()> {
        if self.fail_capture {
            return Err(Error::Device("mock capture failure".into()));
        }
        self.accumulator.reset();
        self.capture = Some(tx);
        self.capture_device = device.map(str::to_string);
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.capture = None;
    }

    fn list_sinks(&self) -> Result<Vec<AudioDevice>> {
        Ok(self.sinks.clone())
    }

    fn list_sources(&self) -> Result<Vec<AudioDevice>> {
        Ok(self.sources.clone())
    }

    fn default_sink(&self) -> Option<AudioDevice> {
        self.sinks.first().cloned()
    }

    fn default_source(&self) -> Option<AudioDevice> {
        self.sources.first().cloned()
    }
}
