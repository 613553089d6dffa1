//! TX audio: captured frames to Opus VITA packets.
//!
//! Every frame goes through one mutex-guarded [`TxState`]: check the pipeline
//! is running and has a granted stream, encode, stamp the cached packet
//! template with the stream ID and 4-bit sequence, then send.

use super::codec::{AudioEncoder, MAX_OPUS_PACKET};
use crate::core::types::{SharedStreamId, StreamId};
use crate::protocol::vita::{
    self, ClassId, PacketHeader, PacketType, TsfType, TsiType,
};
use crate::transport::PacketSink;
use parking_lot::Mutex;
use std::sync::Arc;

/// Result of offering one frame to the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Packet handed to the sink
    Sent,
    /// Pipeline not started
    Stopped,
    /// No stream granted yet
    NoStream,
    /// Encoder rejected the frame
    EncodeFailed,
    /// Sink reported an error
    SendFailed,
}

/// Reusable Opus packet template
pub struct OpusTxPacket {
    header: PacketHeader,
    class_id: ClassId,
    buf: Vec<u8>,
}

impl OpusTxPacket {
    pub fn new() -> Self {
        Self {
            header: PacketHeader {
                packet_type: PacketType::ExtDataWithStream,
                class_id_present: true,
                trailer_present: false,
                tsi: TsiType::Other,
                tsf: TsfType::SampleCount,
                packet_count: 0,
                packet_size: 0,
            },
            class_id: ClassId::OPUS,
            buf: Vec::with_capacity(vita::HEADER_LEN + MAX_OPUS_PACKET),
        }
    }

    /// Stamp stream ID, sequence and payload; returns the wire bytes
    pub fn fill(&mut self, stream_id: StreamId, sequence: u8, payload: &[u8]) -> crate::Result<&[u8]> {
        self.header.packet_count = sequence & 0x0F;
        vita::encode_into(&mut self.buf, &self.header, stream_id, &self.class_id, payload)?;
        Ok(&self.buf)
    }
}

impl Default for OpusTxPacket {
    fn default() -> Self {
        Self::new()
    }
}

struct TxState {
    running: bool,
    sequence: u8,
    target: SharedStreamId,
    sink: Option<Arc<dyn PacketSink>>,
    template: OpusTxPacket,
    encoder: Box<dyn AudioEncoder>,
    encoded: Vec<u8>,
    samples: Vec<f32>,
}

/// Encode-and-send side of TX audio
pub struct TxPipeline {
    state: Mutex<TxState>,
}

impl TxPipeline {
    pub fn new(encoder: Box<dyn AudioEncoder>) -> Self {
        Self {
            state: Mutex::new(TxState {
                running: false,
                sequence: 0,
                target: SharedStreamId::default(),
                sink: None,
                template: OpusTxPacket::new(),
                encoder,
                encoded: vec![0; MAX_OPUS_PACKET],
                samples: Vec::new(),
            }),
        }
    }

    /// Arm the pipeline; a no-op while already running
    ///
    /// The sequence restarts at 0. `target` may still be unassigned.
    pub fn start(&self, sink: Arc<dyn PacketSink>, target: SharedStreamId) {
        let mut state = self.state.lock();
        if state.running {
            return;
        }
        state.running = true;
        state.sequence = 0;
        state.sink = Some(sink);
        state.target = target;
        log::info!("TX audio started");
    }

    /// Disarm the pipeline; a no-op while stopped
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if !state.running {
            return;
        }
        state.running = false;
        state.sink = None;
        log::info!("TX audio stopped");
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Sequence value the next packet will carry
    pub fn sequence(&self) -> u8 {
        self.state.lock().sequence
    }

    /// Encode and send one interleaved float frame
    pub fn process_frame(&self, pcm: &[f32]) -> TxOutcome {
        let mut state = self.state.lock();
        let state = &mut *state;
        if !state.running {
            return TxOutcome::Stopped;
        }
        let stream_id = state.target.get();
        if !stream_id.is_valid() {
            return TxOutcome::NoStream;
        }
        Self::encode_and_send(state, stream_id, pcm)
    }

    /// Same as [`process_frame`](Self::process_frame) for raw little-endian
    /// f32 bytes; a trailing partial sample is ignored
    pub fn process_frame_bytes(&self, bytes: &[u8]) -> TxOutcome {
        let mut state = self.state.lock();
        let state = &mut *state;
        if !state.running {
            return TxOutcome::Stopped;
        }
        let stream_id = state.target.get();
        if !stream_id.is_valid() {
            return TxOutcome::NoStream;
        }

        let mut samples = std::mem::take(&mut state.samples);
        samples.clear();
        samples.extend(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])),
        );
        let outcome = Self::encode_and_send(state, stream_id, &samples);
        state.samples = samples;
        outcome
    }

    fn encode_and_send(state: &mut TxState, stream_id: StreamId, pcm: &[f32]) -> TxOutcome {
        let len = match state.encoder.encode_float(pcm, &mut state.encoded) {
            Ok(len) => len,
            Err(e) => {
                log::warn!("TX audio encode failed, dropping frame: {}", e);
                return TxOutcome::EncodeFailed;
            }
        };

        let sequence = state.sequence;
        let packet = match state.template.fill(stream_id, sequence, &state.encoded[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                log::warn!("TX audio packetize failed: {}", e);
                return TxOutcome::EncodeFailed;
            }
        };
        state.sequence = (sequence + 1) % 16;

        let Some(sink) = state.sink.as_ref() else {
            return TxOutcome::Stopped;
        };
        match sink.send_packet(packet) {
            Ok(()) => TxOutcome::Sent,
            Err(e) => {
                log::warn!("TX audio send failed: {}", e);
                TxOutcome::SendFailed
            }
        }
    }
}

/// Regroups arbitrarily sized capture buffers into exact codec frames
pub struct FrameAccumulator {
    frame_len: usize,
    buf: Vec<f32>,
}

impl FrameAccumulator {
    /// `frame_len` is interleaved samples per frame (480 for 10 ms stereo)
    pub fn new(frame_len: usize) -> Self {
        let frame_len = frame_len.max(1);
        Self {
            frame_len,
            buf: Vec::with_capacity(frame_len),
        }
    }

    /// Append samples, calling `on_frame` for every completed frame
    pub fn push<F: FnMut(&[f32])>(&mut self, mut samples: &[f32], mut on_frame: F) {
        while !samples.is_empty() {
            let take = (self.frame_len - self.buf.len()).min(samples.len());
            self.buf.extend_from_slice(&samples[..take]);
            samples = &samples[take..];
            if self.buf.len() == self.frame_len {
                on_frame(&self.buf);
                self.buf.clear();
            }
        }
    }

    /// Samples waiting for the next frame
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }
}
