//! RX audio: network decode into the jitter buffer, device playback out of it.
//!
//! ```text
//! dispatch thread                         playback callback
//!  RxPipeline::decode ──► RingBuffer<f32> ──► PlaybackReader::read
//!                  └────► Wakeup ─────────────┘ (blocks only when starved)
//! ```
//!
//! Decode never overwrites buffered audio: once fewer than `headroom` free
//! slots remain, the rest of the decoded batch is dropped.

use super::codec::AudioDecoder;
use super::ring_buffer::RingBuffer;
use super::signal::Wakeup;
use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// State shared by the decode side and every playback reader
pub struct RxShared {
    buffer: RingBuffer<f32>,
    wakeup: Wakeup,
    headroom: usize,
}

impl RxShared {
    pub fn new(capacity: usize, headroom: usize) -> Self {
        Self {
            buffer: RingBuffer::new(capacity),
            wakeup: Wakeup::new(),
            headroom,
        }
    }

    pub fn buffer(&self) -> &RingBuffer<f32> {
        &self.buffer
    }

    /// Buffered samples
    pub fn size(&self) -> usize {
        self.buffer.size()
    }

    pub fn clear(&self) {
        self.buffer.clear();
    }

    /// Append normalized samples, stopping at the overflow threshold
    ///
    /// Returns the number inserted. Wakes a starved reader if any were.
    pub fn push_samples(&self, samples: impl IntoIterator<Item = f32>) -> usize {
        let limit = self.buffer.capacity().saturating_sub(self.headroom);
        let mut inserted = 0;
        let mut overflow = false;
        let mut iter = samples.into_iter();

        for sample in iter.by_ref() {
            if self.buffer.size() > limit {
                overflow = true;
                break;
            }
            self.buffer.insert(sample);
            inserted += 1;
        }

        if overflow {
            log::warn!(
                "RX audio buffer overflow ({} buffered), dropped {} samples",
                self.buffer.size(),
                1 + iter.count()
            );
        }
        if inserted > 0 {
            self.wakeup.notify();
        }
        inserted
    }

    /// Create an open reader
    pub fn reader(self: &Arc<Self>) -> PlaybackReader {
        PlaybackReader {
            shared: Arc::clone(self),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Decode side of the RX pipeline
pub struct RxPipeline {
    shared: Arc<RxShared>,
    decoder: Box<dyn AudioDecoder>,
    pcm: Vec<i16>,
}

impl RxPipeline {
    /// `decode_buffer_samples` bounds the PCM produced by one packet
    pub fn new(
        shared: Arc<RxShared>,
        decoder: Box<dyn AudioDecoder>,
        decode_buffer_samples: usize,
    ) -> Self {
        Self {
            shared,
            decoder,
            pcm: vec![0; decode_buffer_samples.max(1)],
        }
    }

    pub fn shared(&self) -> &Arc<RxShared> {
        &self.shared
    }

    /// Decode one compressed packet into the jitter buffer
    ///
    /// Returns samples inserted. Decoder failures drop the packet.
    pub fn decode(&mut self, payload: &[u8]) -> usize {
        let n = match self.decoder.decode(payload, &mut self.pcm) {
            Ok(n) => n.min(self.pcm.len()),
            Err(e) => {
                log::warn!("RX audio decode failed, dropping packet: {}", e);
                return 0;
            }
        };

        self.shared
            .push_samples(self.pcm[..n].iter().map(|&s| s as f32 / 32768.0))
    }
}

/// Blocking reader handed to the playback device
pub struct PlaybackReader {
    shared: Arc<RxShared>,
    closed: Arc<AtomicBool>,
}

impl PlaybackReader {
    /// Fill `out` with at least one sample
    ///
    /// Blocks only while the buffer is empty and nothing has been read yet.
    /// Returns [`Error::Closed`] once the reader is closed.
    pub fn read(&self, out: &mut [f32]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.is_closed() {
                return Err(Error::Closed);
            }
            let n = self.shared.buffer.pop_into(out);
            if n > 0 {
                return Ok(n);
            }
            if !self.shared.wakeup.wait(&self.closed) {
                return Err(Error::Closed);
            }
        }
    }

    /// Like [`read`](Self::read) but writes little-endian f32 bytes
    ///
    /// Only whole samples are written; returns bytes written.
    pub fn read_bytes(&self, out: &mut [u8]) -> Result<usize> {
        let max_samples = out.len() / 4;
        if max_samples == 0 {
            return Ok(0);
        }
        loop {
            if self.is_closed() {
                return Err(Error::Closed);
            }
            let mut n = 0;
            while n < max_samples {
                match self.shared.buffer.pop_front() {
                    Some(sample) => {
                        out[n * 4..n * 4 + 4].copy_from_slice(&sample.to_le_bytes());
                        n += 1;
                    }
                    None => break,
                }
            }
            if n > 0 {
                return Ok(n * 4);
            }
            if !self.shared.wakeup.wait(&self.closed) {
                return Err(Error::Closed);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Handle that can close this reader from another thread
    pub fn handle(&self) -> ReaderHandle {
        ReaderHandle {
            shared: Arc::clone(&self.shared),
            closed: Arc::clone(&self.closed),
        }
    }
}

/// Closes a [`PlaybackReader`] and releases it if blocked
#[derive(Clone)]
pub struct ReaderHandle {
    shared: Arc<RxShared>,
    closed: Arc<AtomicBool>,
}

impl ReaderHandle {
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.shared.wakeup.release();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
