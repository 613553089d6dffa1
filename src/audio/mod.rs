//! Live audio in both directions.
//!
//! - [`ring_buffer`] / [`signal`]: jitter buffer and its wakeup
//! - [`rx`]: Opus decode into the jitter buffer, blocking playback reader
//! - [`tx`]: capture frames to sequenced VITA packets
//! - [`convert`]: device format negotiation, resampling and remixing
//! - [`codec`]: decoder/encoder seams (Opus with the `opus` feature)
//! - [`engine`]: playback/capture lifecycle and device selection
//! - [`mock`]: codec and backend doubles for tests
//! - `device`: cpal backend (`device` feature)

pub mod codec;
pub mod convert;
#[cfg(feature = "device")]
pub mod device;
pub mod engine;
pub mod mock;
pub mod ring_buffer;
pub mod rx;
pub mod signal;
pub mod tx;

pub use codec::{AudioDecoder, AudioEncoder, MAX_OPUS_PACKET};
#[cfg(feature = "device")]
pub use device::CpalBackend;
pub use engine::{AudioBackend, AudioDevice, AudioEngine};
pub use ring_buffer::RingBuffer;
pub use rx::{PlaybackReader, ReaderHandle, RxPipeline, RxShared};
pub use signal::Wakeup;
pub use tx::{FrameAccumulator, OpusTxPacket, TxOutcome, TxPipeline};
