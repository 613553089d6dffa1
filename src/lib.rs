//! flexstream - real-time waterfall and audio streaming for networked SDR radios
//!
//! Turns the radio's VITA-style UDP data plane into complete waterfall rows
//! and live audio, and sends captured audio back.
//!
//! ```text
//! UdpSession ─► VitaReceiver ─► Dispatcher ─┬─► WaterfallReassembler ─► EventBus
//!                                           └─► RxPipeline ─► RingBuffer ─► playback
//! capture ─► FrameAccumulator ─► TxPipeline ─► PacketSink (UdpSession)
//! ```
//!
//! ## Features
//!
//! - `opus`: Opus decoder/encoder (links libopus)
//! - `device`: host audio devices through cpal

pub mod audio;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod waterfall;

// Re-export commonly used types
pub use config::Config;
pub use crate::core::events::{Event, EventBus};
pub use crate::core::types::{SharedStreamId, StreamId, StreamKind};
pub use dispatch::{Control, Dispatcher};
pub use error::{Error, Result};
pub use protocol::vita::VitaPacket;
