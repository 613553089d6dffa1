//! Dispatch loop: routes incoming VITA packets to the stream that owns them.
//!
//! The dispatcher owns all per-stream state. Packets and control messages
//! arrive on separate channels and are handled one at a time on the calling
//! thread, so the waterfall reassembler needs no locking.

use crate::audio::codec::{AudioDecoder, AudioEncoder};
use crate::audio::engine::{AudioBackend, AudioEngine};
use crate::audio::rx::RxPipeline;
use crate::audio::tx::TxPipeline;
use crate::config::{Config, EventConfig};
use crate::core::events::{Event, EventBus};
use crate::core::types::{SharedStreamId, StreamId, StreamKind};
use crate::error::Result;
use crate::protocol::vita::VitaPacket;
use crate::transport::PacketSink;
use crate::waterfall::WaterfallReassembler;
use crossbeam_channel::{select, Receiver};
use std::sync::Arc;

/// Control-plane input to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    /// The radio granted a stream for `kind`
    StreamAssigned { kind: StreamKind, id: StreamId },
    /// The stream for `kind` was torn down
    StreamRemoved { kind: StreamKind },
    /// Enable or disable RX playback and TX capture together
    SetAudio(bool),
    /// Select the playback device by ID
    SetAudioSink(String),
    /// Select the capture device by ID
    SetAudioSource(String),
    Shutdown,
}

/// Where a packet went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Waterfall,
    RxAudio,
    Ignored,
}

/// Stream IDs currently assigned by the radio
#[derive(Debug, Default)]
pub struct StreamTable {
    pub waterfall: StreamId,
    pub rx_audio: StreamId,
    /// Shared with the TX capture context
    pub tx_audio: SharedStreamId,
}

impl StreamTable {
    pub fn get(&self, kind: StreamKind) -> StreamId {
        match kind {
            StreamKind::Waterfall => self.waterfall,
            StreamKind::RxAudio => self.rx_audio,
            StreamKind::TxAudio => self.tx_audio.get(),
        }
    }

    fn set(&mut self, kind: StreamKind, id: StreamId) {
        match kind {
            StreamKind::Waterfall => self.waterfall = id,
            StreamKind::RxAudio => self.rx_audio = id,
            StreamKind::TxAudio => self.tx_audio.set(id),
        }
    }
}

pub struct Dispatcher<B: AudioBackend> {
    streams: StreamTable,
    waterfall: Option<WaterfallReassembler>,
    rx: RxPipeline,
    engine: AudioEngine<B>,
    sink: Arc<dyn PacketSink>,
    bus: Arc<EventBus>,
    subscriber_capacity: usize,
}

impl<B: AudioBackend> Dispatcher<B> {
    /// Wire the engine, both audio pipelines and the event bus from `config`
    pub fn from_config(
        config: &Config,
        backend: B,
        decoder: Box<dyn AudioDecoder>,
        encoder: Box<dyn AudioEncoder>,
        sink: Arc<dyn PacketSink>,
    ) -> Result<Self> {
        config.validate()?;
        let bus = Arc::new(EventBus::new());
        let tx = Arc::new(TxPipeline::new(encoder));
        let engine = AudioEngine::new(backend, &config.audio, tx, Arc::clone(&bus));
        let rx = RxPipeline::new(
            engine.rx_shared(),
            decoder,
            config.audio.decode_buffer_samples,
        );
        let mut dispatcher = Self::new(engine, rx, sink, bus);
        dispatcher.subscriber_capacity = config.events.subscriber_capacity;
        Ok(dispatcher)
    }

    /// [`from_config`](Self::from_config) with Opus at the configured rate and bitrate
    #[cfg(feature = "opus")]
    pub fn with_opus(config: &Config, backend: B, sink: Arc<dyn PacketSink>) -> Result<Self> {
        use crate::audio::codec::{OpusDecoder, OpusEncoder};

        let decoder = OpusDecoder::new(config.audio.sample_rate)?;
        let encoder = OpusEncoder::new(config.audio.sample_rate, config.audio.opus_bitrate)?;
        Self::from_config(config, backend, Box::new(decoder), Box::new(encoder), sink)
    }

    /// `rx` must decode into `engine`'s jitter buffer
    pub fn new(
        engine: AudioEngine<B>,
        rx: RxPipeline,
        sink: Arc<dyn PacketSink>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            streams: StreamTable::default(),
            waterfall: None,
            rx,
            engine,
            sink,
            bus,
            subscriber_capacity: EventConfig::default().subscriber_capacity,
        }
    }

    /// Subscribe to engine events with the configured queue depth
    pub fn subscribe(&self) -> Receiver<Event> {
        self.bus.subscribe(self.subscriber_capacity)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn streams(&self) -> &StreamTable {
        &self.streams
    }

    pub fn engine(&self) -> &AudioEngine<B> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AudioEngine<B> {
        &mut self.engine
    }

    /// Route one packet by stream ID
    pub fn handle_packet(&mut self, packet: &VitaPacket) -> Routed {
        let id = packet.stream_id;
        if !id.is_valid() {
            return Routed::Ignored;
        }

        if id == self.streams.waterfall {
            let bus = &self.bus;
            let reassembler = self
                .waterfall
                .get_or_insert_with(|| WaterfallReassembler::new(Arc::clone(bus)));
            if let Err(e) = reassembler.process_payload(&packet.payload) {
                log::debug!("Dropping waterfall packet: {}", e);
            }
            Routed::Waterfall
        } else if id == self.streams.rx_audio {
            self.rx.decode(&packet.payload);
            Routed::RxAudio
        } else {
            log::trace!("Ignoring packet for unknown stream {}", id);
            Routed::Ignored
        }
    }

    /// Apply one control message (other than shutdown)
    pub fn handle_control(&mut self, control: Control) {
        match control {
            Control::StreamAssigned { kind, id } => {
                if !id.is_valid() {
                    self.remove_stream(kind);
                    return;
                }
                log::info!("{} stream assigned: {}", kind, id);
                if kind == StreamKind::Waterfall && self.streams.waterfall != id {
                    self.waterfall = None;
                }
                self.streams.set(kind, id);
                self.bus.publish(Event::StreamEstablished {
                    kind,
                    stream_id: id,
                });
            }
            Control::StreamRemoved { kind } => self.remove_stream(kind),
            Control::SetAudio(true) => {
                // Failures are logged by the engine; RX and TX are independent
                let _ = self.engine.start();
                let _ = self
                    .engine
                    .start_tx(Arc::clone(&self.sink), self.streams.tx_audio.clone());
            }
            Control::SetAudio(false) => {
                self.engine.stop_tx();
                self.engine.pause();
            }
            Control::SetAudioSink(device) => {
                let _ = self.engine.set_audio_sink(&device);
            }
            Control::SetAudioSource(device) => {
                let _ = self.engine.set_audio_source(&device);
            }
            Control::Shutdown => self.engine.shutdown(),
        }
    }

    fn remove_stream(&mut self, kind: StreamKind) {
        let old = self.streams.get(kind);
        if !old.is_valid() {
            return;
        }
        log::info!("{} stream removed: {}", kind, old);
        if kind == StreamKind::Waterfall {
            self.waterfall = None;
        }
        self.streams.set(kind, StreamId::NONE);
        self.bus.publish(Event::StreamRemoved {
            kind,
            stream_id: old,
        });
    }

    /// Run until [`Control::Shutdown`] or both channels disconnect
    ///
    /// Audio is stopped on exit.
    pub fn run(&mut self, packets: Receiver<VitaPacket>, control: Receiver<Control>) {
        log::info!("Dispatch loop started");

        let exit = loop {
            select! {
                recv(packets) -> msg => match msg {
                    Ok(packet) => {
                        self.handle_packet(&packet);
                    }
                    Err(_) => break LoopExit::PacketsClosed,
                },
                recv(control) -> msg => match msg {
                    Ok(Control::Shutdown) => break LoopExit::Shutdown,
                    Ok(cmd) => self.handle_control(cmd),
                    Err(_) => break LoopExit::ControlClosed,
                },
            }
        };

        match exit {
            LoopExit::Shutdown => {}
            LoopExit::PacketsClosed => {
                log::info!("Packet channel closed");
                for cmd in control.iter() {
                    if cmd == Control::Shutdown {
                        break;
                    }
                    self.handle_control(cmd);
                }
            }
            LoopExit::ControlClosed => {
                log::info!("Control channel closed");
                for packet in packets.iter() {
                    self.handle_packet(&packet);
                }
            }
        }

        self.engine.shutdown();
        log::info!("Dispatch loop stopped");
    }
}

enum LoopExit {
    Shutdown,
    PacketsClosed,
    ControlClosed,
}
