//! Typed engine events and a non-blocking publish/subscribe bus.
//!
//! Each subscriber owns a bounded crossbeam channel. [`EventBus::publish`]
//! never blocks the publisher: a subscriber whose queue is full misses the
//! event, and a subscriber whose receiver was dropped is forgotten.

use super::types::{StreamId, StreamKind};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Events published by the streaming engine
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Waterfall row width changed
    WaterfallBinsConfigured { width: u16 },

    /// Frequency span of the incoming rows changed (MHz)
    WaterfallDataRangeChanged { low: f64, high: f64 },

    /// A complete waterfall row was reassembled
    WaterfallRowReceived { bins: Arc<[u16]>, black_level: u32 },

    /// The radio granted a stream
    StreamEstablished { kind: StreamKind, stream_id: StreamId },

    /// A stream was torn down
    StreamRemoved { kind: StreamKind, stream_id: StreamId },

    /// RX playback started or stopped
    RxAudioStateChanged { running: bool },

    /// TX capture started or stopped
    TxAudioStateChanged { running: bool },

    /// Playback or capture moved to another device
    AudioDeviceChanged { kind: StreamKind, device: String },
}

/// Fan-out event bus
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<Event>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a subscriber queue holding up to `capacity` pending events
    pub fn subscribe(&self, capacity: usize) -> Receiver<Event> {
        let (tx, rx) = bounded(capacity.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every subscriber without blocking
    pub fn publish(&self, event: Event) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("Event subscriber full, dropping {:?}", event_name(&event));
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::WaterfallBinsConfigured { .. } => "WaterfallBinsConfigured",
        Event::WaterfallDataRangeChanged { .. } => "WaterfallDataRangeChanged",
        Event::WaterfallRowReceived { .. } => "WaterfallRowReceived",
        Event::StreamEstablished { .. } => "StreamEstablished",
        Event::StreamRemoved { .. } => "StreamRemoved",
        Event::RxAudioStateChanged { .. } => "RxAudioStateChanged",
        Event::TxAudioStateChanged { .. } => "TxAudioStateChanged",
        Event::AudioDeviceChanged { .. } => "AudioDeviceChanged",
    }
}
