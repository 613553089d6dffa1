//! Audio engine: playback and capture lifecycle on top of an [`AudioBackend`].

use super::rx::{PlaybackReader, ReaderHandle, RxShared};
use super::tx::TxPipeline;
use crate::config::AudioConfig;
use crate::core::events::{Event, EventBus};
use crate::core::types::{SharedStreamId, StreamKind};
use crate::error::Result;
use crate::transport::PacketSink;
use std::sync::Arc;

/// A playback or capture device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    /// Identifier passed back to the backend when selecting the device
    pub id: String,
    /// Human-readable name
    pub name: String,
}

/// Host audio system
///
/// `None` as a device ID selects the system default.
pub trait AudioBackend {
    /// Start playback pulling from `reader`, replacing any running stream
    fn start_playback(&mut self, device: Option<&str>, reader: PlaybackReader) -> Result<()>;

    fn stop_playback(&mut self);

    /// Start capture feeding fixed-size frames into `tx`
    fn start_capture(&mut self, device: Option<&str>, tx: Arc<TxPipeline>) -> Result<()>;

    fn stop_capture(&mut self);

    fn list_sinks(&self) -> Result<Vec<AudioDevice>>;

    fn list_sources(&self) -> Result<Vec<AudioDevice>>;

    fn default_sink(&self) -> Option<AudioDevice>;

    fn default_source(&self) -> Option<AudioDevice>;
}

/// Owns RX playback and TX capture
pub struct AudioEngine<B: AudioBackend> {
    backend: B,
    rx: Arc<RxShared>,
    tx: Arc<TxPipeline>,
    bus: Arc<EventBus>,
    reader: Option<ReaderHandle>,
    rx_running: bool,
    tx_running: bool,
    sink_device: Option<String>,
    source_device: Option<String>,
}

impl<B: AudioBackend> AudioEngine<B> {
    pub fn new(
        backend: B,
        config: &AudioConfig,
        tx: Arc<TxPipeline>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            backend,
            rx: Arc::new(RxShared::new(
                config.rx_buffer_capacity,
                config.overflow_headroom,
            )),
            tx,
            bus,
            reader: None,
            rx_running: false,
            tx_running: false,
            sink_device: config.sink_device.clone(),
            source_device: config.source_device.clone(),
        }
    }

    /// Jitter buffer shared with the decode side
    pub fn rx_shared(&self) -> Arc<RxShared> {
        Arc::clone(&self.rx)
    }

    pub fn tx_pipeline(&self) -> &Arc<TxPipeline> {
        &self.tx
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn is_rx_running(&self) -> bool {
        self.rx_running
    }

    pub fn is_tx_running(&self) -> bool {
        self.tx_running
    }

    /// Start RX playback with an empty jitter buffer
    pub fn start(&mut self) -> Result<()> {
        self.rx.clear();
        if let Err(e) = self.open_playback() {
            log::error!("Failed to start audio playback: {}", e);
            if self.rx_running {
                self.rx_running = false;
                self.bus.publish(Event::RxAudioStateChanged { running: false });
            }
            return Err(e);
        }
        if !self.rx_running {
            self.rx_running = true;
            self.bus.publish(Event::RxAudioStateChanged { running: true });
        }
        log::info!("RX audio playback started");
        Ok(())
    }

    /// Stop RX playback, releasing a blocked reader
    pub fn pause(&mut self) {
        self.close_reader();
        self.backend.stop_playback();
        if self.rx_running {
            self.rx_running = false;
            self.bus.publish(Event::RxAudioStateChanged { running: false });
            log::info!("RX audio playback paused");
        }
    }

    /// Arm TX and open the capture device
    pub fn start_tx(&mut self, sink: Arc<dyn PacketSink>, target: SharedStreamId) -> Result<()> {
        if self.tx_running {
            return Ok(());
        }
        self.tx.start(sink, target);
        if let Err(e) = self
            .backend
            .start_capture(self.source_device.as_deref(), Arc::clone(&self.tx))
        {
            log::error!("Failed to start audio capture: {}", e);
            self.tx.stop();
            return Err(e);
        }
        self.tx_running = true;
        self.bus.publish(Event::TxAudioStateChanged { running: true });
        Ok(())
    }

    /// Release the capture device and disarm TX
    pub fn stop_tx(&mut self) {
        if !self.tx_running {
            return;
        }
        self.backend.stop_capture();
        self.tx.stop();
        self.tx_running = false;
        self.bus.publish(Event::TxAudioStateChanged { running: false });
    }

    /// Select the playback device, moving a running stream to it
    pub fn set_audio_sink(&mut self, device_id: &str) -> Result<()> {
        if self.sink_device.as_deref() == Some(device_id) {
            return Ok(());
        }
        log::info!("Switching audio sink to {}", device_id);
        self.sink_device = Some(device_id.to_string());

        if self.rx_running {
            // A callback blocked in read() must be released before the stream is joined
            self.close_reader();
            self.backend.stop_playback();
            if let Err(e) = self.open_playback() {
                log::error!("Failed to restart playback on {}: {}", device_id, e);
                self.rx_running = false;
                self.bus.publish(Event::RxAudioStateChanged { running: false });
                return Err(e);
            }
        }
        self.bus.publish(Event::AudioDeviceChanged {
            kind: StreamKind::RxAudio,
            device: device_id.to_string(),
        });
        Ok(())
    }

    /// Select the capture device, moving a running stream to it
    pub fn set_audio_source(&mut self, device_id: &str) -> Result<()> {
        if self.source_device.as_deref() == Some(device_id) {
            return Ok(());
        }
        log::info!("Switching audio source to {}", device_id);
        self.source_device = Some(device_id.to_string());

        if self.tx_running {
            self.backend.stop_capture();
            if let Err(e) = self
                .backend
                .start_capture(Some(device_id), Arc::clone(&self.tx))
            {
                log::error!("Failed to restart capture on {}: {}", device_id, e);
                self.tx.stop();
                self.tx_running = false;
                self.bus.publish(Event::TxAudioStateChanged { running: false });
                return Err(e);
            }
        }
        self.bus.publish(Event::AudioDeviceChanged {
            kind: StreamKind::TxAudio,
            device: device_id.to_string(),
        });
        Ok(())
    }

    pub fn sink_device(&self) -> Option<&str> {
        self.sink_device.as_deref()
    }

    pub fn source_device(&self) -> Option<&str> {
        self.source_device.as_deref()
    }

    pub fn list_sinks(&self) -> Result<Vec<AudioDevice>> {
        self.backend.list_sinks()
    }

    pub fn list_sources(&self) -> Result<Vec<AudioDevice>> {
        self.backend.list_sources()
    }

    pub fn default_sink(&self) -> Option<AudioDevice> {
        self.backend.default_sink()
    }

    pub fn default_source(&self) -> Option<AudioDevice> {
        self.backend.default_source()
    }

    /// Stop everything
    pub fn shutdown(&mut self) {
        self.stop_tx();
        self.pause();
    }

    fn close_reader(&mut self) {
        if let Some(handle) = self.reader.take() {
            handle.close();
        }
    }

    fn open_playback(&mut self) -> Result<()> {
        self.close_reader();
        let reader = self.rx.reader();
        self.reader = Some(reader.handle());
        self.backend
            .start_playback(self.sink_device.as_deref(), reader)
    }
}

impl<B: AudioBackend> Drop for AudioEngine<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::{MockBackend, MockEncoder};
    use crate::core::types::StreamId;
    use crate::transport::MockSink;

    fn engine() -> (AudioEngine<MockBackend>, crossbeam_channel::Receiver<Event>) {
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe(32);
        let tx = Arc::new(TxPipeline::new(Box::new(MockEncoder::new())));
        let engine = AudioEngine::new(MockBackend::new(), &AudioConfig::default(), tx, bus);
        (engine, events)
    }

    #[test]
    fn test_start_clears_buffer_and_opens_reader() {
        let (mut engine, events) = engine();
        engine.rx_shared().buffer().insert(0.5);

        engine.start().unwrap();
        assert!(engine.is_rx_running());
        assert_eq!(engine.rx_shared().size(), 0);
        assert_eq!(engine.backend().playback_starts(), 1);
        assert_eq!(events.try_recv().unwrap(), Event::RxAudioStateChanged { running: true });
    }

    #[test]
    fn test_pause_closes_reader() {
        let (mut engine, _events) = engine();
        engine.start().unwrap();
        let reader = engine.backend_mut().take_reader().unwrap();

        engine.pause();
        assert!(!engine.is_rx_running());
        assert!(reader.is_closed());
        assert!(!engine.backend().is_playing());
    }

    #[test]
    fn test_playback_failure_stays_stopped() {
        let (mut engine, events) = engine();
        engine.backend_mut().set_fail_playback(true);
        assert!(engine.start().is_err());
        assert!(!engine.is_rx_running());
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_sink_switch_recreates_playback() {
        let (mut engine, events) = engine();
        engine.start().unwrap();
        let old_reader = engine.backend_mut().take_reader().unwrap();
        let _ = events.try_recv();

        engine.set_audio_sink("usb-headset").unwrap();
        assert!(old_reader.is_closed());
        assert_eq!(engine.backend().playback_starts(), 2);
        assert_eq!(engine.backend().playback_device().as_deref(), Some("usb-headset"));
        assert_eq!(
            events.try_recv().unwrap(),
            Event::AudioDeviceChanged {
                kind: StreamKind::RxAudio,
                device: "usb-headset".to_string(),
            }
        );

        // Same device again is a no-op
        engine.set_audio_sink("usb-headset").unwrap();
        assert_eq!(engine.backend().playback_starts(), 2);
    }

    #[test]
    fn test_tx_capture_lifecycle() {
        let (mut engine, _events) = engine();
        let sink = MockSink::new();
        let target = SharedStreamId::new(StreamId(0x8400_0000));

        engine.start_tx(Arc::new(sink.clone()), target).unwrap();
        assert!(engine.is_tx_running());
        assert!(engine.tx_pipeline().is_running());

        engine.backend_mut().feed_capture(&[0.1; 1000]);
        assert_eq!(sink.sent_count(), 2);

        engine.stop_tx();
        assert!(!engine.tx_pipeline().is_running());
        assert!(!engine.backend().is_capturing());
    }

    #[test]
    fn test_capture_failure_disarms_tx() {
        let (mut engine, _events) = engine();
        engine.backend_mut().set_fail_capture(true);
        let result = engine.start_tx(Arc::new(MockSink::new()), SharedStreamId::default());
        assert!(result.is_err());
        assert!(!engine.is_tx_running());
        assert!(!engine.tx_pipeline().is_running());
    }

    #[test]
    fn test_device_listing() {
        let (engine, _events) = engine();
        let sinks = engine.list_sinks().unwrap();
        assert!(!sinks.is_empty());
        assert_eq!(engine.default_sink(), Some(sinks[0].clone()));
        assert!(engine.default_source().is_some());
        assert!(!engine.list_sources().unwrap().is_empty());
    }

    /// Backend whose stream owns a callback thread, joined on stop like a cpal stream drop
    struct ThreadedBackend {
        callback: Option<std::thread::JoinHandle<()>>,
    }

    impl AudioBackend for ThreadedBackend {
        fn start_playback(&mut self, _device: Option<&str>, reader: PlaybackReader) -> Result<()> {
            self.stop_playback();
            self.callback = Some(std::thread::spawn(move || {
                let mut out = [0.0f32; 64];
                while reader.read(&mut out).is_ok() {}
            }));
            Ok(())
        }

        fn stop_playback(&mut self) {
            if let Some(handle) = self.callback.take() {
                handle.join().unwrap();
            }
        }

        fn start_capture(&mut self, _device: Option<&str>, _tx: Arc<TxPipeline>) -> Result<()> {
            Ok(())
        }

        fn stop_capture(&mut self) {}

        fn list_sinks(&self) -> Result<Vec<AudioDevice>> {
            Ok(Vec::new())
        }

        fn list_sources(&self) -> Result<Vec<AudioDevice>> {
            Ok(Vec::new())
        }

        fn default_sink(&self) -> Option<AudioDevice> {
            None
        }

        fn default_source(&self) -> Option<AudioDevice> {
            None
        }
    }

    fn threaded_engine() -> AudioEngine<ThreadedBackend> {
        let bus = Arc::new(EventBus::new());
        let tx = Arc::new(TxPipeline::new(Box::new(MockEncoder::new())));
        AudioEngine::new(
            ThreadedBackend { callback: None },
            &AudioConfig::default(),
            tx,
            bus,
        )
    }

    #[test]
    fn test_sink_switch_releases_starved_callback() {
        let mut engine = threaded_engine();
        engine.start().unwrap();
        // Let the callback block on the empty jitter buffer
        std::thread::sleep(std::time::Duration::from_millis(20));

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let worker = std::thread::spawn(move || {
            let result = engine.set_audio_sink("other-device");
            done_tx.send(result.is_ok()).unwrap();
            engine
        });

        let switched = done_rx
            .recv_timeout(std::time::Duration::from_secs(2))
            .expect("sink switch must not wait on a blocked reader");
        assert!(switched);

        let mut engine = worker.join().unwrap();
        assert!(engine.is_rx_running());
        assert_eq!(engine.sink_device(), Some("other-device"));
        engine.pause();
    }

    #[test]
    fn test_pause_releases_starved_callback() {
        let mut engine = threaded_engine();
        engine.start().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        engine.pause();
        assert!(!engine.is_rx_running());
    }

    #[test]
    fn test_failed_restart_publishes_stopped() {
        let (mut engine, events) = engine();
        engine.start().unwrap();
        engine.backend_mut().set_fail_playback(true);

        assert!(engine.start().is_err());
        assert!(!engine.is_rx_running());

        let states: Vec<Event> = events.try_iter().collect();
        assert_eq!(
            states,
            vec![
                Event::RxAudioStateChanged { running: true },
                Event::RxAudioStateChanged { running: false },
            ]
        );
    }
}
