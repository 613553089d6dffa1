//! End-to-end streaming tests: radio datagrams in, events and audio out.

use crossbeam_channel::{unbounded, Receiver};
use flexstream::audio::mock::{MockBackend, MockDecoder, MockEncoder};
use flexstream::audio::{AudioEngine, RxPipeline, TxPipeline};
use flexstream::config::{AudioConfig, Config};
use flexstream::protocol::vita::{self, ClassId, PacketHeader, PacketType, TsfType, TsiType};
use flexstream::protocol::WaterfallTile;
use flexstream::transport::{MockSink, UdpSession, VitaReceiver};
use flexstream::{Control, Dispatcher, Event, EventBus, StreamId, StreamKind, VitaPacket};
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WATERFALL_STREAM: u32 = 0x4200_0000;
const RX_STREAM: u32 = 0x0400_0008;
const TX_STREAM: u32 = 0x8400_0000;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn radio_header() -> PacketHeader {
    PacketHeader {
        packet_type: PacketType::ExtDataWithStream,
        class_id_present: true,
        trailer_present: false,
        tsi: TsiType::Other,
        tsf: TsfType::SampleCount,
        packet_count: 0,
        packet_size: 0,
    }
}

fn tile_datagram(first: u16, bins: Vec<u16>, timecode: u32) -> Vec<u8> {
    let tile = WaterfallTile {
        frame_low_freq: 14_000_000,
        bin_bandwidth: 999,
        line_duration_ms: 100,
        width: bins.len() as u16,
        height: 1,
        timecode,
        auto_black_level: 42,
        total_bins_in_frame: 100,
        first_bin_index: first,
        bins,
    };
    vita::encode(
        &radio_header(),
        StreamId(WATERFALL_STREAM),
        &ClassId::WATERFALL,
        &tile.to_bytes(),
    )
    .unwrap()
}

fn build(bus: &Arc<EventBus>, sink: &MockSink) -> Dispatcher<MockBackend> {
    let config = AudioConfig::default();
    let tx = Arc::new(TxPipeline::new(Box::new(MockEncoder::new())));
    let engine = AudioEngine::new(
        MockBackend::with_frame_len(config.tx_frame_len()),
        &config,
        tx,
        Arc::clone(bus),
    );
    let rx = RxPipeline::new(
        engine.rx_shared(),
        Box::new(MockDecoder::new()),
        config.decode_buffer_samples,
    );
    Dispatcher::new(engine, rx, Arc::new(sink.clone()), Arc::clone(bus))
}

fn next_row(events: &Receiver<Event>) -> Option<(Arc<[u16]>, u32)> {
    while let Ok(event) = events.recv_timeout(Duration::from_secs(2)) {
        if let Event::WaterfallRowReceived { bins, black_level } = event {
            return Some((bins, black_level));
        }
    }
    None
}

#[test]
fn test_waterfall_over_udp() {
    init_logging();
    let config = Config::default();
    let bus = Arc::new(EventBus::new());
    let events = bus.subscribe(config.events.subscriber_capacity);
    let sink = MockSink::new();
    let mut dispatcher = build(&bus, &sink);

    let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let radio = UdpSocket::bind(loopback).unwrap();
    let session = UdpSession::connect(loopback, radio.local_addr().unwrap()).unwrap();
    let client_addr = session.local_addr().unwrap();
    let (mut receiver, packets) =
        VitaReceiver::spawn(session.try_clone_socket().unwrap(), &config.network).unwrap();

    let (control_tx, control_rx) = unbounded();
    control_tx
        .send(Control::StreamAssigned {
            kind: StreamKind::Waterfall,
            id: StreamId(WATERFALL_STREAM),
        })
        .unwrap();

    let worker = thread::spawn(move || {
        dispatcher.run(packets, control_rx);
        dispatcher
    });

    // Let the assignment land before the radio starts sending
    thread::sleep(Duration::from_millis(50));
    radio
        .send_to(&tile_datagram(0, (0..60).collect(), 9), client_addr)
        .unwrap();
    radio.send_to(&[0xFF; 12], client_addr).unwrap();
    radio
        .send_to(&tile_datagram(60, (60..100).collect(), 9), client_addr)
        .unwrap();

    let (bins, black_level) = next_row(&events).expect("row received");
    let expected: Vec<u16> = (0..100).collect();
    assert_eq!(&bins[..], expected.as_slice());
    assert_eq!(black_level, 42);

    control_tx.send(Control::Shutdown).unwrap();
    let dispatcher = worker.join().unwrap();
    assert_eq!(dispatcher.streams().waterfall, StreamId(WATERFALL_STREAM));
    receiver.shutdown();
}

#[test]
fn test_rx_audio_to_playback() {
    init_logging();
    let bus = Arc::new(EventBus::new());
    let sink = MockSink::new();
    let mut dispatcher = build(&bus, &sink);

    dispatcher.handle_control(Control::StreamAssigned {
        kind: StreamKind::RxAudio,
        id: StreamId(RX_STREAM),
    });
    dispatcher.handle_control(Control::SetAudio(true));

    let bytes = vita::encode(
        &radio_header(),
        StreamId(RX_STREAM),
        &ClassId::OPUS,
        &MockDecoder::packet(&[16384, -16384, 8192]),
    )
    .unwrap();
    dispatcher.handle_packet(&VitaPacket::decode(&bytes).unwrap());

    let mut out = [0.0f32; 16];
    let n = dispatcher.engine().backend().pull(&mut out).unwrap();
    assert_eq!(&out[..n], &[0.5, -0.5, 0.25]);

    // Pausing releases the device reader
    dispatcher.handle_control(Control::SetAudio(false));
    assert!(dispatcher.engine().backend().pull(&mut out).is_err());
}

#[test]
fn test_rx_overflow_keeps_buffered_audio() {
    init_logging();
    let bus = Arc::new(EventBus::new());
    let sink = MockSink::new();
    let mut dispatcher = build(&bus, &sink);
    dispatcher.handle_control(Control::StreamAssigned {
        kind: StreamKind::RxAudio,
        id: StreamId(RX_STREAM),
    });

    let capacity = AudioConfig::default().rx_buffer_capacity;
    let payload = MockDecoder::packet(&[1000; 500]);
    let bytes = vita::encode(&radio_header(), StreamId(RX_STREAM), &ClassId::OPUS, &payload).unwrap();
    let packet = VitaPacket::decode(&bytes).unwrap();
    for _ in 0..10 {
        dispatcher.handle_packet(&packet);
    }

    let size = dispatcher.engine().rx_shared().size();
    assert!(size <= capacity);
    assert_eq!(size, capacity - 4 + 1);

    // A further batch changes nothing
    dispatcher.handle_packet(&packet);
    assert_eq!(dispatcher.engine().rx_shared().size(), size);
}

#[test]
fn test_tx_audio_sequencing() {
    init_logging();
    let bus = Arc::new(EventBus::new());
    let events = bus.subscribe(16);
    let sink = MockSink::new();
    let mut dispatcher = build(&bus, &sink);

    dispatcher.handle_control(Control::SetAudio(true));
    dispatcher.handle_control(Control::StreamAssigned {
        kind: StreamKind::TxAudio,
        id: StreamId(TX_STREAM),
    });

    // 17 frames of 10 ms stereo, delivered in uneven capture chunks
    let samples = vec![0.1f32; 480 * 17];
    for chunk in samples.chunks(333) {
        dispatcher.engine_mut().backend_mut().feed_capture(chunk);
    }

    let sent = sink.sent();
    assert_eq!(sent.len(), 17);
    let counts: Vec<u8> = sent
        .iter()
        .map(|p| VitaPacket::decode(p).unwrap().header.packet_count)
        .collect();
    assert_eq!(counts[0], 0);
    assert_eq!(counts[15], 15);
    assert_eq!(counts[16], 0);
    assert!(sent
        .iter()
        .all(|p| VitaPacket::decode(p).unwrap().stream_id == StreamId(TX_STREAM)));

    let established = events.try_iter().any(|e| {
        e == Event::StreamEstablished {
            kind: StreamKind::TxAudio,
            stream_id: StreamId(TX_STREAM),
        }
    });
    assert!(established);
}
