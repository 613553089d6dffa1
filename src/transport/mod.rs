//! Network transport for the binary data plane.
//!
//! - [`PacketSink`]: outbound seam used by the TX pipeline
//! - [`UdpSession`]: connected UDP socket to the radio
//! - [`VitaReceiver`]: receive loop decoding datagrams onto a channel

use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::protocol::vita::VitaPacket;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub mod mock;
pub use mock::MockSink;

/// Outbound packet channel to the radio
pub trait PacketSink: Send + Sync {
    /// Send one encoded packet
    fn send_packet(&self, packet: &[u8]) -> Result<()>;
}

/// UDP socket connected to the radio's streaming port
pub struct UdpSession {
    socket: UdpSocket,
}

impl UdpSession {
    /// Bind `local` and connect to `radio`
    pub fn connect(local: SocketAddr, radio: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.connect(radio)?;
        log::info!(
            "UDP session {} -> {}",
            socket.local_addr()?,
            radio
        );
        Ok(Self { socket })
    }

    pub fn from_socket(socket: UdpSocket) -> Self {
        Self { socket }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Clone the socket for a [`VitaReceiver`]
    pub fn try_clone_socket(&self) -> Result<UdpSocket> {
        Ok(self.socket.try_clone()?)
    }
}

impl PacketSink for UdpSession {
    fn send_packet(&self, packet: &[u8]) -> Result<()> {
        let sent = self.socket.send(packet)?;
        if sent != packet.len() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short UDP send: {} of {} bytes", sent, packet.len()),
            )));
        }
        Ok(())
    }
}

/// Receive loop turning datagrams into [`VitaPacket`]s
///
/// Malformed datagrams are logged and dropped. When the consumer falls behind
/// the queue fills and newer packets are dropped.
pub struct VitaReceiver {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl VitaReceiver {
    /// Spawn the receive thread on `socket`
    pub fn spawn(socket: UdpSocket, config: &NetworkConfig) -> Result<(Self, Receiver<VitaPacket>)> {
        socket.set_read_timeout(Some(Duration::from_millis(config.recv_timeout_ms.max(1))))?;

        let (tx, rx) = bounded(config.packet_queue_capacity);
        let running = Arc::new(AtomicBool::new(true));
        let max_datagram = config.max_datagram_size;

        let handle = {
            let running = Arc::clone(&running);
            thread::Builder::new()
                .name("vita-rx".to_string())
                .spawn(move || receive_loop(socket, tx, running, max_datagram))
                .map_err(|e| Error::Thread(format!("failed to spawn vita-rx: {}", e)))?
        };

        Ok((
            Self {
                running,
                handle: Some(handle),
            },
            rx,
        ))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop the loop and join the thread
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("vita-rx thread panicked");
            }
        }
    }
}

impl Drop for VitaReceiver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn receive_loop(
    socket: UdpSocket,
    tx: Sender<VitaPacket>,
    running: Arc<AtomicBool>,
    max_datagram: usize,
) {
    log::info!("VITA receiver started");
    let mut buffer = vec![0u8; max_datagram.max(crate::protocol::vita::HEADER_LEN)];
    let mut dropped: u64 = 0;

    while running.load(Ordering::Relaxed) {
        let len = match socket.recv(&mut buffer) {
            Ok(len) => len,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                log::error!("UDP recv error: {}", e);
                continue;
            }
        };

        let packet = match VitaPacket::decode(&buffer[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                log::debug!("Dropping malformed VITA datagram: {}", e);
                continue;
            }
        };

        match tx.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                if dropped % 100 == 1 {
                    log::warn!("Packet queue full, {} packets dropped", dropped);
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                log::info!("Packet consumer gone, stopping VITA receiver");
                break;
            }
        }
    }

    running.store(false, Ordering::Relaxed);
    log::info!("VITA receiver stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::StreamId;
    use crate::protocol::vita::{ClassId, PacketHeader, PacketType, TsfType, TsiType};

    fn packet_bytes(stream: u32) -> Vec<u8> {
        let header = PacketHeader {
            packet_type: PacketType::ExtDataWithStream,
            class_id_present: true,
            trailer_present: false,
            tsi: TsiType::Other,
            tsf: TsfType::SampleCount,
            packet_count: 0,
            packet_size: 0,
        };
        crate::protocol::vita::encode(&header, StreamId(stream), &ClassId::OPUS, &[1, 2, 3, 4])
            .unwrap()
    }

    #[test]
    fn test_session_to_receiver() {
        let loopback: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let radio_socket = UdpSocket::bind(loopback).unwrap();
        let radio_addr = radio_socket.local_addr().unwrap();

        let session = UdpSession::connect(loopback, radio_addr).unwrap();
        let client_addr = session.local_addr().unwrap();

        let config = NetworkConfig {
            recv_timeout_ms: 10,
            ..NetworkConfig::default()
        };
        let (mut receiver, packets) =
            VitaReceiver::spawn(session.try_clone_socket().unwrap(), &config).unwrap();

        // Radio -> client: garbage first, then a valid packet
        radio_socket.send_to(&[0u8; 5], client_addr).unwrap();
        radio_socket.send_to(&packet_bytes(0x42), client_addr).unwrap();

        let packet = packets.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(packet.stream_id, StreamId(0x42));
        assert_eq!(packet.payload, vec![1, 2, 3, 4]);

        // Client -> radio
        session.send_packet(&packet_bytes(0x43)).unwrap();
        let mut buf = [0u8; 64];
        let len = radio_socket.recv(&mut buf).unwrap();
        assert_eq!(VitaPacket::decode(&buf[..len]).unwrap().stream_id, StreamId(0x43));

        receiver.shutdown();
        assert!(!receiver.is_running());
    }
}
