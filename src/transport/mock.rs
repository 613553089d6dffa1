//! Mock packet sink for testing

use super::PacketSink;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

/// Records every packet sent; can be told to fail
#[derive(Clone, Default)]
pub struct MockSink {
    inner: Arc<Mutex<MockSinkInner>>,
}

#[derive(Default)]
struct MockSinkInner {
    sent: Vec<Vec<u8>>,
    fail: bool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail
    pub fn set_fail(&self, fail: bool) {
        self.inner.lock().fail = fail;
    }

    /// All packets sent so far
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.inner.lock().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.inner.lock().sent.len()
    }

    pub fn clear(&self) {
        self.inner.lock().sent.clear();
    }
}

impl PacketSink for MockSink {
    fn send_packet(&self, packet: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock sink failure",
            )));
        }
        inner.sent.push(packet.to_vec());
        Ok(())
    }
}
