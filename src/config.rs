//! Configuration for the streaming engine
//!
//! Every field has a default, so an embedding application can build a
//! [`Config`] in code or load a partial TOML file where missing keys fall
//! back to the values a FLEX-style radio expects (24 kHz Opus audio).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub network: NetworkConfig,
    pub events: EventConfig,
}

/// Audio pipeline configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AudioConfig {
    /// Codec and device sample rate (Hz)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Jitter buffer capacity in f32 samples
    #[serde(default = "default_rx_buffer_capacity")]
    pub rx_buffer_capacity: usize,

    /// Free slots kept in the jitter buffer before incoming samples are dropped
    #[serde(default = "default_overflow_headroom")]
    pub overflow_headroom: usize,

    /// Scratch size for one decoded packet (i16 samples)
    #[serde(default = "default_decode_buffer_samples")]
    pub decode_buffer_samples: usize,

    /// Requested playback device latency (ms)
    #[serde(default = "default_playback_latency_ms")]
    pub playback_latency_ms: u32,

    /// Capture channel count sent to the encoder
    #[serde(default = "default_tx_channels")]
    pub tx_channels: u16,

    /// Samples per channel in one encoded frame (240 = 10 ms at 24 kHz)
    #[serde(default = "default_tx_frame_samples")]
    pub tx_frame_samples: usize,

    /// Encoder bitrate (bits per second)
    #[serde(default = "default_opus_bitrate")]
    pub opus_bitrate: i32,

    /// Playback device ID, `None` for the system default
    #[serde(default)]
    pub sink_device: Option<String>,

    /// Capture device ID, `None` for the system default
    #[serde(default)]
    pub source_device: Option<String>,
}

/// Network receive configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Decoded packets buffered between the receive loop and dispatch
    #[serde(default = "default_packet_queue_capacity")]
    pub packet_queue_capacity: usize,

    /// Socket read timeout so the receive loop can observe shutdown (ms)
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,

    /// Largest datagram accepted
    #[serde(default = "default_max_datagram_size")]
    pub max_datagram_size: usize,
}

/// Event bus configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventConfig {
    /// Events queued per subscriber before new ones are dropped
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

fn default_sample_rate() -> u32 {
    24_000
}
fn default_rx_buffer_capacity() -> usize {
    2880
}
fn default_overflow_headroom() -> usize {
    4
}
fn default_decode_buffer_samples() -> usize {
    512
}
fn default_playback_latency_ms() -> u32 {
    50
}
fn default_tx_channels() -> u16 {
    2
}
fn default_tx_frame_samples() -> usize {
    240
}
fn default_opus_bitrate() -> i32 {
    70_000
}
fn default_packet_queue_capacity() -> usize {
    10
}
fn default_recv_timeout_ms() -> u64 {
    100
}
fn default_max_datagram_size() -> usize {
    65_536
}
fn default_subscriber_capacity() -> usize {
    100
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            rx_buffer_capacity: default_rx_buffer_capacity(),
            overflow_headroom: default_overflow_headroom(),
            decode_buffer_samples: default_decode_buffer_samples(),
            playback_latency_ms: default_playback_latency_ms(),
            tx_channels: default_tx_channels(),
            tx_frame_samples: default_tx_frame_samples(),
            opus_bitrate: default_opus_bitrate(),
            sink_device: None,
            source_device: None,
        }
    }
}

impl AudioConfig {
    /// f32 samples in one interleaved TX frame
    pub fn tx_frame_len(&self) -> usize {
        self.tx_frame_samples * self.tx_channels as usize
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            packet_queue_capacity: default_packet_queue_capacity(),
            recv_timeout_ms: default_recv_timeout_ms(),
            max_datagram_size: default_max_datagram_size(),
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use flexstream::config::Config;
    ///
    /// let config = Config::from_file("flexstream.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the pipelines cannot run with
    pub fn validate(&self) -> Result<()> {
        let audio = &self.audio;
        if audio.rx_buffer_capacity == 0 {
            return Err(Error::Config("audio.rx_buffer_capacity must be > 0".into()));
        }
        if audio.overflow_headroom >= audio.rx_buffer_capacity {
            return Err(Error::Config(
                "audio.overflow_headroom must be smaller than audio.rx_buffer_capacity".into(),
            ));
        }
        if audio.tx_channels == 0 || audio.tx_frame_samples == 0 {
            return Err(Error::Config("audio TX frame must not be empty".into()));
        }
        if self.network.packet_queue_capacity == 0 || self.events.subscriber_capacity == 0 {
            return Err(Error::Config("queue capacities must be > 0".into()));
        }
        Ok(())
    }
}
