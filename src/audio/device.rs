//! Host audio devices through cpal.
//!
//! Streams open at the codec rate when the device supports it, otherwise at
//! the device's default format with conversion in [`super::convert`].
//! Device IDs are cpal device names.

use super::convert::{choose_format, CaptureAdapter, FormatRange, PlaybackAdapter, StreamFormat};
use super::engine::{AudioBackend, AudioDevice};
use super::rx::PlaybackReader;
use super::tx::TxPipeline;
use crate::config::AudioConfig;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::sync::Arc;

/// cpal-backed [`AudioBackend`]
///
/// `cpal::Stream` is not `Send` on every platform, so the backend must stay
/// on the thread that created it.
pub struct CpalBackend {
    host: cpal::Host,
    sample_rate: u32,
    tx_channels: u16,
    tx_frame_len: usize,
    latency_ms: u32,
    output: Option<cpal::Stream>,
    input: Option<cpal::Stream>,
}

impl CpalBackend {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            host: cpal::default_host(),
            sample_rate: config.sample_rate,
            tx_channels: config.tx_channels,
            tx_frame_len: config.tx_frame_len(),
            latency_ms: config.playback_latency_ms,
            output: None,
            input: None,
        }
    }

    fn output_device(&self, id: Option<&str>) -> Result<cpal::Device> {
        match id {
            Some(id) => self
                .host
                .output_devices()
                .map_err(|e| Error::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n == id).unwrap_or(false))
                .ok_or_else(|| Error::Device(format!("output device {} not found", id))),
            None => self
                .host
                .default_output_device()
                .ok_or_else(|| Error::Device("no default output device".into())),
        }
    }

    fn input_device(&self, id: Option<&str>) -> Result<cpal::Device> {
        match id {
            Some(id) => self
                .host
                .input_devices()
                .map_err(|e| Error::Device(e.to_string()))?
                .find(|d| d.name().map(|n| n == id).unwrap_or(false))
                .ok_or_else(|| Error::Device(format!("input device {} not found", id))),
            None => self
                .host
                .default_input_device()
                .ok_or_else(|| Error::Device("no default input device".into())),
        }
    }
}

fn stream_config(format: StreamFormat, buffer_size: cpal::BufferSize) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size,
    }
}

fn to_range(range: cpal::SupportedStreamConfigRange) -> FormatRange {
    FormatRange {
        channels: range.channels(),
        min_rate: range.min_sample_rate().0,
        max_rate: range.max_sample_rate().0,
        is_f32: range.sample_format() == cpal::SampleFormat::F32,
    }
}

fn to_format(config: cpal::SupportedStreamConfig) -> StreamFormat {
    StreamFormat {
        channels: config.channels(),
        sample_rate: config.sample_rate().0,
    }
}

fn negotiate_output(device: &cpal::Device, want: StreamFormat) -> Result<StreamFormat> {
    let ranges: Vec<FormatRange> = device
        .supported_output_configs()
        .map(|configs| configs.map(to_range).collect())
        .unwrap_or_default();
    let default = device.default_output_config().ok().map(to_format);
    choose_format(&ranges, default, want)
        .ok_or_else(|| Error::Device("no usable output format".into()))
}

fn negotiate_input(device: &cpal::Device, want: StreamFormat) -> Result<StreamFormat> {
    let ranges: Vec<FormatRange> = device
        .supported_input_configs()
        .map(|configs| configs.map(to_range).collect())
        .unwrap_or_default();
    let default = device.default_input_config().ok().map(to_format);
    choose_format(&ranges, default, want)
        .ok_or_else(|| Error::Device("no usable input format".into()))
}

fn log_format(direction: &str, got: StreamFormat, want: StreamFormat) {
    if got == want {
        log::debug!("{} at {} Hz x{}", direction, got.sample_rate, got.channels);
    } else {
        log::info!(
            "{} device format {} Hz x{}, converting from {} Hz x{}",
            direction,
            got.sample_rate,
            got.channels,
            want.sample_rate,
            want.channels
        );
    }
}

fn describe(device: &cpal::Device) -> Option<AudioDevice> {
    device.name().ok().map(|name| AudioDevice {
        id: name.clone(),
        name,
    })
}

impl AudioBackend for CpalBackend {
    fn start_playback(&mut self, device: Option<&str>, reader: PlaybackReader) -> Result<()> {
        self.stop_playback();
        let device = self.output_device(device)?;
        let want = StreamFormat {
            channels: 1,
            sample_rate: self.sample_rate,
        };
        let format = negotiate_output(&device, want)?;
        log_format("Playback", format, want);

        // Try the configured latency first, fall back to the device default
        let latency_frames = format.sample_rate / 1000 * self.latency_ms;
        let mut sizes = vec![cpal::BufferSize::Default];
        if latency_frames > 0 {
            sizes.insert(0, cpal::BufferSize::Fixed(latency_frames));
        }

        let adapter = Arc::new(Mutex::new(PlaybackAdapter::new(
            reader,
            self.sample_rate,
            format,
        )));
        let mut last_err = None;
        for size in sizes {
            let config = stream_config(format, size);
            let cb_adapter = Arc::clone(&adapter);
            match device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    cb_adapter.lock().fill(data);
                },
                |err| log::error!("Audio playback stream error: {}", err),
                None,
            ) {
                Ok(stream) => {
                    stream.play().map_err(|e| Error::Device(e.to_string()))?;
                    log::info!(
                        "Playback on {}",
                        device.name().unwrap_or_else(|_| "unknown device".into())
                    );
                    self.output = Some(stream);
                    return Ok(());
                }
                Err(e) => last_err = Some(e.to_string()),
            }
        }
        Err(Error::Device(
            last_err.unwrap_or_else(|| "failed to build output stream".into()),
        ))
    }

    fn stop_playback(&mut self) {
        self.output = None;
    }

    fn start_capture(&mut self, device: Option<&str>, tx: Arc<TxPipeline>) -> Result<()> {
        self.stop_capture();
        let device = self.input_device(device)?;
        let want = StreamFormat {
            channels: self.tx_channels,
            sample_rate: self.sample_rate,
        };
        let format = negotiate_input(&device, want)?;
        log_format("Capture", format, want);

        let config = stream_config(format, cpal::BufferSize::Default);
        let mut adapter =
            CaptureAdapter::new(format, self.sample_rate, self.tx_channels, self.tx_frame_len);

        let stream = device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    adapter.push(data, |frame| {
                        tx.process_frame(frame);
                    });
                },
                |err| log::error!("Audio capture stream error: {}", err),
                None,
            )
            .map_err(|e| Error::Device(e.to_string()))?;
        stream.play().map_err(|e| Error::Device(e.to_string()))?;
        log::info!(
            "Capture on {}",
            device.name().unwrap_or_else(|_| "unknown device".into())
        );
        self.input = Some(stream);
        Ok(())
    }

    fn stop_capture(&mut self) {
        self.input = None;
    }

    fn list_sinks(&self) -> Result<Vec<AudioDevice>> {
        Ok(self
            .host
            .output_devices()
            .map_err(|e| Error::Device(e.to_string()))?
            .filter_map(|d| describe(&d))
            .collect())
    }

    fn list_sources(&self) -> Result<Vec<AudioDevice>> {
        Ok(self
            .host
            .input_devices()
            .map_err(|e| Error::Device(e.to_string()))?
            .filter_map(|d| describe(&d))
            .collect())
    }

    fn default_sink(&self) -> Option<AudioDevice> {
        self.host.default_output_device().as_ref().and_then(describe)
    }

    fn default_source(&self) -> Option<AudioDevice> {
        self.host.default_input_device().as_ref().and_then(describe)
    }
}
