//! Sample format negotiation and conversion at the device boundary.
//!
//! The codec side always runs at the configured rate (24 kHz) with a fixed
//! channel count. Host devices may not offer that, in which case the stream
//! is opened at the device's own format and samples are remixed and
//! resampled on the way in or out.

use super::rx::PlaybackReader;
use super::tx::FrameAccumulator;
use std::collections::VecDeque;

/// One range of formats a device advertises
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatRange {
    pub channels: u16,
    pub min_rate: u32,
    pub max_rate: u32,
    /// Native f32 samples
    pub is_f32: bool,
}

impl FormatRange {
    fn covers(&self, rate: u32) -> bool {
        self.min_rate <= rate && rate <= self.max_rate
    }
}

/// Channel count and rate of an opened stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

/// Pick the stream format to open
///
/// Preference: an f32 range with the wanted channels and rate, then any f32
/// range covering the rate (fewest extra channels), then the device default.
pub fn choose_format(
    ranges: &[FormatRange],
    default: Option<StreamFormat>,
    want: StreamFormat,
) -> Option<StreamFormat> {
    let covering = ranges
        .iter()
        .filter(|r| r.is_f32 && r.covers(want.sample_rate));

    if covering.clone().any(|r| r.channels == want.channels) {
        return Some(want);
    }

    if let Some(range) = covering.min_by_key(|r| (r.channels as i32 - want.channels as i32).abs()) {
        return Some(StreamFormat {
            channels: range.channels,
            sample_rate: want.sample_rate,
        });
    }

    default
}

/// Append `input` remapped from `in_ch` to `out_ch` interleaved channels
///
/// Downmixing to mono averages; otherwise missing channels repeat the last
/// source channel and extra source channels are dropped.
pub fn remix(input: &[f32], in_ch: usize, out_ch: usize, out: &mut Vec<f32>) {
    if in_ch == 0 || out_ch == 0 {
        return;
    }
    if in_ch == out_ch {
        out.extend_from_slice(&input[..input.len() - input.len() % in_ch]);
        return;
    }
    for frame in input.chunks_exact(in_ch) {
        if out_ch == 1 {
            out.push(frame.iter().sum::<f32>() / in_ch as f32);
        } else {
            out.extend((0..out_ch).map(|c| frame[c.min(in_ch - 1)]));
        }
    }
}

/// Streaming linear-interpolation resampler over interleaved frames
pub struct LinearResampler {
    channels: usize,
    passthrough: bool,
    /// Input frames advanced per output frame
    step: f64,
    /// Next output position; 0 is the carried-over previous frame
    pos: f64,
    prev: Vec<f32>,
    primed: bool,
    frame: Vec<f32>,
}

impl LinearResampler {
    pub fn new(in_rate: u32, out_rate: u32, channels: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            passthrough: in_rate == out_rate || in_rate == 0 || out_rate == 0,
            step: in_rate as f64 / out_rate.max(1) as f64,
            pos: 0.0,
            prev: vec![0.0; channels],
            primed: false,
            frame: vec![0.0; channels],
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    /// Feed input frames, calling `emit` for every output frame
    pub fn process<F: FnMut(&[f32])>(&mut self, mut input: &[f32], mut emit: F) {
        let ch = self.channels;
        if self.passthrough {
            for frame in input.chunks_exact(ch) {
                emit(frame);
            }
            return;
        }

        let mut frames = input.len() / ch;
        if frames == 0 {
            return;
        }
        if !self.primed {
            self.prev.copy_from_slice(&input[..ch]);
            self.primed = true;
            input = &input[ch..];
            frames -= 1;
        }

        // Input frame i sits at position i + 1
        while self.pos < frames as f64 {
            let idx = self.pos.floor() as usize;
            let frac = (self.pos - idx as f64) as f32;
            for c in 0..ch {
                let a = if idx == 0 {
                    self.prev[c]
                } else {
                    input[(idx - 1) * ch + c]
                };
                let b = input[idx * ch + c];
                self.frame[c] = a + (b - a) * frac;
            }
            emit(&self.frame);
            self.pos += self.step;
        }

        self.pos -= frames as f64;
        if frames > 0 {
            self.prev
                .copy_from_slice(&input[(frames - 1) * ch..frames * ch]);
        }
    }
}

/// Fills device output buffers from a mono codec-rate [`PlaybackReader`]
pub struct PlaybackAdapter {
    reader: PlaybackReader,
    in_rate: u32,
    out_rate: u32,
    channels: usize,
    resampler: LinearResampler,
    mono: Vec<f32>,
    mixed: Vec<f32>,
    queue: VecDeque<f32>,
}

impl PlaybackAdapter {
    pub fn new(reader: PlaybackReader, codec_rate: u32, device: StreamFormat) -> Self {
        let channels = usize::from(device.channels.max(1));
        Self {
            reader,
            in_rate: codec_rate,
            out_rate: device.sample_rate,
            channels,
            resampler: LinearResampler::new(codec_rate, device.sample_rate, 1),
            mono: Vec::new(),
            mixed: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    /// Fill `data` with interleaved device samples
    ///
    /// Blocks in the reader while starved. Once the reader is closed the
    /// remainder is silence.
    pub fn fill(&mut self, data: &mut [f32]) {
        while self.queue.len() < data.len() {
            let frames_out = (data.len() - self.queue.len()).div_ceil(self.channels);
            let frames_in = (frames_out as u64 * u64::from(self.in_rate))
                .div_ceil(u64::from(self.out_rate.max(1)))
                .max(1) as usize;
            self.mono.resize(frames_in, 0.0);

            let n = match self.reader.read(&mut self.mono) {
                Ok(n) => n,
                Err(_) => break,
            };
            let channels = self.channels;
            let mixed = &mut self.mixed;
            self.resampler
                .process(&self.mono[..n], |frame| remix(frame, 1, channels, mixed));
            self.queue.extend(self.mixed.drain(..));
        }

        let n = self.queue.len().min(data.len());
        for (dst, src) in data.iter_mut().zip(self.queue.drain(..n)) {
            *dst = src;
        }
        data[n..].fill(0.0);
    }
}

/// Turns device capture buffers into codec-rate frames of `tx_channels`
pub struct CaptureAdapter {
    in_channels: usize,
    out_channels: usize,
    resampler: LinearResampler,
    accumulator: FrameAccumulator,
    mixed: Vec<f32>,
    resampled: Vec<f32>,
}

impl CaptureAdapter {
    pub fn new(device: StreamFormat, codec_rate: u32, tx_channels: u16, frame_len: usize) -> Self {
        let out_channels = usize::from(tx_channels.max(1));
        Self {
            in_channels: usize::from(device.channels.max(1)),
            out_channels,
            resampler: LinearResampler::new(device.sample_rate, codec_rate, out_channels),
            accumulator: FrameAccumulator::new(frame_len),
            mixed: Vec::new(),
            resampled: Vec::new(),
        }
    }

    pub fn push<F: FnMut(&[f32])>(&mut self, data: &[f32], on_frame: F) {
        self.mixed.clear();
        remix(data, self.in_channels, self.out_channels, &mut self.mixed);

        self.resampled.clear();
        let resampled = &mut self.resampled;
        self.resampler
            .process(&self.mixed, |frame| resampled.extend_from_slice(frame));
        self.accumulator.push(&self.resampled, on_frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::rx::RxShared;
    use std::sync::Arc;

    fn range(channels: u16, min_rate: u32, max_rate: u32) -> FormatRange {
        FormatRange {
            channels,
            min_rate,
            max_rate,
            is_f32: true,
        }
    }

    const WANT_MONO: StreamFormat = StreamFormat {
        channels: 1,
        sample_rate: 24_000,
    };

    #[test]
    fn test_choose_exact_format() {
        let ranges = [range(2, 8_000, 48_000), range(1, 8_000, 48_000)];
        assert_eq!(choose_format(&ranges, None, WANT_MONO), Some(WANT_MONO));
    }

    #[test]
    fn test_choose_other_channel_count() {
        let ranges = [range(8, 8_000, 192_000), range(2, 8_000, 192_000)];
        assert_eq!(
            choose_format(&ranges, None, WANT_MONO),
            Some(StreamFormat {
                channels: 2,
                sample_rate: 24_000,
            })
        );
    }

    #[test]
    fn test_fall_back_to_device_default() {
        // 48 kHz-only hardware, plus a 24 kHz range in a non-float format
        let mut int_range = range(1, 24_000, 24_000);
        int_range.is_f32 = false;
        let ranges = [range(2, 48_000, 48_000), int_range];
        let default = StreamFormat {
            channels: 2,
            sample_rate: 48_000,
        };
        assert_eq!(choose_format(&ranges, Some(default), WANT_MONO), Some(default));
        assert_eq!(choose_format(&[], None, WANT_MONO), None);
    }

    #[test]
    fn test_remix() {
        let mut out = Vec::new();
        remix(&[0.5, -0.5], 1, 2, &mut out);
        assert_eq!(out, vec![0.5, 0.5, -0.5, -0.5]);

        out.clear();
        remix(&[1.0, 0.0, 0.5, 0.5], 2, 1, &mut out);
        assert_eq!(out, vec![0.5, 0.5]);

        out.clear();
        remix(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 3, 2, &mut out);
        assert_eq!(out, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_upsample_continuous_across_calls() {
        let mut rs = LinearResampler::new(24_000, 48_000, 1);
        let mut out = Vec::new();
        rs.process(&[0.0, 1.0, 2.0, 3.0], |f| out.push(f[0]));
        assert_eq!(out, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]);

        rs.process(&[4.0, 5.0], |f| out.push(f[0]));
        assert_eq!(&out[6..], &[3.0, 3.5, 4.0, 4.5]);
    }

    #[test]
    fn test_downsample() {
        let mut rs = LinearResampler::new(48_000, 24_000, 1);
        let mut out = Vec::new();
        let input: Vec<f32> = (0..8).map(|i| i as f32).collect();
        rs.process(&input, |f| out.push(f[0]));
        rs.process(&[8.0, 9.0, 10.0], |f| out.push(f[0]));
        rs.process(&[11.0], |f| out.push(f[0]));
        assert_eq!(out, vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
    }

    #[test]
    fn test_stereo_frames_interpolate_per_channel() {
        let mut rs = LinearResampler::new(24_000, 48_000, 2);
        let mut out = Vec::new();
        rs.process(&[0.0, 10.0, 1.0, 11.0], |f| out.extend_from_slice(f));
        assert_eq!(out, vec![0.0, 10.0, 0.5, 10.5]);
    }

    #[test]
    fn test_passthrough() {
        let mut rs = LinearResampler::new(24_000, 24_000, 2);
        assert!(rs.is_passthrough());
        let mut out = Vec::new();
        rs.process(&[1.0, 2.0, 3.0, 4.0, 5.0], |f| out.extend_from_slice(f));
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_playback_adapter_upsamples_to_stereo() {
        let shared = Arc::new(RxShared::new(2880, 4));
        shared.push_samples([0.0, 0.2, 0.4, 0.6]);
        let device = StreamFormat {
            channels: 2,
            sample_rate: 48_000,
        };
        let mut adapter = PlaybackAdapter::new(shared.reader(), 24_000, device);

        let mut data = [9.0f32; 8];
        adapter.fill(&mut data);
        let expected = [0.0, 0.0, 0.1, 0.1, 0.2, 0.2, 0.3, 0.3];
        for (got, want) in data.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{:?}", data);
        }
    }

    #[test]
    fn test_playback_adapter_silence_after_close() {
        let shared = Arc::new(RxShared::new(2880, 4));
        shared.push_samples([0.5, 0.5]);
        let reader = shared.reader();
        let handle = reader.handle();
        let mut adapter = PlaybackAdapter::new(reader, 24_000, WANT_MONO);

        handle.close();
        let mut data = [9.0f32; 4];
        adapter.fill(&mut data);
        assert_eq!(data, [0.0; 4]);
    }

    #[test]
    fn test_capture_adapter_downsamples_into_frames() {
        let device = StreamFormat {
            channels: 1,
            sample_rate: 48_000,
        };
        // 2 stereo frames per codec frame
        let mut adapter = CaptureAdapter::new(device, 24_000, 2, 4);
        let mut frames = Vec::new();
        let input: Vec<f32> = (0..9).map(|i| i as f32).collect();
        adapter.push(&input, |f| frames.push(f.to_vec()));

        assert_eq!(
            frames,
            vec![vec![0.0, 0.0, 2.0, 2.0], vec![4.0, 4.0, 6.0, 6.0]]
        );
    }
}
