//! Audio codec seams.
//!
//! The RX path needs a decoder producing 16-bit PCM; the TX path needs an
//! encoder consuming interleaved f32. With the `opus` feature the Opus
//! implementations below are available.

use crate::error::Result;

/// Largest Opus packet the encoder may produce
pub const MAX_OPUS_PACKET: usize = 1276;

/// Stateful packet decoder
pub trait AudioDecoder: Send {
    /// Decode one compressed packet into `pcm`, returning samples written
    fn decode(&mut self, packet: &[u8], pcm: &mut [i16]) -> Result<usize>;
}

/// Stateful frame encoder
pub trait AudioEncoder: Send {
    /// Encode one interleaved float frame into `out`, returning bytes written
    fn encode_float(&mut self, pcm: &[f32], out: &mut [u8]) -> Result<usize>;
}

#[cfg(feature = "opus")]
pub use self::opus_codec::{OpusDecoder, OpusEncoder};

#[cfg(feature = "opus")]
mod opus_codec {
    use super::{AudioDecoder, AudioEncoder};
    use crate::error::{Error, Result};

    fn codec_err(e: opus::Error) -> Error {
        Error::Codec(e.to_string())
    }

    /// Mono Opus decoder for RX audio
    pub struct OpusDecoder {
        inner: opus::Decoder,
    }

    impl OpusDecoder {
        pub fn new(sample_rate: u32) -> Result<Self> {
            let inner = opus::Decoder::new(sample_rate, opus::Channels::Mono).map_err(codec_err)?;
            Ok(Self { inner })
        }
    }

    impl AudioDecoder for OpusDecoder {
        fn decode(&mut self, packet: &[u8], pcm: &mut [i16]) -> Result<usize> {
            self.inner.decode(packet, pcm, false).map_err(codec_err)
        }
    }

    /// Stereo Opus encoder for TX audio
    pub struct OpusEncoder {
        inner: opus::Encoder,
    }

    impl OpusEncoder {
        pub fn new(sample_rate: u32, bitrate: i32) -> Result<Self> {
            let mut inner =
                opus::Encoder::new(sample_rate, opus::Channels::Stereo, opus::Application::Audio)
                    .map_err(codec_err)?;
            inner
                .set_bitrate(opus::Bitrate::Bits(bitrate))
                .map_err(codec_err)?;
            Ok(Self { inner })
        }
    }

    impl AudioEncoder for OpusEncoder {
        fn encode_float(&mut self, pcm: &[f32], out: &mut [u8]) -> Result<usize> {
            self.inner.encode_float(pcm, out).map_err(codec_err)
        }
    }

}
