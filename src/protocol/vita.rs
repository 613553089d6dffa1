//! VITA-style packet codec
//!
//! # Wire Format
//!
//! Every packet starts with a fixed 7-word (28-byte) header. All fields are
//! big-endian.
//!
//! ```text
//! Word 0  ┌──────┬───┬───┬─────┬─────┬───────┬──────────────────┐
//!         │ type │ C │ T │ TSI │ TSF │ count │ packet size      │
//!         │31..28│27 │26 │23-22│21-20│ 19-16 │ 15..0 (words)    │
//!         └──────┴───┴───┴─────┴─────┴───────┴──────────────────┘
//! Word 1  stream ID
//! Word 2  OUI (low 24 bits)
//! Word 3  information class << 16 | packet class
//! Word 4  integer timestamp
//! Word 5-6 fractional timestamp
//! ...     payload
//! ```
//!
//! Packet size counts 32-bit words including the header:
//! `ceil(payload_len / 4) + 7`. Encoders do not pad the final word, so a
//! datagram may be up to 3 bytes shorter than `size * 4`.
//!
//! Timestamps are parsed but not interpreted; outgoing packets carry zero.

use crate::core::types::StreamId;
use crate::error::{Error, Result};

/// Header length in bytes
pub const HEADER_LEN: usize = 28;

/// Header length in 32-bit words
pub const HEADER_WORDS: usize = 7;

/// FlexRadio organizationally unique identifier
pub const FLEX_OUI: u32 = 0x001C2D;

/// Information class used by every FlexRadio data stream
pub const FLEX_INFORMATION_CLASS: u16 = 0x534C;

/// Packet class of Opus-compressed audio
pub const PACKET_CLASS_OPUS: u16 = 0x8005;

/// Packet class of waterfall tiles
pub const PACKET_CLASS_WATERFALL: u16 = 0x8004;

/// Packet type (word 0, bits 28..31)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    IfData = 0,
    IfDataWithStream = 1,
    ExtData = 2,
    ExtDataWithStream = 3,
    IfContext = 4,
    ExtContext = 5,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PacketType::IfData),
            1 => Ok(PacketType::IfDataWithStream),
            2 => Ok(PacketType::ExtData),
            3 => Ok(PacketType::ExtDataWithStream),
            4 => Ok(PacketType::IfContext),
            5 => Ok(PacketType::ExtContext),
            other => Err(Error::InvalidPacket(format!(
                "reserved packet type {}",
                other
            ))),
        }
    }
}

/// Integer timestamp kind (word 0, bits 22..23)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TsiType {
    None = 0,
    Utc = 1,
    Gps = 2,
    Other = 3,
}

impl TsiType {
    fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => TsiType::None,
            1 => TsiType::Utc,
            2 => TsiType::Gps,
            _ => TsiType::Other,
        }
    }
}

/// Fractional timestamp kind (word 0, bits 20..21)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TsfType {
    None = 0,
    SampleCount = 1,
    RealTime = 2,
    FreeRunning = 3,
}

impl TsfType {
    fn from_bits(bits: u32) -> Self {
        match bits & 0x3 {
            0 => TsfType::None,
            1 => TsfType::SampleCount,
            2 => TsfType::RealTime,
            _ => TsfType::FreeRunning,
        }
    }
}

/// Decoded word 0
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub packet_type: PacketType,
    /// C flag: class ID present
    pub class_id_present: bool,
    /// T flag: trailer present
    pub trailer_present: bool,
    pub tsi: TsiType,
    pub tsf: TsfType,
    /// 4-bit wrapping sequence counter
    pub packet_count: u8,
    /// Size in 32-bit words, header included
    pub packet_size: u16,
}

impl PacketHeader {
    /// Pack into word 0
    pub fn to_word(&self) -> u32 {
        ((self.packet_type as u32) << 28)
            | ((self.class_id_present as u32) << 27)
            | ((self.trailer_present as u32) << 26)
            | ((self.tsi as u32) << 22)
            | ((self.tsf as u32) << 20)
            | (((self.packet_count & 0x0F) as u32) << 16)
            | self.packet_size as u32
    }

    /// Unpack word 0
    pub fn from_word(word: u32) -> Result<Self> {
        Ok(Self {
            packet_type: PacketType::try_from((word >> 28) as u8)?,
            class_id_present: word & (1 << 27) != 0,
            trailer_present: word & (1 << 26) != 0,
            tsi: TsiType::from_bits(word >> 22),
            tsf: TsfType::from_bits(word >> 20),
            packet_count: ((word >> 16) & 0x0F) as u8,
            packet_size: (word & 0xFFFF) as u16,
        })
    }
}

/// Class identifier (words 2 and 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassId {
    /// 24-bit organizationally unique identifier
    pub oui: u32,
    pub information_class: u16,
    pub packet_class: u16,
}

impl ClassId {
    /// FlexRadio Opus audio
    pub const OPUS: ClassId = ClassId {
        oui: FLEX_OUI,
        information_class: FLEX_INFORMATION_CLASS,
        packet_class: PACKET_CLASS_OPUS,
    };

    /// FlexRadio waterfall tile
    pub const WATERFALL: ClassId = ClassId {
        oui: FLEX_OUI,
        information_class: FLEX_INFORMATION_CLASS,
        packet_class: PACKET_CLASS_WATERFALL,
    };

    pub fn kind(&self) -> PacketClass {
        PacketClass::from(self.packet_class)
    }
}

/// Known packet classes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketClass {
    Opus,
    Waterfall,
    Other(u16),
}

impl From<u16> for PacketClass {
    fn from(code: u16) -> Self {
        match code {
            PACKET_CLASS_OPUS => PacketClass::Opus,
            PACKET_CLASS_WATERFALL => PacketClass::Waterfall,
            other => PacketClass::Other(other),
        }
    }
}

/// Packet size in words for a payload of `payload_len` bytes
#[inline]
pub fn packet_size_words(payload_len: usize) -> usize {
    payload_len.div_ceil(4) + HEADER_WORDS
}

/// Write the 28-byte header into `out`
///
/// The packet size stored is the one in `header`; callers that change the
/// payload length must update it first.
pub fn write_header(
    out: &mut [u8; HEADER_LEN],
    header: &PacketHeader,
    stream_id: StreamId,
    class_id: &ClassId,
) {
    out[0..4].copy_from_slice(&header.to_word().to_be_bytes());
    out[4..8].copy_from_slice(&stream_id.0.to_be_bytes());
    out[8..12].copy_from_slice(&(class_id.oui & 0x00FF_FFFF).to_be_bytes());
    let classes = ((class_id.information_class as u32) << 16) | class_id.packet_class as u32;
    out[12..16].copy_from_slice(&classes.to_be_bytes());
    out[16..28].fill(0);
}

/// Encode a packet; the header's size field is recomputed from the payload
///
/// Output is exactly `28 + payload.len()` bytes.
pub fn encode(
    header: &PacketHeader,
    stream_id: StreamId,
    class_id: &ClassId,
    payload: &[u8],
) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    encode_into(&mut out, header, stream_id, class_id, payload)?;
    Ok(out)
}

/// Encode into a reusable buffer (cleared first)
pub fn encode_into(
    out: &mut Vec<u8>,
    header: &PacketHeader,
    stream_id: StreamId,
    class_id: &ClassId,
    payload: &[u8],
) -> Result<()> {
    let words = packet_size_words(payload.len());
    if words > u16::MAX as usize {
        return Err(Error::InvalidPacket(format!(
            "payload of {} bytes does not fit a 16-bit word count",
            payload.len()
        )));
    }

    let mut sized = *header;
    sized.packet_size = words as u16;

    let mut head = [0u8; HEADER_LEN];
    write_header(&mut head, &sized, stream_id, class_id);

    out.clear();
    out.extend_from_slice(&head);
    out.extend_from_slice(payload);
    Ok(())
}

fn be_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// A decoded VITA packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VitaPacket {
    pub header: PacketHeader,
    pub stream_id: StreamId,
    pub class_id: ClassId,
    pub timestamp_int: u32,
    pub timestamp_frac: u64,
    pub payload: Vec<u8>,
}

impl VitaPacket {
    /// Build an outgoing packet with a size field matching `payload`
    pub fn new(
        mut header: PacketHeader,
        stream_id: StreamId,
        class_id: ClassId,
        payload: Vec<u8>,
    ) -> Self {
        header.packet_size = packet_size_words(payload.len()).min(u16::MAX as usize) as u16;
        Self {
            header,
            stream_id,
            class_id,
            timestamp_int: 0,
            timestamp_frac: 0,
            payload,
        }
    }

    /// Decode a datagram
    ///
    /// Fails on datagrams shorter than the header, a declared size below the
    /// header, a datagram more than 3 bytes shorter than its declared size,
    /// or a reserved packet type. Trailing bytes past the declared size are
    /// ignored.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::InvalidPacket(format!(
                "packet of {} bytes is shorter than the {}-byte header",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let header = PacketHeader::from_word(be_u32(bytes, 0))?;
        let declared_words = header.packet_size as usize;
        if declared_words < HEADER_WORDS {
            return Err(Error::InvalidPacket(format!(
                "declared size {} words is below the header size",
                declared_words
            )));
        }

        let declared = declared_words * 4;
        if bytes.len() + 3 < declared {
            return Err(Error::Truncated {
                declared,
                actual: bytes.len(),
            });
        }

        let classes = be_u32(bytes, 12);
        let class_id = ClassId {
            oui: be_u32(bytes, 8) & 0x00FF_FFFF,
            information_class: (classes >> 16) as u16,
            packet_class: (classes & 0xFFFF) as u16,
        };
        let timestamp_frac = ((be_u32(bytes, 20) as u64) << 32) | be_u32(bytes, 24) as u64;

        let end = bytes.len().min(declared);
        Ok(Self {
            header,
            stream_id: StreamId(be_u32(bytes, 4)),
            class_id,
            timestamp_int: be_u32(bytes, 16),
            timestamp_frac,
            payload: bytes[HEADER_LEN..end].to_vec(),
        })
    }

    /// Encode this packet (timestamps are written as zero)
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(&self.header, self.stream_id, &self.class_id, &self.payload)
    }
}
