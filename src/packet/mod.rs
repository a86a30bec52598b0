//! Raw packet layout, frame classification and frame sources
//!
//! # Example
//! ```
//! # fn main() -> Result<(), std::io::Error> {
//! use vlp16_parser::packet::{classify, FrameKind, MemorySource, RawFrameSource};
//!
//! // frames can come from a pcap file (`PcapSource`) or from memory
//! let mut source = MemorySource::new(vec![vec![0u8; 554]]);
//! while let Some(frame) = source.next_frame()? {
//!     match classify(&frame) {
//!         // each data packet contains 12*32=384 points in total
//!         FrameKind::Data => { /* decode with `vlp16::decode_frame` */ },
//!         FrameKind::Position => { /* GPS position packet */ },
//!         FrameKind::Other => continue,
//!     }
//! }
//! # Ok(()) }
//! ```
use std::io;
use byteorder::{ByteOrder, LE};
use chrono::{DateTime, Utc};

use crate::DecodeError;

mod pcap;
pub use self::pcap::PcapSource;

/// Ethernet (14) + IPv4 (20) + UDP (8) headers preceding the payload
pub const HEADER_SIZE: usize = 42;
/// Size in bytes of raw UDP packet data
pub const PACKET_SIZE: usize = 1206;
/// Size in bytes of a captured data packet frame
pub const DATA_FRAME_SIZE: usize = HEADER_SIZE + PACKET_SIZE; // 1248
/// Size in bytes of a captured position packet frame
pub const POSITION_FRAME_SIZE: usize = 554;

pub const BLOCKS: usize = 12;
pub const POINTS: usize = 32;
const FLAG_SIZE: usize = 2;
const AZIMUTH_SIZE: usize = 2;
const POINT_SIZE: usize = 3;
pub const BLOCK_SIZE: usize = FLAG_SIZE + AZIMUTH_SIZE + POINT_SIZE*POINTS; // 100
const BLOCKS_SIZE: usize = BLOCKS*BLOCK_SIZE; // 1200

/// Expected value of the block flag, `FF EE` on the wire
pub const BLOCK_FLAG: u16 = 0xEEFF;

// payload offsets
const TIMESTAMP: usize = BLOCKS_SIZE;
const RETURN_MODE: usize = BLOCKS_SIZE + 4;
const PRODUCT_ID: usize = BLOCKS_SIZE + 5;

/// Bounded reader over a packet buffer with typed little-endian field access
///
/// Every read is checked against the buffer length and fails with
/// `DecodeError::InvalidPacketLength` instead of reading out of bounds.
#[derive(Copy, Clone, Debug)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    /// Wrap `buf`, requiring it to hold at least `min_len` bytes
    pub fn new(buf: &'a [u8], min_len: usize) -> Result<Self, DecodeError> {
        if buf.len() < min_len {
            return Err(DecodeError::InvalidPacketLength {
                expected: min_len,
                actual: buf.len(),
            });
        }
        Ok(Self { buf })
    }

    fn field(&self, offset: usize, size: usize) -> Result<&'a [u8], DecodeError> {
        let err = DecodeError::InvalidPacketLength {
            expected: offset.saturating_add(size),
            actual: self.buf.len(),
        };
        let end = offset.checked_add(size).ok_or(err)?;
        self.buf.get(offset..end).ok_or(err)
    }

    pub fn u8_at(&self, offset: usize) -> Result<u8, DecodeError> {
        Ok(self.field(offset, 1)?[0])
    }

    pub fn u16_at(&self, offset: usize) -> Result<u16, DecodeError> {
        Ok(LE::read_u16(self.field(offset, 2)?))
    }

    pub fn u32_at(&self, offset: usize) -> Result<u32, DecodeError> {
        Ok(LE::read_u32(self.field(offset, 4)?))
    }

    /// Packet timestamp, microseconds since the top of the hour
    pub fn timestamp(&self) -> Result<u32, DecodeError> {
        self.u32_at(TIMESTAMP)
    }

    pub fn block_flag(&self, block: usize) -> Result<u16, DecodeError> {
        self.u16_at(block*BLOCK_SIZE)
    }

    /// Raw block azimuth in hundredths of a degree
    pub fn block_azimuth(&self, block: usize) -> Result<u16, DecodeError> {
        self.u16_at(block*BLOCK_SIZE + FLAG_SIZE)
    }

    /// Raw distance (2 mm units) and reflectivity of a channel return
    pub fn channel_return(&self, block: usize, point: usize)
        -> Result<(u16, u8), DecodeError>
    {
        let offset = block*BLOCK_SIZE + FLAG_SIZE + AZIMUTH_SIZE
            + point*POINT_SIZE;
        Ok((self.u16_at(offset)?, self.u8_at(offset + 2)?))
    }

    pub fn factory_bytes(&self) -> Result<FactoryBytes, DecodeError> {
        Ok(FactoryBytes {
            return_mode: ReturnMode::from(self.u8_at(RETURN_MODE)?),
            product: ProductId::from(self.u8_at(PRODUCT_ID)?),
        })
    }
}

/// Laser return mode reported in the packet factory bytes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReturnMode {
    /// Strongest return only
    Strongest,
    /// Last return only
    Last,
    /// Both strongest and last returns. Points are decoded as if the packet
    /// carried a single return.
    Dual,
    Unknown(u8),
}

impl From<u8> for ReturnMode {
    fn from(b: u8) -> Self {
        match b {
            0x37 => ReturnMode::Strongest,
            0x38 => ReturnMode::Last,
            0x39 => ReturnMode::Dual,
            b => ReturnMode::Unknown(b),
        }
    }
}

/// Sensor model reported in the packet factory bytes
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProductId {
    Hdl32E,
    Vlp16,
    Unknown(u8),
}

pub const VLP16_ID: u8 = 0x22;

impl From<u8> for ProductId {
    fn from(b: u8) -> Self {
        match b {
            0x21 => ProductId::Hdl32E,
            VLP16_ID => ProductId::Vlp16,
            b => ProductId::Unknown(b),
        }
    }
}

/// Return mode and product id bytes closing each data packet
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FactoryBytes {
    pub return_mode: ReturnMode,
    pub product: ProductId,
}

/// Meta information associated with a decoded data packet
#[derive(Copy, Clone, Debug)]
pub struct PacketMeta {
    /// Azimuth of the first block in `degrees*100`
    pub azimuth: u16,
    /// Microseconds from the top of the hour
    pub timestamp: u32,
    pub factory: FactoryBytes,
}

/// Read meta information from raw UDP packet data
pub fn read_meta(payload: &[u8]) -> Result<PacketMeta, DecodeError> {
    let rdr = FieldReader::new(payload, PACKET_SIZE)?;
    Ok(PacketMeta {
        azimuth: rdr.block_azimuth(0)?,
        timestamp: rdr.timestamp()?,
        factory: rdr.factory_bytes()?,
    })
}

/// Captured frame as handed out by a `RawFrameSource`
#[derive(Copy, Clone, Debug)]
pub struct RawFrame<'a> {
    /// Captured bytes, starting with the Ethernet header
    pub data: &'a [u8],
    /// Original frame length on the wire, may exceed `data.len()` if the
    /// capture was truncated
    pub len: usize,
    /// Capture time, if the source records it
    pub captured: Option<DateTime<Utc>>,
}

impl<'a> RawFrame<'a> {
    /// Frame with `len` equal to the data length and no capture time
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, len: data.len(), captured: None }
    }

    /// UDP payload of the frame
    pub fn payload(&self) -> &'a [u8] {
        self.data.get(HEADER_SIZE..).unwrap_or(&[])
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// VLP-16 data packet
    Data,
    /// Position (GPS) packet
    Position,
    /// Anything else, ignored
    Other,
}

/// Classify a captured frame by its length and product id byte
pub fn classify(frame: &RawFrame<'_>) -> FrameKind {
    match frame.len {
        DATA_FRAME_SIZE => {
            match frame.data.get(HEADER_SIZE + PRODUCT_ID) {
                Some(&VLP16_ID) => FrameKind::Data,
                _ => FrameKind::Other,
            }
        },
        POSITION_FRAME_SIZE => FrameKind::Position,
        _ => FrameKind::Other,
    }
}

/// Source of raw captured frames
pub trait RawFrameSource {
    /// Get next raw frame.
    ///
    /// Will return `Ok(None)` if source is exhausted.
    fn next_frame(&mut self) -> io::Result<Option<RawFrame<'_>>>;
}

/// Frame source backed by in-memory buffers
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    frames: Vec<Vec<u8>>,
    pos: usize,
}

impl MemorySource {
    pub fn new(frames: Vec<Vec<u8>>) -> Self {
        Self { frames, pos: 0 }
    }

    /// Append a frame after the ones not yet read
    pub fn push(&mut self, frame: Vec<u8>) {
        self.frames.push(frame);
    }
}

impl RawFrameSource for MemorySource {
    fn next_frame(&mut self) -> io::Result<Option<RawFrame<'_>>> {
        let frame = self.frames.get(self.pos);
        if frame.is_some() { self.pos += 1; }
        Ok(frame.map(|data| RawFrame::new(data)))
    }
}
