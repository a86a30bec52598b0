use log::debug;

use crate::{Point, DecodeError};
use crate::packet::{
    FieldReader, RawFrame, FrameKind, classify,
    BLOCKS, POINTS, BLOCK_FLAG, PACKET_SIZE, DATA_FRAME_SIZE, HEADER_SIZE,
};
use super::azimuth::{Sweep, point_azimuth};
use super::calib::elevation;
use super::timing::TimeOffsetTable;

/// Number of points in a single data packet
pub const PACKET_POINTS: usize = BLOCKS*POINTS; // 384

/// Decode VLP-16 UDP packet data (1206 bytes) into points
///
/// Points are returned in firing order, point `p` of block `b` is stored at
/// index `b*32 + p`. Product id and return mode bytes are not checked, see
/// `decode_data_frame` for a checked variant.
pub fn decode(payload: &[u8]) -> Result<[Point; PACKET_POINTS], DecodeError> {
    let rdr = FieldReader::new(payload, PACKET_SIZE)?;
    let timestamp = f64::from(rdr.timestamp()?);
    let offsets = TimeOffsetTable::get();

    let mut azimuths = [0u16; BLOCKS];
    for (block, a) in azimuths.iter_mut().enumerate() {
        let flag = rdr.block_flag(block)?;
        if flag != BLOCK_FLAG {
            debug!("unexpected flag {:#06x} in block {}", flag, block);
        }
        *a = rdr.block_azimuth(block)?;
    }

    let mut points = [Point::default(); PACKET_POINTS];
    let blocks = points.chunks_exact_mut(POINTS);
    for (block, (chunk, (azimuth, gap))) in blocks.zip(Sweep::new(&azimuths)).enumerate() {
        for (point, dst) in chunk.iter_mut().enumerate() {
            let (distance, reflectivity) = rdr.channel_return(block, point)?;
            *dst = Point {
                // 2 mm granularity
                radius: f64::from(distance)/500.,
                elevation: elevation(point),
                azimuth: point_azimuth(azimuth, gap, point),
                reflectivity,
                point_time: timestamp + offsets.offset(block, point),
            };
        }
    }
    Ok(points)
}

/// Decode captured Ethernet frame (1248 bytes) of a data packet
pub fn decode_frame(frame: &[u8]) -> Result<[Point; PACKET_POINTS], DecodeError> {
    if frame.len() < DATA_FRAME_SIZE {
        return Err(DecodeError::InvalidPacketLength {
            expected: DATA_FRAME_SIZE,
            actual: frame.len(),
        });
    }
    decode(&frame[HEADER_SIZE..])
}

/// Classify the frame and decode it if it is a VLP-16 data packet
pub fn decode_data_frame(frame: &RawFrame<'_>)
    -> Result<[Point; PACKET_POINTS], DecodeError>
{
    match classify(frame) {
        FrameKind::Data => decode_frame(frame.data),
        _ => Err(DecodeError::UnrecognizedPacket {
            frame_len: frame.len,
            product_id: frame.data.get(DATA_FRAME_SIZE - 1).copied(),
        }),
    }
}
