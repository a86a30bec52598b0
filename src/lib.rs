//! Decoder for Velodyne VLP-16 data packets
//!
//! Raw frames are read from a [`RawFrameSource`](packet/trait.RawFrameSource.html)
//! (e.g. a pcap file), classified and decoded into [`Point`]s carrying
//! radius, elevation, interpolated azimuth, reflectivity and firing time.
pub mod packet;

pub mod vlp16;

use std::{io, fmt};
use std::cmp::max;
use chrono::{DateTime, Duration, TimeZone, Utc};
use log::debug;

use crate::packet::{RawFrameSource, PacketMeta, FrameKind, classify, read_meta};

/// Single laser return in sensor spherical coordinates
///
/// Azimuth is measured clockwise from the y axis, elevation is the angle
/// between the x-y plane and the beam.
#[derive(Default, Copy, Clone, Debug, PartialEq)]
pub struct Point {
    /// Distance in meters
    pub radius: f64,
    /// Elevation in degrees
    pub elevation: f64,
    /// Azimuth in degrees, `[0, 360)`
    pub azimuth: f64,
    /// Uncalibrated intensity
    pub reflectivity: u8,
    /// Firing time. This value represents microseconds from the top of the
    /// hour.
    pub point_time: f64,
}

impl Point {
    /// Absolute firing time given the time the packet was captured.
    ///
    /// `point_time` counts from the top of the sensor's hour, which may lie
    /// on the other side of an hour boundary than `captured`. The hour which
    /// puts the firing time closest to `captured` is used.
    pub fn datetime(&self, captured: DateTime<Utc>) -> DateTime<Utc> {
        let offset = Duration::nanoseconds((self.point_time*1000.).round() as i64);
        let hour = hour_start(captured);
        let distance = |t: &DateTime<Utc>| (*t - captured)
            .num_nanoseconds()
            .map(i64::abs)
            .unwrap_or(i64::MAX);
        [hour - Duration::hours(1), hour, hour + Duration::hours(1)]
            .iter()
            .map(|&h| h + offset)
            .min_by_key(distance)
            .unwrap_or(hour + offset)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "  {{")?;
        writeln!(f, "    \"time\": {},", self.point_time)?;
        writeln!(f, "    \"distance\": {},", self.radius)?;
        writeln!(f, "    \"elevation\": {},", self.elevation)?;
        writeln!(f, "    \"azimuth\": {},", self.azimuth)?;
        writeln!(f, "    \"reflectivity\": {}", self.reflectivity)?;
        write!(f, "  }}")
    }
}

/// Truncate `t` to the top of its hour
pub fn hour_start(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    Utc.timestamp_opt(secs - secs.rem_euclid(3600), 0).single().unwrap_or(t)
}

/// Errors which indicate failed packet decoding
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DecodeError {
    /// Buffer is too short to hold a data packet
    InvalidPacketLength { expected: usize, actual: usize },
    /// Frame is not a VLP-16 data packet
    UnrecognizedPacket { frame_len: usize, product_id: Option<u8> },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            DecodeError::InvalidPacketLength { expected, actual } => write!(f,
                "invalid packet length: expected at least {} bytes, got {}",
                expected, actual),
            DecodeError::UnrecognizedPacket { frame_len, product_id: Some(id) } =>
                write!(f, "unrecognized packet: frame length {}, product id {:#04x}",
                    frame_len, id),
            DecodeError::UnrecognizedPacket { frame_len, product_id: None } =>
                write!(f, "unrecognized packet: frame length {}", frame_len),
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<DecodeError> for io::Error {
    fn from(err: DecodeError) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, err)
    }
}

/// Number of frames of each kind seen by a `PointSource`
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub data: usize,
    pub position: usize,
    pub other: usize,
}

/// Decoded data packet
#[derive(Copy, Clone, Debug)]
pub struct Packet {
    pub meta: PacketMeta,
    /// Capture time of the frame, if recorded by the source
    pub captured: Option<DateTime<Utc>>,
}

/// This struct reads frames from `frame_source` and converts data packets to
/// points
pub struct PointSource<T: RawFrameSource> {
    frame_source: T,
    stats: FrameStats,
}

impl<T: RawFrameSource> PointSource<T> {
    /// Create new `PointSource`
    pub fn new(frame_source: T) -> Self {
        Self { frame_source, stats: Default::default() }
    }

    /// Frame counters accumulated so far
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Give back the underlying frame source, e.g. to refill it
    pub fn into_inner(self) -> T {
        self.frame_source
    }

    /// Process points in the next data packet, skipping position packets and
    /// unrecognized frames
    pub fn process_points<F>(&mut self, mut process_point: F)
        -> io::Result<Option<Packet>>
        where F: FnMut(Point)
    {
        let stats = &mut self.stats;
        loop {
            let frame = match self.frame_source.next_frame()? {
                Some(val) => val,
                None => return Ok(None),
            };
            match classify(&frame) {
                FrameKind::Data => {
                    let points = vlp16::decode_frame(frame.data)?;
                    let meta = read_meta(frame.payload())?;
                    stats.data += 1;
                    points.iter().for_each(|&p| process_point(p));
                    return Ok(Some(Packet { meta, captured: frame.captured }));
                },
                FrameKind::Position => stats.position += 1,
                FrameKind::Other => {
                    debug!("skipping frame of {} bytes", frame.len);
                    stats.other += 1;
                },
            }
        }
    }

    /// Decode all remaining data packets
    pub fn collect_points(&mut self) -> io::Result<Vec<Point>> {
        let mut buf = Vec::new();
        while self.process_points(|p| buf.push(p))?.is_some() {}
        Ok(buf)
    }
}

/// Iterator which returns points for each sensor rotation
pub struct TurnIterator<T: RawFrameSource> {
    point_source: PointSource<T>,
    cap: usize,
    prev_azimuth: Option<u16>,
    split_azimuth: u16,
}

impl<T: RawFrameSource> TurnIterator<T> {
    /// Create new `TurnIterator`
    pub fn new(frame_source: T) -> Self {
        Self {
            point_source: PointSource::new(frame_source),
            cap: 0, prev_azimuth: None, split_azimuth: 0,
        }
    }

    /// Set azimuth at which next turn will begin in `degrees*100`,
    pub fn set_split_azimuth(&mut self, val: u16) {
        self.split_azimuth = val % 36000;
    }

    pub fn stats(&self) -> FrameStats {
        self.point_source.stats()
    }
}

impl<T: RawFrameSource> Iterator for TurnIterator<T> {
    type Item = io::Result<Vec<Point>>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut buf = Vec::with_capacity(self.cap);
        loop {
            let res = self.point_source.process_points(|point| buf.push(point));
            let azimuth = match res {
                Ok(Some(packet)) => packet.meta.azimuth,
                Ok(None) if buf.is_empty() => return None,
                Ok(None) => break,
                Err(err) => return Some(Err(err)),
            };
            let sa = self.split_azimuth;
            // assumes that `azimuth` is never equal to `prev`
            let flag = match self.prev_azimuth {
                Some(prev) if prev > azimuth => !(prev >= sa && sa > azimuth),
                Some(prev) => azimuth >= sa && sa > prev,
                None => false,
            };
            self.prev_azimuth = Some(azimuth);
            if flag { break; }
        }
        self.cap = max(self.cap, (11*buf.len())/10);
        Some(Ok(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_datetime() {
        let t = Utc.timestamp_opt(1_600_002_345, 0).single().unwrap();
        let hour = hour_start(t);
        assert_eq!(hour.timestamp() % 3600, 0);
        assert_eq!(t.timestamp() - hour.timestamp(), 1_600_002_345 % 3600);

        let p = Point { point_time: 2_000_000.5, ..Default::default() };
        let dt = p.datetime(hour + Duration::seconds(3));
        assert_eq!(dt.timestamp() - hour.timestamp(), 2);
        assert_eq!(dt.timestamp_subsec_nanos(), 500);
    }

    fn at(h: u32, m: u32, s: u32, ms: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 9, 13, h, m, s).single().unwrap()
            + Duration::milliseconds(i64::from(ms))
    }

    #[test]
    fn datetime_fired_before_hour_captured_after() {
        let p = Point { point_time: 3_599_999_000., ..Default::default() };
        assert_eq!(p.datetime(at(11, 0, 0, 1)), at(10, 59, 59, 999));
    }

    #[test]
    fn datetime_fired_after_hour_captured_before() {
        let p = Point { point_time: 1_000., ..Default::default() };
        assert_eq!(p.datetime(at(10, 59, 59, 999)), at(11, 0, 0, 1));
    }

    #[test]
    fn datetime_within_hour() {
        let p = Point { point_time: 1_800_000_000., ..Default::default() };
        assert_eq!(p.datetime(at(10, 30, 0, 2)), at(10, 30, 0, 0));
    }

    #[test]
    fn display_point() {
        let p = Point {
            radius: 1., elevation: -15., azimuth: 359.5,
            reflectivity: 7, point_time: 10.,
        };
        let s = p.to_string();
        assert!(s.starts_with("  {\n"));
        assert!(s.contains("\"distance\": 1,\n"));
        assert!(s.contains("\"elevation\": -15,\n"));
        assert!(s.contains("\"reflectivity\": 7\n"));
        assert!(s.ends_with("  }"));
    }

    #[test]
    fn error_messages() {
        let err = DecodeError::InvalidPacketLength { expected: 1206, actual: 3 };
        assert_eq!(err.to_string(),
            "invalid packet length: expected at least 1206 bytes, got 3");
        let io_err: io::Error = err.into();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidData);
        let err = DecodeError::UnrecognizedPacket { frame_len: 60, product_id: None };
        assert_eq!(err.to_string(), "unrecognized packet: frame length 60");
    }
}
