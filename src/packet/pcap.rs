use byteorder::{ReadBytesExt, LE, BE};
use chrono::{DateTime, TimeZone, Utc};
use std::fs::File;
use std::path::Path;
use std::io;
use std::io::{SeekFrom, Seek, ErrorKind, Cursor};
use log::{info, warn};

use memmap::Mmap;

use super::{RawFrame, RawFrameSource};

const GLOBAL_HEADER_SIZE: u64 = 24;
const RECORD_HEADER_SIZE: usize = 16;
const LINKTYPE_ETHERNET: u32 = 1;

// tcpdump -s 1248 -i enp2s0 -w out.pcap port 2368

/// Reads captured Ethernet frames from a pre-recorded pcap file
///
/// A record cut off by the end of the file is reported once as an
/// `InvalidData` error, after which the source is exhausted.
pub struct PcapSource {
    file: Cursor<Mmap>,
    is_le: bool,
    is_nano: bool,
    do_loop: bool,
}

struct Record {
    start: usize,
    incl_len: usize,
    orig_len: usize,
    captured: Option<DateTime<Utc>>,
}

impl PcapSource {
    /// Initialize source with the given `path`.
    ///
    /// If `do_loop` is `true` the file is replayed from the beginning once
    /// all frames were read.
    pub fn new<P: AsRef<Path>>(path: P, do_loop: bool) -> io::Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let mut file = Cursor::new(mmap);

        let (is_le, is_nano) = match file.read_u32::<LE>()? {
            0xa1b2c3d4 => (true, false),
            0xa1b23c4d => (true, true),
            0xd4c3b2a1 => (false, false),
            0x4d3cb2a1 => (false, true),
            _ => return Err(io::Error::new(ErrorKind::InvalidInput,
                "invalid pcap magic number")),
        };
        let mut source = Self { file, is_le, is_nano, do_loop };
        source.read_header()?;
        Ok(source)
    }

    fn read_u16(&mut self) -> io::Result<u16> {
        if self.is_le { self.file.read_u16::<LE>() } else { self.file.read_u16::<BE>() }
    }

    fn read_u32(&mut self) -> io::Result<u32> {
        if self.is_le { self.file.read_u32::<LE>() } else { self.file.read_u32::<BE>() }
    }

    fn read_header(&mut self) -> io::Result<()> {
        let version_major = self.read_u16()?;
        let _version_minor = self.read_u16()?;
        // skip thiszone, sigfigs and snaplen
        self.file.seek(SeekFrom::Current(12))?;
        let network = self.read_u32()?;
        if version_major != 2 {
            return Err(io::Error::new(ErrorKind::InvalidInput,
                "unsupported pcap version"));
        }
        if network != LINKTYPE_ETHERNET {
            return Err(io::Error::new(ErrorKind::InvalidInput,
                "expected LINKTYPE_ETHERNET"));
        }
        Ok(())
    }

    /// Rewind to the first frame
    pub fn reset(&mut self) {
        self.file.set_position(GLOBAL_HEADER_SIZE);
    }

    // Skip the remains of a cut off record, so that the next read reports
    // the end of file instead of parsing its body as a record header.
    fn truncated(&mut self, msg: &'static str) -> io::Error {
        let len = self.file.get_ref().len() as u64;
        self.file.set_position(len);
        warn!("{}", msg);
        io::Error::new(ErrorKind::InvalidData, msg)
    }

    fn read_record(&mut self) -> io::Result<Record> {
        let len = self.file.get_ref().len();
        let remaining = len.saturating_sub(self.file.position() as usize);
        if remaining == 0 {
            return Err(io::Error::new(ErrorKind::UnexpectedEof,
                "end of pcap file"));
        }
        if remaining < RECORD_HEADER_SIZE {
            return Err(self.truncated("pcap record header is cut off"));
        }

        let mut meta = [0u32; 4];
        for v in meta.iter_mut() {
            *v = self.read_u32()?;
        }
        let [t_s, t_frac, incl_len, orig_len] = meta;

        let start = self.file.position() as usize;
        let end = start + incl_len as usize;
        if end > len {
            return Err(self.truncated("pcap record runs past the end of file"));
        }
        self.file.set_position(end as u64);

        if orig_len > incl_len {
            warn!("frame was truncated: {} of {} bytes captured",
                incl_len, orig_len);
        }

        // note that this time is not Y2038 safe
        let nanos = if self.is_nano { t_frac } else { t_frac.saturating_mul(1000) };
        let captured = Utc.timestamp_opt(i64::from(t_s), nanos).single();

        Ok(Record {
            start,
            incl_len: incl_len as usize,
            orig_len: orig_len as usize,
            captured,
        })
    }
}

impl RawFrameSource for PcapSource {
    fn next_frame(&mut self) -> io::Result<Option<RawFrame<'_>>> {
        let res = match self.read_record() {
            Err(ref e) if e.kind() == ErrorKind::UnexpectedEof && self.do_loop => {
                info!("pcap source exhausted, starting over");
                self.reset();
                self.read_record()
            },
            res => res,
        };
        let rec = match res {
            Ok(rec) => rec,
            Err(ref e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        };
        let buf = self.file.get_ref();
        Ok(Some(RawFrame {
            data: &buf[rec.start..rec.start + rec.incl_len],
            len: rec.orig_len,
            captured: rec.captured,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{ByteOrder, WriteBytesExt};
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;

    struct Rec {
        t_s: u32,
        t_frac: u32,
        data: Vec<u8>,
        incl_len: Option<u32>,
        orig_len: u32,
    }

    fn rec(t_s: u32, data: Vec<u8>) -> Rec {
        let orig_len = data.len() as u32;
        Rec { t_s, t_frac: 500, data, incl_len: None, orig_len }
    }

    fn write_pcap<B: ByteOrder>(name: &str, nano: bool, recs: &[Rec]) -> PathBuf {
        let mut buf = Vec::new();
        buf.write_u32::<B>(if nano { 0xa1b23c4d } else { 0xa1b2c3d4 }).unwrap();
        buf.write_u16::<B>(2).unwrap();
        buf.write_u16::<B>(4).unwrap();
        buf.write_all(&[0u8; 8]).unwrap();
        buf.write_u32::<B>(65535).unwrap();
        buf.write_u32::<B>(1).unwrap();
        for r in recs {
            buf.write_u32::<B>(r.t_s).unwrap();
            buf.write_u32::<B>(r.t_frac).unwrap();
            buf.write_u32::<B>(r.incl_len.unwrap_or(r.data.len() as u32)).unwrap();
            buf.write_u32::<B>(r.orig_len).unwrap();
            buf.write_all(&r.data).unwrap();
        }
        let path = std::env::temp_dir()
            .join(format!("vlp16-parser-{}-{}.pcap", std::process::id(), name));
        fs::write(&path, buf).unwrap();
        path
    }

    #[test]
    fn read_le_micro() {
        let path = write_pcap::<LE>("le", false, &[
            rec(1_600_000_000, vec![1u8; 1248]),
            rec(1_600_000_001, vec![2u8; 554]),
        ]);
        let mut src = PcapSource::new(&path, false).unwrap();

        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame.len, 1248);
        assert_eq!(frame.data.len(), 1248);
        assert!(frame.data.iter().all(|&b| b == 1));
        let t = frame.captured.unwrap();
        assert_eq!(t.timestamp(), 1_600_000_000);
        assert_eq!(t.timestamp_subsec_micros(), 500);

        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame.len, 554);
        assert!(src.next_frame().unwrap().is_none());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn read_be_nano() {
        let path = write_pcap::<BE>("be", true, &[rec(7, vec![3u8; 60])]);
        let mut src = PcapSource::new(&path, false).unwrap();
        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame.len, 60);
        assert_eq!(frame.captured.unwrap().timestamp_subsec_nanos(), 500);
        assert!(src.next_frame().unwrap().is_none());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn truncated_frame_keeps_wire_length() {
        let mut r = rec(0, vec![0u8; 100]);
        r.orig_len = 1248;
        let path = write_pcap::<LE>("trunc", false, &[r]);
        let mut src = PcapSource::new(&path, false).unwrap();
        let frame = src.next_frame().unwrap().unwrap();
        assert_eq!(frame.len, 1248);
        assert_eq!(frame.data.len(), 100);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn looping() {
        let path = write_pcap::<LE>("loop", false, &[
            rec(0, vec![0u8; 10]),
            rec(0, vec![0u8; 20]),
        ]);
        let mut src = PcapSource::new(&path, true).unwrap();
        let lens: Vec<usize> = (0..5)
            .map(|_| src.next_frame().unwrap().unwrap().len)
            .collect();
        assert_eq!(lens, vec![10, 20, 10, 20, 10]);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn empty_looping_source_is_exhausted() {
        let path = write_pcap::<LE>("empty", false, &[]);
        let mut src = PcapSource::new(&path, true).unwrap();
        assert!(src.next_frame().unwrap().is_none());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn record_cut_off_mid_body() {
        // body of the cut off record happens to look like a 20-byte record
        let mut body = Vec::new();
        for v in &[0u32, 0, 20, 20] {
            body.write_u32::<LE>(*v).unwrap();
        }
        body.extend_from_slice(&[7u8; 20]);
        let mut r = rec(0, body);
        r.incl_len = Some(1000);
        r.orig_len = 1000;
        let path = write_pcap::<LE>("cut-body", false, &[r]);

        let mut src = PcapSource::new(&path, false).unwrap();
        let err = src.next_frame().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(src.next_frame().unwrap().is_none());
        assert!(src.next_frame().unwrap().is_none());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn record_cut_off_mid_header() {
        let path = write_pcap::<LE>("cut-header", false, &[rec(0, vec![1u8; 10])]);
        let mut buf = fs::read(&path).unwrap();
        buf.extend_from_slice(&[0u8; 6]);
        fs::write(&path, buf).unwrap();

        let mut src = PcapSource::new(&path, false).unwrap();
        assert_eq!(src.next_frame().unwrap().unwrap().len, 10);
        let err = src.next_frame().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        assert!(src.next_frame().unwrap().is_none());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn invalid_magic() {
        let path = std::env::temp_dir()
            .join(format!("vlp16-parser-{}-magic.pcap", std::process::id()));
        fs::write(&path, [0u8; 24]).unwrap();
        let err = PcapSource::new(&path, false).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        fs::remove_file(path).unwrap();
    }
}
