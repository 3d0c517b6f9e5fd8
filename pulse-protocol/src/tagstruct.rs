//! Tag-struct encoding: the self-describing, typed value sequence used for every control command
//! on the wire. Each value is preceded by a one-byte type tag.
//!
//! Layout (see the external-interfaces notes for the authoritative list): `L` u32, `B` u8,
//! `s`/`N` nil-terminated string or nil, `t`/`f` bool, `R` sample spec, `a` byte array, `U` usec,
//! `l` i64, `m` channel map, `v` channel volumes, `P` property list.

use crate::channelmap::{Map, Position};
use crate::error::PulseError;
use crate::proplist::Proplist;
use crate::sample::{Format, Spec};
use crate::time::MicroSeconds;
use crate::volume::{ChannelVolumes, Volume};
use byteorder::{BigEndian, ByteOrder};

const TAG_U32: u8 = b'L';
const TAG_U8: u8 = b'B';
const TAG_STRING: u8 = b's';
const TAG_STRING_NULL: u8 = b'N';
const TAG_TRUE: u8 = b't';
const TAG_FALSE: u8 = b'f';
const TAG_SAMPLE_SPEC: u8 = b'R';
const TAG_ARBITRARY: u8 = b'a';
const TAG_USEC: u8 = b'U';
const TAG_S64: u8 = b'l';
const TAG_CHANNEL_MAP: u8 = b'm';
const TAG_CVOLUME: u8 = b'v';
const TAG_PROPLIST: u8 = b'P';

/// A growable tag-struct buffer, written to directly or via [`TagStructWrite`].
#[derive(Debug, Default, Clone)]
pub struct TagStructWriter {
    buf: Vec<u8>,
}

impl TagStructWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.push(TAG_U32);
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(TAG_U8);
        self.buf.push(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.buf.push(if v { TAG_TRUE } else { TAG_FALSE });
    }

    pub fn write_string(&mut self, v: Option<&str>) {
        match v {
            None => self.buf.push(TAG_STRING_NULL),
            Some(s) => {
                self.buf.push(TAG_STRING);
                self.buf.extend_from_slice(s.as_bytes());
                self.buf.push(0);
            }
        }
    }

    /// A server-assigned index; `None` encodes as `u32::MAX` ("invalid"), matching the wire
    /// convention used for channel/device/stream indices.
    pub fn write_index(&mut self, v: Option<u32>) {
        self.write_u32(v.unwrap_or(u32::MAX));
    }

    pub fn write_usec(&mut self, v: MicroSeconds) {
        self.buf.push(TAG_USEC);
        let mut tmp = [0u8; 8];
        BigEndian::write_u64(&mut tmp, v.0);
        self.buf.extend_from_slice(&tmp);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.push(TAG_S64);
        let mut tmp = [0u8; 8];
        BigEndian::write_i64(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
    }

    pub fn write_arbitrary(&mut self, v: &[u8]) {
        self.buf.push(TAG_ARBITRARY);
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, v.len() as u32);
        self.buf.extend_from_slice(&tmp);
        self.buf.extend_from_slice(v);
    }

    pub fn write_sample_spec(&mut self, spec: &Spec) {
        self.buf.push(TAG_SAMPLE_SPEC);
        self.buf.push(format_to_wire(spec.format));
        self.buf.push(spec.channels);
        let mut tmp = [0u8; 4];
        BigEndian::write_u32(&mut tmp, spec.rate);
        self.buf.extend_from_slice(&tmp);
    }

    pub fn write_channel_map(&mut self, map: &Map) {
        self.buf.push(TAG_CHANNEL_MAP);
        self.buf.push(map.channels());
        for p in map.positions() {
            self.buf.push(position_to_wire(*p));
        }
    }

    pub fn write_cvolume(&mut self, vols: &ChannelVolumes) {
        self.buf.push(TAG_CVOLUME);
        self.buf.push(vols.channels());
        for v in vols.get() {
            let mut tmp = [0u8; 4];
            BigEndian::write_u32(&mut tmp, v.0);
            self.buf.extend_from_slice(&tmp);
        }
    }

    pub fn write_proplist(&mut self, proplist: &Proplist) {
        self.buf.push(TAG_PROPLIST);
        for (key, value) in proplist.iter() {
            self.write_string(Some(key));
            self.write_u32(value.len() as u32);
            self.buf.extend_from_slice(value);
        }
        self.write_string(None);
    }
}

/// A cursor over a received tag-struct payload.
pub struct TagStructReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> TagStructReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        TagStructReader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], PulseError> {
        if self.remaining() < n {
            return Err(PulseError::Protocol);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn expect_tag(&mut self, tag: u8) -> Result<(), PulseError> {
        let got = self.take(1)?[0];
        if got != tag {
            return Err(PulseError::Protocol);
        }
        Ok(())
    }

    pub fn read_u32(&mut self) -> Result<u32, PulseError> {
        self.expect_tag(TAG_U32)?;
        Ok(BigEndian::read_u32(self.take(4)?))
    }

    pub fn read_u8(&mut self) -> Result<u8, PulseError> {
        self.expect_tag(TAG_U8)?;
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, PulseError> {
        match self.take(1)?[0] {
            TAG_TRUE => Ok(true),
            TAG_FALSE => Ok(false),
            _ => Err(PulseError::Protocol),
        }
    }

    /// A string-or-nil value. `Ok(None)` for a wire `N`, `Ok(Some(_))` for `s`.
    pub fn read_string(&mut self) -> Result<Option<String>, PulseError> {
        let tag = self.take(1)?[0];
        match tag {
            TAG_STRING_NULL => Ok(None),
            TAG_STRING => {
                let start = self.pos;
                let nil = self.buf[start..].iter().position(|b| *b == 0).ok_or(PulseError::Protocol)?;
                let s = std::str::from_utf8(&self.buf[start..start + nil])
                    .map_err(|_| PulseError::Protocol)?
                    .to_string();
                self.pos = start + nil + 1;
                Ok(Some(s))
            }
            _ => Err(PulseError::Protocol),
        }
    }

    /// A server-assigned index; wire `u32::MAX` decodes to `None`.
    pub fn read_index(&mut self) -> Result<Option<u32>, PulseError> {
        let v = self.read_u32()?;
        Ok(if v == u32::MAX { None } else { Some(v) })
    }

    pub fn read_usec(&mut self) -> Result<MicroSeconds, PulseError> {
        self.expect_tag(TAG_USEC)?;
        Ok(MicroSeconds(BigEndian::read_u64(self.take(8)?)))
    }

    pub fn read_i64(&mut self) -> Result<i64, PulseError> {
        self.expect_tag(TAG_S64)?;
        Ok(BigEndian::read_i64(self.take(8)?))
    }

    pub fn read_arbitrary(&mut self) -> Result<Vec<u8>, PulseError> {
        self.expect_tag(TAG_ARBITRARY)?;
        let len = BigEndian::read_u32(self.take(4)?) as usize;
        Ok(self.take(len)?.to_vec())
    }

    pub fn read_sample_spec(&mut self) -> Result<Spec, PulseError> {
        self.expect_tag(TAG_SAMPLE_SPEC)?;
        let format = format_from_wire(self.take(1)?[0]);
        let channels = self.take(1)?[0];
        let rate = BigEndian::read_u32(self.take(4)?);
        Ok(Spec { format, rate, channels })
    }

    pub fn read_channel_map(&mut self) -> Result<Map, PulseError> {
        self.expect_tag(TAG_CHANNEL_MAP)?;
        let channels = self.take(1)?[0];
        let positions: Result<Vec<Position>, PulseError> =
            (0..channels).map(|_| Ok(position_from_wire(self.take(1)?[0]))).collect();
        Ok(Map::from_positions(&positions?))
    }

    pub fn read_cvolume(&mut self) -> Result<ChannelVolumes, PulseError> {
        self.expect_tag(TAG_CVOLUME)?;
        let channels = self.take(1)?[0];
        let mut cv = ChannelVolumes::init();
        cv.set(channels, Volume::NORMAL);
        for _ in 0..channels {
            let _ = BigEndian::read_u32(self.take(4)?);
        }
        Ok(cv)
    }

    pub fn read_proplist(&mut self) -> Result<Proplist, PulseError> {
        self.expect_tag(TAG_PROPLIST)?;
        let mut list = Proplist::new();
        loop {
            match self.read_string()? {
                None => break,
                Some(key) => {
                    let len = self.read_u32()? as usize;
                    let value = self.take(len)?.to_vec();
                    list.set_raw(key, value);
                }
            }
        }
        Ok(list)
    }
}

fn format_to_wire(f: Format) -> u8 {
    match f {
        Format::U8 => 0,
        Format::ALaw => 1,
        Format::ULaw => 2,
        Format::S16le => 3,
        Format::S16be => 4,
        Format::F32le => 5,
        Format::F32be => 6,
        Format::S32le => 7,
        Format::S32be => 8,
        Format::S24le => 9,
        Format::S24be => 10,
        Format::S24_32le => 11,
        Format::S24_32be => 12,
        Format::Invalid => 0xff,
    }
}

fn format_from_wire(b: u8) -> Format {
    match b {
        0 => Format::U8,
        1 => Format::ALaw,
        2 => Format::ULaw,
        3 => Format::S16le,
        4 => Format::S16be,
        5 => Format::F32le,
        6 => Format::F32be,
        7 => Format::S32le,
        8 => Format::S32be,
        9 => Format::S24le,
        10 => Format::S24be,
        11 => Format::S24_32le,
        12 => Format::S24_32be,
        _ => Format::Invalid,
    }
}

fn position_to_wire(p: Position) -> u8 {
    match p {
        Position::Invalid => 0,
        Position::Mono => 1,
        Position::FrontLeft => 2,
        Position::FrontRight => 3,
        Position::FrontCenter => 4,
        Position::RearCenter => 5,
        Position::RearLeft => 6,
        Position::RearRight => 7,
        Position::Lfe => 8,
        Position::FrontLeftOfCenter => 9,
        Position::FrontRightOfCenter => 10,
        Position::SideLeft => 11,
        Position::SideRight => 12,
        Position::Aux(n) => 13u8.saturating_add(n),
        Position::TopCenter => 200,
        Position::TopFrontLeft => 201,
        Position::TopFrontRight => 202,
        Position::TopFrontCenter => 203,
        Position::TopRearLeft => 204,
        Position::TopRearRight => 205,
        Position::TopRearCenter => 206,
    }
}

fn position_from_wire(b: u8) -> Position {
    match b {
        0 => Position::Invalid,
        1 => Position::Mono,
        2 => Position::FrontLeft,
        3 => Position::FrontRight,
        4 => Position::FrontCenter,
        5 => Position::RearCenter,
        6 => Position::RearLeft,
        7 => Position::RearRight,
        8 => Position::Lfe,
        9 => Position::FrontLeftOfCenter,
        10 => Position::FrontRightOfCenter,
        11 => Position::SideLeft,
        12 => Position::SideRight,
        200 => Position::TopCenter,
        201 => Position::TopFrontLeft,
        202 => Position::TopFrontRight,
        203 => Position::TopFrontCenter,
        204 => Position::TopRearLeft,
        205 => Position::TopRearRight,
        206 => Position::TopRearCenter,
        n if n >= 13 => Position::Aux(n - 13),
        _ => Position::Invalid,
    }
}

/// Implemented by every command payload type that can be decoded from a tag-struct.
pub trait TagStructRead: Sized {
    fn read(ts: &mut TagStructReader<'_>, protocol_version: u16) -> Result<Self, PulseError>;
}

/// Implemented by every command payload type that can be encoded to a tag-struct.
pub trait TagStructWrite {
    fn write(&self, ts: &mut TagStructWriter, protocol_version: u16) -> Result<(), PulseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_round_trip() {
        let mut w = TagStructWriter::new();
        w.write_u32(0xdead_beef);
        let bytes = w.into_bytes();
        let mut r = TagStructReader::new(&bytes);
        assert_eq!(r.read_u32().unwrap(), 0xdead_beef);
        assert!(r.is_empty());
    }

    #[test]
    fn string_nil_round_trip() {
        let mut w = TagStructWriter::new();
        w.write_string(Some("hello"));
        w.write_string(None);
        let bytes = w.into_bytes();
        let mut r = TagStructReader::new(&bytes);
        assert_eq!(r.read_string().unwrap(), Some("hello".to_string()));
        assert_eq!(r.read_string().unwrap(), None);
    }

    #[test]
    fn index_sentinel_round_trip() {
        let mut w = TagStructWriter::new();
        w.write_index(Some(7));
        w.write_index(None);
        let bytes = w.into_bytes();
        let mut r = TagStructReader::new(&bytes);
        assert_eq!(r.read_index().unwrap(), Some(7));
        assert_eq!(r.read_index().unwrap(), None);
    }

    #[test]
    fn sample_spec_round_trip() {
        let spec = Spec { format: Format::S16le, rate: 44100, channels: 2 };
        let mut w = TagStructWriter::new();
        w.write_sample_spec(&spec);
        let bytes = w.into_bytes();
        let mut r = TagStructReader::new(&bytes);
        assert_eq!(r.read_sample_spec().unwrap(), spec);
    }

    #[test]
    fn channel_map_round_trip_preserves_positions() {
        let map = Map::from_positions(&[Position::RearLeft, Position::RearRight, Position::Lfe]);
        let mut w = TagStructWriter::new();
        w.write_channel_map(&map);
        let bytes = w.into_bytes();
        let mut r = TagStructReader::new(&bytes);
        let back = r.read_channel_map().unwrap();
        assert_eq!(back.positions(), map.positions());
    }

    #[test]
    fn truncated_buffer_is_protocol_error() {
        let mut r = TagStructReader::new(&[TAG_U32, 0, 0]);
        assert_eq!(r.read_u32(), Err(PulseError::Protocol));
    }

    #[test]
    fn proplist_round_trip() {
        let mut p = Proplist::new();
        p.set_str("application.name", "probe");
        let mut w = TagStructWriter::new();
        w.write_proplist(&p);
        let bytes = w.into_bytes();
        let mut r = TagStructReader::new(&bytes);
        let back = r.read_proplist().unwrap();
        assert_eq!(back.get_str("application.name"), Some("probe"));
    }
}
