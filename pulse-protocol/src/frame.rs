//! Packet-stream frame descriptor: the 20-byte header that precedes every frame's payload.
//!
//! Grounded directly in the wire format documented for `pa_pstream`: five big-endian `u32`
//! words — `length`, `channel`, `offset_hi`, `offset_lo`, `seek_mode` — followed by `length`
//! bytes of payload.

use crate::error::PulseError;
use byteorder::{BigEndian, ByteOrder};

/// Size in bytes of the frame descriptor.
pub const DESCRIPTOR_SIZE: usize = 20;

/// Maximum permitted payload length for a single frame. A `length` field above this value is a
/// protocol violation, fatal to the connection.
pub const MAX_FRAME_SIZE: u32 = 1024 * 500;

/// Channel value reserved to mean "this frame carries a control packet, not audio".
pub const CHANNEL_CONTROL: u32 = u32::MAX;

/// How a memblock frame's payload should be applied to the receiving stream's queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SeekMode {
    /// Append after the current write position.
    Relative,
    /// Seek to an absolute byte offset.
    Absolute,
    /// Seek relative to the current read position.
    RelativeOnRead,
    /// Seek relative to the end of the buffer.
    RelativeOnEnd,
}

impl SeekMode {
    fn to_wire(self) -> u32 {
        match self {
            SeekMode::Relative => 0,
            SeekMode::Absolute => 1,
            SeekMode::RelativeOnRead => 2,
            SeekMode::RelativeOnEnd => 3,
        }
    }

    fn from_wire(v: u32) -> Result<Self, PulseError> {
        match v {
            0 => Ok(SeekMode::Relative),
            1 => Ok(SeekMode::Absolute),
            2 => Ok(SeekMode::RelativeOnRead),
            3 => Ok(SeekMode::RelativeOnEnd),
            _ => Err(PulseError::Protocol),
        }
    }
}

/// A decoded frame descriptor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub length: u32,
    pub channel: u32,
    pub offset: i64,
    pub seek_mode: SeekMode,
}

impl Descriptor {
    /// A control-packet descriptor for a payload of `length` bytes.
    pub fn control(length: u32) -> Self {
        Descriptor { length, channel: CHANNEL_CONTROL, offset: 0, seek_mode: SeekMode::Relative }
    }

    /// An audio-frame descriptor for `channel`.
    pub fn audio(channel: u32, length: u32, offset: i64, seek_mode: SeekMode) -> Self {
        Descriptor { length, channel, offset, seek_mode }
    }

    pub fn is_control(&self) -> bool {
        self.channel == CHANNEL_CONTROL
    }

    /// Serializes to the 20-byte wire form.
    pub fn encode(&self) -> [u8; DESCRIPTOR_SIZE] {
        let mut buf = [0u8; DESCRIPTOR_SIZE];
        BigEndian::write_u32(&mut buf[0..4], self.length);
        BigEndian::write_u32(&mut buf[4..8], self.channel);
        BigEndian::write_u32(&mut buf[8..12], (self.offset >> 32) as u32);
        BigEndian::write_u32(&mut buf[12..16], self.offset as u32);
        BigEndian::write_u32(&mut buf[16..20], self.seek_mode.to_wire());
        buf
    }

    /// Parses a 20-byte header. Rejects any `length` above [`MAX_FRAME_SIZE`] as a protocol
    /// violation before the caller ever allocates a buffer for the payload.
    pub fn decode(buf: &[u8; DESCRIPTOR_SIZE]) -> Result<Self, PulseError> {
        let length = BigEndian::read_u32(&buf[0..4]);
        if length > MAX_FRAME_SIZE {
            return Err(PulseError::Protocol);
        }
        let channel = BigEndian::read_u32(&buf[4..8]);
        let offset_hi = BigEndian::read_u32(&buf[8..12]) as i64;
        let offset_lo = BigEndian::read_u32(&buf[12..16]) as i64;
        let offset = (offset_hi << 32) | offset_lo;
        let seek_mode = if channel == CHANNEL_CONTROL {
            SeekMode::Relative
        } else {
            SeekMode::from_wire(BigEndian::read_u32(&buf[16..20]))?
        };
        Ok(Descriptor { length, channel, offset, seek_mode })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_descriptor_round_trips() {
        let d = Descriptor::control(128);
        let bytes = d.encode();
        let back = Descriptor::decode(&bytes).unwrap();
        assert_eq!(back, d);
        assert!(back.is_control());
    }

    #[test]
    fn audio_descriptor_round_trips_negative_offset() {
        let d = Descriptor::audio(3, 4096, -512, SeekMode::RelativeOnRead);
        let bytes = d.encode();
        let back = Descriptor::decode(&bytes).unwrap();
        assert_eq!(back, d);
        assert!(!back.is_control());
    }

    #[test]
    fn oversized_length_is_rejected_before_use() {
        let d = Descriptor::control(MAX_FRAME_SIZE + 1);
        let bytes = d.encode();
        assert_eq!(Descriptor::decode(&bytes), Err(PulseError::Protocol));
    }

    #[test]
    fn max_frame_size_is_exactly_500kib() {
        assert_eq!(MAX_FRAME_SIZE, 512_000);
    }
}
