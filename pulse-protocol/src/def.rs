//! Definitions shared across context, stream and introspection: buffer attributes, the timing
//! snapshot, and sink/source state and flags.

use crate::time::MicroSeconds;
use bitflags::bitflags;

/// Wire sentinel meaning "let the server pick a value for this buffer-attr field".
pub const BUFFER_ATTR_AUTO: u32 = u32::MAX;

/// Buffer sizing negotiated for a stream. Every field is `BUFFER_ATTR_AUTO` until the server's
/// `CREATE_*_STREAM` reply fills in the value it actually chose.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferAttr {
    /// Maximum length of the buffer, in bytes.
    pub maxlength: u32,
    /// Target queue length for playback, in bytes.
    pub tlength: u32,
    /// Minimum amount of buffered data required before playback starts, in bytes.
    pub prebuf: u32,
    /// Minimum request size the server should ask for at once, in bytes.
    pub minreq: u32,
    /// Fragment size for recording, in bytes.
    pub fragsize: u32,
}

impl Default for BufferAttr {
    fn default() -> Self {
        BufferAttr {
            maxlength: BUFFER_ATTR_AUTO,
            tlength: BUFFER_ATTR_AUTO,
            prebuf: BUFFER_ATTR_AUTO,
            minreq: BUFFER_ATTR_AUTO,
            fragsize: BUFFER_ATTR_AUTO,
        }
    }
}

impl BufferAttr {
    /// True once every field has a server-assigned concrete value (no field still reads
    /// [`BUFFER_ATTR_AUTO`]).
    pub fn is_resolved(&self) -> bool {
        [self.maxlength, self.tlength, self.prebuf, self.minreq, self.fragsize]
            .iter()
            .all(|v| *v != BUFFER_ATTR_AUTO)
    }
}

/// A snapshot of a stream's server-side timing state, as returned by a latency update request.
///
/// `timing_info_valid == false` (the caller never received one successfully) implies every
/// latency query on the owning stream must report [`crate::error::PulseError::NoData`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimingInfo {
    /// When this snapshot was taken, as µs since an arbitrary but fixed epoch shared by both
    /// peers (e.g. `CLOCK_MONOTONIC`).
    pub timestamp: MicroSeconds,
    /// Whether the client and server clocks appeared synchronized at snapshot time.
    pub synchronized_clocks: bool,
    /// Sink latency in µs.
    pub sink_usec: MicroSeconds,
    /// Source latency in µs.
    pub source_usec: MicroSeconds,
    /// Estimated round-trip transport latency in µs.
    pub transport_usec: MicroSeconds,
    /// Whether the stream is actively playing right now (not corked/prebuffering).
    pub playing: bool,
    pub write_index_corrupt: bool,
    pub write_index: i64,
    pub read_index_corrupt: bool,
    pub read_index: i64,
    pub configured_sink_usec: MicroSeconds,
    pub configured_source_usec: MicroSeconds,
    pub since_underrun: i64,
}

impl TimingInfo {
    /// Whether a latency query against this snapshot can yield a number, per the corruption
    /// invariant.
    pub fn read_index_usable(&self) -> bool {
        !self.read_index_corrupt
    }

    pub fn write_index_usable(&self) -> bool {
        !self.write_index_corrupt
    }
}

bitflags! {
    /// Stream creation flags. The `FIX_*` bits pin a field of the request: if the server's
    /// `CREATE_*_STREAM` reply negotiates a different value for a pinned field, the stream must
    /// fail with [`crate::error::PulseError::Protocol`] rather than silently adopting it.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct StreamFlagSet: u32 {
        const NOFLAGS     = 0x0000;
        const FIX_FORMAT   = 0x0001;
        const FIX_RATE     = 0x0002;
        const FIX_CHANNELS = 0x0004;
    }
}

bitflags! {
    /// Capability/behavior flags reported for a sink.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct SinkFlagSet: u32 {
        const LATENCY          = 0x0001;
        const HARDWARE         = 0x0002;
        const NETWORK          = 0x0004;
        const HW_MUTE_CTRL     = 0x0008;
        const DECIBEL_VOLUME   = 0x0010;
        const FLAT_VOLUME      = 0x0020;
        const DYNAMIC_LATENCY  = 0x0040;
        const SET_FORMATS      = 0x0080;
    }
}

bitflags! {
    /// Capability/behavior flags reported for a source.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct SourceFlagSet: u32 {
        const LATENCY          = 0x0001;
        const HARDWARE         = 0x0002;
        const NETWORK          = 0x0004;
        const HW_MUTE_CTRL     = 0x0008;
        const DECIBEL_VOLUME   = 0x0010;
        const DYNAMIC_LATENCY  = 0x0040;
    }
}

/// Runtime state of a sink, as reported by introspection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SinkState {
    Running,
    Idle,
    Suspended,
    Invalid,
}

/// Runtime state of a source, as reported by introspection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SourceState {
    Running,
    Idle,
    Suspended,
    Invalid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_buffer_attr_is_all_auto() {
        let attr = BufferAttr::default();
        assert!(!attr.is_resolved());
    }

    #[test]
    fn resolved_buffer_attr_has_no_auto_fields() {
        let attr = BufferAttr { maxlength: 65536, tlength: 32768, prebuf: 0, minreq: 4096, fragsize: 4096 };
        assert!(attr.is_resolved());
    }

    #[test]
    fn corrupt_index_blocks_latency_use() {
        let mut t = TimingInfo {
            timestamp: MicroSeconds(0),
            synchronized_clocks: true,
            sink_usec: MicroSeconds(0),
            source_usec: MicroSeconds(0),
            transport_usec: MicroSeconds(0),
            playing: true,
            write_index_corrupt: false,
            write_index: 0,
            read_index_corrupt: false,
            read_index: 0,
            configured_sink_usec: MicroSeconds(0),
            configured_source_usec: MicroSeconds(0),
            since_underrun: 0,
        };
        assert!(t.read_index_usable());
        t.read_index_corrupt = true;
        assert!(!t.read_index_usable());
    }

    #[test]
    fn sink_flag_combination() {
        let flags = SinkFlagSet::LATENCY | SinkFlagSet::HARDWARE;
        assert!(flags.contains(SinkFlagSet::LATENCY));
        assert!(!flags.contains(SinkFlagSet::NETWORK));
    }

    #[test]
    fn stream_noflags_pins_nothing() {
        assert!(!StreamFlagSet::NOFLAGS.contains(StreamFlagSet::FIX_FORMAT));
        let flags = StreamFlagSet::FIX_RATE | StreamFlagSet::FIX_CHANNELS;
        assert!(flags.contains(StreamFlagSet::FIX_RATE));
        assert!(!flags.contains(StreamFlagSet::FIX_FORMAT));
    }
}
