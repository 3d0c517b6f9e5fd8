//! Codec catalogue: a priority-ordered list of A2DP endpoint configurations and a parallel list
//! of handsfree (HSP/HFP) codecs. Priority is positional — index 0 is tried first.

/// Identifies an A2DP codec: the standard `codec_id` byte, plus a vendor extension for codecs
/// registered under the A2DP vendor-specific codec ID (SBC and its variants have no vendor part).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct CodecId {
    pub codec_id: u8,
    pub vendor: Option<VendorCodecId>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VendorCodecId {
    pub vendor_id: u32,
    pub vendor_codec_id: u16,
}

impl CodecId {
    pub const fn standard(codec_id: u8) -> Self {
        CodecId { codec_id, vendor: None }
    }

    pub const fn vendor(vendor_id: u32, vendor_codec_id: u16) -> Self {
        CodecId { codec_id: 0xff, vendor: Some(VendorCodecId { vendor_id, vendor_codec_id }) }
    }
}

/// Which endpoint direction(s) a configuration may be advertised under.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Sink,
    Source,
    Both,
}

impl Direction {
    fn supports(self, is_sink: bool) -> bool {
        matches!((self, is_sink), (Direction::Both, _) | (Direction::Sink, true) | (Direction::Source, false))
    }
}

/// One entry in the A2DP endpoint catalogue.
#[derive(Debug, Copy, Clone)]
pub struct EndpointConf {
    pub name: &'static str,
    pub id: CodecId,
    pub direction: Direction,
}

/// One entry in the HSP/HFP codec catalogue.
#[derive(Debug, Copy, Clone)]
pub struct HfCodec {
    pub name: &'static str,
    pub id: CodecId,
}

const SBC: u8 = 0x00;
const MPEG24_AAC: u8 = 0x02;
const FASTSTREAM_VENDOR: u32 = 0x000a;
const FASTSTREAM_CODEC: u16 = 0x0001;

/// Supported A2DP endpoint configurations, highest priority first. Mirrors the original `sbc`,
/// `sbc-xq` variants, and `faststream` ordering; LDAC/aptX are omitted since their GStreamer
/// backends are out of scope here.
pub static ENDPOINT_CONFIGS: &[EndpointConf] = &[
    EndpointConf { name: "sbc_xq_553", id: CodecId::standard(SBC), direction: Direction::Both },
    EndpointConf { name: "sbc_xq_512", id: CodecId::standard(SBC), direction: Direction::Both },
    EndpointConf { name: "sbc_xq_453", id: CodecId::standard(SBC), direction: Direction::Both },
    EndpointConf { name: "sbc", id: CodecId::standard(SBC), direction: Direction::Both },
    EndpointConf { name: "aac", id: CodecId::standard(MPEG24_AAC), direction: Direction::Both },
    EndpointConf { name: "faststream", id: CodecId::vendor(FASTSTREAM_VENDOR, FASTSTREAM_CODEC), direction: Direction::Sink },
];

/// Supported handsfree codecs, highest priority first: wideband speech (mSBC) preferred over
/// narrowband CVSD.
pub static HF_CODECS: &[HfCodec] = &[
    HfCodec { name: "msbc", id: CodecId::standard(0x01) },
    HfCodec { name: "cvsd", id: CodecId::standard(0x02) },
];

/// Whether `id` is usable in the given direction, per the static catalogue.
pub fn is_available(id: CodecId, is_sink: bool) -> bool {
    ENDPOINT_CONFIGS.iter().any(|c| c.id == id && c.direction.supports(is_sink))
}

/// Linear scan by name over the A2DP catalogue, highest priority match first (there is at most
/// one entry per name, so order only matters for the miss case).
pub fn get_by_name(name: &str) -> Option<&'static EndpointConf> {
    ENDPOINT_CONFIGS.iter().find(|c| c.name == name)
}

pub fn get_hf_codec_by_name(name: &str) -> Option<&'static HfCodec> {
    HF_CODECS.iter().find(|c| c.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sbc_is_available_both_directions() {
        assert!(is_available(CodecId::standard(SBC), true));
        assert!(is_available(CodecId::standard(SBC), false));
    }

    #[test]
    fn faststream_is_sink_only() {
        let id = CodecId::vendor(FASTSTREAM_VENDOR, FASTSTREAM_CODEC);
        assert!(is_available(id, true));
        assert!(!is_available(id, false));
    }

    #[test]
    fn unknown_codec_is_unavailable() {
        assert!(!is_available(CodecId::standard(0x7f), true));
    }

    #[test]
    fn get_by_name_finds_known_entries_and_misses_unknown() {
        assert!(get_by_name("sbc").is_some());
        assert!(get_by_name("opus").is_none());
    }

    #[test]
    fn hf_codec_priority_prefers_wideband() {
        assert_eq!(HF_CODECS[0].name, "msbc");
    }
}
