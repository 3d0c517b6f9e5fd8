//! Codec negotiation surface for peripheral audio transports: a catalogue of known codecs, a
//! per-device map of what each remote endpoint has announced, a registry of live transports, and
//! an engine that switches a device to a requested codec over a pluggable [`MediaBus`].

pub mod bus;
pub mod codec;
pub mod endpoint;
pub mod switch;
pub mod transport;

pub use bus::{BusError, InProcessBus, MediaBus};
pub use codec::{CodecId, Direction, EndpointConf, HfCodec, VendorCodecId};
pub use endpoint::EndpointMap;
pub use switch::{SwitchEngine, SwitchError};
pub use transport::{Profile, Transport, TransportExists, TransportRegistry, TransportState};
