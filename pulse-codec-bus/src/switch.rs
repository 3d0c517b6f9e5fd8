//! Codec switching: pick a device's remote endpoint for the requested codec, negotiate its
//! configuration over the bus, and create the transport — reporting the outcome through a
//! callback rather than blocking, consistent with every other request in this workspace.

use crate::bus::{BusError, MediaBus};
use crate::codec::{self, CodecId};
use crate::endpoint::EndpointMap;
use crate::transport::{Profile, TransportExists, TransportRegistry};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SwitchError {
    #[error("no codec named {0} is known")]
    UnknownCodec(String),
    #[error("device has no remote endpoint announced for this codec")]
    NoRemoteEndpoint,
    #[error("a codec switch is already in progress for this device")]
    AlreadyInProgress,
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Transport(#[from] TransportExists),
}

/// Tracks in-flight codec switches so a second request against the same device while one is
/// still running is refused rather than racing it.
#[derive(Default)]
pub struct SwitchEngine {
    in_flight: HashSet<Uuid>,
}

impl SwitchEngine {
    pub fn new() -> Self {
        SwitchEngine { in_flight: HashSet::new() }
    }

    /// Picks the highest-priority remote endpoint `device` has announced for `codec_name`, asks
    /// it (via `bus.select_configuration`) to fill in its preferred configuration, commits that
    /// configuration with `bus.set_configuration`, and creates the resulting transport. `callback`
    /// receives the outcome; it always runs, synchronously, before this call returns — the
    /// `MediaBus` trait itself is synchronous, matching the in-process reference implementation,
    /// but nothing here assumes that of a future out-of-process binding.
    pub fn switch_codec(
        &mut self,
        device: Uuid,
        profile: Profile,
        codec_name: &str,
        endpoints: &EndpointMap,
        bus: &mut dyn MediaBus,
        transports: &mut TransportRegistry,
        callback: impl FnOnce(Result<(), SwitchError>),
    ) {
        if !self.in_flight.insert(device) {
            callback(Err(SwitchError::AlreadyInProgress));
            return;
        }
        let result = self.do_switch(device, profile, codec_name, endpoints, bus, transports);
        self.in_flight.remove(&device);
        callback(result);
    }

    fn do_switch(
        &self,
        device: Uuid,
        profile: Profile,
        codec_name: &str,
        endpoints: &EndpointMap,
        bus: &mut dyn MediaBus,
        transports: &mut TransportRegistry,
    ) -> Result<(), SwitchError> {
        let codec_id = resolve_codec_id(codec_name).ok_or_else(|| SwitchError::UnknownCodec(codec_name.to_string()))?;

        let candidates = endpoints.endpoints_for(device, codec_id);
        let (path, capabilities) = candidates.into_iter().next().ok_or(SwitchError::NoRemoteEndpoint)?;

        let chosen = bus.select_configuration(path, capabilities)?;
        bus.set_configuration(path, &chosen)?;
        transports.create(device, profile, path)?;
        tracing::info!(%device, codec = codec_name, endpoint = path, "switched codec");
        Ok(())
    }
}

fn resolve_codec_id(name: &str) -> Option<CodecId> {
    codec::get_by_name(name).map(|c| c.id).or_else(|| codec::get_hf_codec_by_name(name).map(|c| c.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;

    fn setup() -> (EndpointMap, InProcessBus, TransportRegistry, Uuid) {
        let mut endpoints = EndpointMap::new();
        let mut bus = InProcessBus::new();
        let transports = TransportRegistry::new();
        let device = Uuid::new_v4();
        let sbc = codec::get_by_name("sbc").unwrap().id;
        endpoints.announce(device, sbc, "/endpoint/sbc", vec![0x11]);
        bus.register("/endpoint/sbc", vec![0x22]);
        (endpoints, bus, transports, device)
    }

    #[test]
    fn successful_switch_creates_a_transport() {
        let (endpoints, mut bus, mut transports, device) = setup();
        let mut engine = SwitchEngine::new();
        let mut outcome = None;
        engine.switch_codec(device, Profile::A2dpSink, "sbc", &endpoints, &mut bus, &mut transports, |r| outcome = Some(r));
        assert_eq!(outcome, Some(Ok(())));
        assert!(transports.get(device, Profile::A2dpSink).is_some());
        assert!(bus.is_configured("/endpoint/sbc"));
    }

    #[test]
    fn unknown_codec_name_is_rejected() {
        let (endpoints, mut bus, mut transports, device) = setup();
        let mut engine = SwitchEngine::new();
        let mut outcome = None;
        engine.switch_codec(device, Profile::A2dpSink, "nonexistent", &endpoints, &mut bus, &mut transports, |r| outcome = Some(r));
        assert_eq!(outcome, Some(Err(SwitchError::UnknownCodec("nonexistent".to_string()))));
    }

    #[test]
    fn device_with_no_announced_endpoint_is_rejected() {
        let mut endpoints = EndpointMap::new();
        let mut bus = InProcessBus::new();
        let mut transports = TransportRegistry::new();
        let device = Uuid::new_v4();
        let _ = &mut endpoints;
        let mut engine = SwitchEngine::new();
        let mut outcome = None;
        engine.switch_codec(device, Profile::A2dpSink, "sbc", &endpoints, &mut bus, &mut transports, |r| outcome = Some(r));
        assert_eq!(outcome, Some(Err(SwitchError::NoRemoteEndpoint)));
    }
}
