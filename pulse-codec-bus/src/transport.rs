//! Transport lifecycle: one transport per `(device, profile)` pair, created when a
//! `SetConfiguration` call succeeds and freed on `ClearConfiguration`.

use std::collections::HashMap;
use uuid::Uuid;

/// Mirrors the original client's profile enumeration: which of a device's supported roles a
/// transport belongs to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Profile {
    A2dpSink,
    A2dpSource,
    HspHeadset,
    HspAudioGateway,
    HfpHandsfree,
    HfpAudioGateway,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TransportState {
    Idle,
    PendingOpen,
    Active,
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct Transport {
    pub device: Uuid,
    pub profile: Profile,
    pub endpoint_path: String,
    pub state: TransportState,
}

/// One transport per `(device, profile)`; [`TransportRegistry::create`] rejects a second one for
/// a pair that already has a live transport, matching `SetConfiguration`'s duplicate rejection.
#[derive(Default)]
pub struct TransportRegistry {
    transports: HashMap<(Uuid, Profile), Transport>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        TransportRegistry { transports: HashMap::new() }
    }

    pub fn create(&mut self, device: Uuid, profile: Profile, endpoint_path: impl Into<String>) -> Result<(), TransportExists> {
        let key = (device, profile);
        if self.transports.contains_key(&key) {
            return Err(TransportExists);
        }
        self.transports.insert(key, Transport { device, profile, endpoint_path: endpoint_path.into(), state: TransportState::Idle });
        Ok(())
    }

    pub fn free(&mut self, device: Uuid, profile: Profile) -> Option<Transport> {
        self.transports.remove(&(device, profile))
    }

    pub fn get(&self, device: Uuid, profile: Profile) -> Option<&Transport> {
        self.transports.get(&(device, profile))
    }

    pub fn set_state(&mut self, device: Uuid, profile: Profile, state: TransportState) {
        if let Some(t) = self.transports.get_mut(&(device, profile)) {
            t.state = state;
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("a transport already exists for this device/profile pair")]
pub struct TransportExists;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_create_is_rejected() {
        let mut reg = TransportRegistry::new();
        let device = Uuid::new_v4();
        reg.create(device, Profile::A2dpSink, "/endpoint/sbc").unwrap();
        assert_eq!(reg.create(device, Profile::A2dpSink, "/endpoint/sbc"), Err(TransportExists));
    }

    #[test]
    fn distinct_profiles_on_same_device_coexist() {
        let mut reg = TransportRegistry::new();
        let device = Uuid::new_v4();
        reg.create(device, Profile::A2dpSink, "/endpoint/sbc").unwrap();
        reg.create(device, Profile::HfpHandsfree, "/endpoint/hfp").unwrap();
        assert!(reg.get(device, Profile::A2dpSink).is_some());
        assert!(reg.get(device, Profile::HfpHandsfree).is_some());
    }

    #[test]
    fn free_allows_recreation() {
        let mut reg = TransportRegistry::new();
        let device = Uuid::new_v4();
        reg.create(device, Profile::A2dpSink, "/endpoint/sbc").unwrap();
        reg.free(device, Profile::A2dpSink);
        reg.create(device, Profile::A2dpSink, "/endpoint/sbc").unwrap();
    }
}
