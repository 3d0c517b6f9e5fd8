//! Per-device remote endpoint map: which capability blob each remote A2DP endpoint last
//! announced, indexed by device, codec, and endpoint path.

use crate::codec::CodecId;
use std::collections::HashMap;
use uuid::Uuid;

/// `device uuid -> codec id -> endpoint path -> capability blob`.
///
/// Invariant: within one `(device, codec)` pair, one endpoint path maps to exactly one blob;
/// re-announcing a path atomically replaces its entry rather than appending.
#[derive(Default)]
pub struct EndpointMap {
    devices: HashMap<Uuid, HashMap<CodecId, HashMap<String, Vec<u8>>>>,
}

impl EndpointMap {
    pub fn new() -> Self {
        EndpointMap { devices: HashMap::new() }
    }

    /// Records (or atomically replaces) the capability blob a remote endpoint announced.
    pub fn announce(&mut self, device: Uuid, codec: CodecId, path: impl Into<String>, capabilities: Vec<u8>) {
        self.devices.entry(device).or_default().entry(codec).or_default().insert(path.into(), capabilities);
    }

    /// Removes a remote endpoint's announcement, e.g. once it disappears from the bus.
    pub fn remove(&mut self, device: Uuid, codec: CodecId, path: &str) {
        if let Some(by_codec) = self.devices.get_mut(&device) {
            if let Some(by_path) = by_codec.get_mut(&codec) {
                by_path.remove(path);
            }
        }
    }

    /// All `(path, capabilities)` pairs announced for `device` under `codec`.
    pub fn endpoints_for(&self, device: Uuid, codec: CodecId) -> Vec<(&str, &[u8])> {
        self.devices
            .get(&device)
            .and_then(|by_codec| by_codec.get(&codec))
            .map(|by_path| by_path.iter().map(|(p, c)| (p.as_str(), c.as_slice())).collect())
            .unwrap_or_default()
    }

    pub fn capabilities_of(&self, device: Uuid, codec: CodecId, path: &str) -> Option<&[u8]> {
        self.devices.get(&device)?.get(&codec)?.get(path).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reannouncing_a_path_replaces_rather_than_duplicates() {
        let mut map = EndpointMap::new();
        let device = Uuid::new_v4();
        let codec = CodecId::standard(0x00);
        map.announce(device, codec, "/endpoint/sbc", vec![1, 2]);
        map.announce(device, codec, "/endpoint/sbc", vec![3, 4]);
        assert_eq!(map.endpoints_for(device, codec).len(), 1);
        assert_eq!(map.capabilities_of(device, codec, "/endpoint/sbc"), Some(&[3, 4][..]));
    }

    #[test]
    fn remove_drops_the_announcement() {
        let mut map = EndpointMap::new();
        let device = Uuid::new_v4();
        let codec = CodecId::standard(0x00);
        map.announce(device, codec, "/endpoint/sbc", vec![1]);
        map.remove(device, codec, "/endpoint/sbc");
        assert!(map.endpoints_for(device, codec).is_empty());
    }

    #[test]
    fn separate_devices_do_not_share_endpoints() {
        let mut map = EndpointMap::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let codec = CodecId::standard(0x00);
        map.announce(a, codec, "/endpoint/sbc", vec![1]);
        assert!(map.endpoints_for(b, codec).is_empty());
    }
}
