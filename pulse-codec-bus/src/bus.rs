//! The inter-process bus surface: the four methods a media endpoint object exposes (`SetConfiguration`,
//! `SelectConfiguration`, `ClearConfiguration`, `Release`), abstracted behind a trait so the
//! negotiation engine in [`crate::switch`] doesn't depend on a concrete D-Bus binding.
//!
//! Every method is dispatched by object path, mirroring how a real bus would route a method call
//! addressed to `org.bluez.MediaEndpoint1` at a given path to whichever local or remote object
//! registered there.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BusError {
    #[error("no endpoint registered at {0}")]
    UnknownPath(String),
    #[error("endpoint at {0} already has a configuration")]
    AlreadyConfigured(String),
    #[error("capability blob rejected: {0}")]
    InvalidCapabilities(String),
}

/// Object-path-keyed method dispatch for the media endpoint lifecycle.
pub trait MediaBus {
    /// Validates `capabilities` against the endpoint at `path` and, on success, marks it
    /// configured. Called both when bluez configures a local endpoint and when this crate
    /// configures a chosen remote one during codec switching.
    fn set_configuration(&mut self, path: &str, capabilities: &[u8]) -> Result<(), BusError>;

    /// Asks the endpoint at `path` to pick its preferred configuration out of `capabilities`,
    /// returning the chosen blob.
    fn select_configuration(&mut self, path: &str, capabilities: &[u8]) -> Result<Vec<u8>, BusError>;

    /// Clears whatever configuration [`MediaBus::set_configuration`] installed.
    fn clear_configuration(&mut self, path: &str) -> Result<(), BusError>;

    /// No-op acknowledgement that the endpoint is being torn down.
    fn release(&mut self, path: &str) -> Result<(), BusError>;
}

struct Endpoint {
    preferred: Vec<u8>,
    configured: Option<Vec<u8>>,
}

/// A `HashMap`-backed, in-process stand-in for a real D-Bus connection. Endpoints are registered
/// by path with the capability blob they'll hand back from `select_configuration`; used both as
/// the production implementation for a standalone (non-bluez) deployment and as the harness the
/// negotiation engine's tests exercise.
#[derive(Default)]
pub struct InProcessBus {
    endpoints: HashMap<String, Endpoint>,
}

impl InProcessBus {
    pub fn new() -> Self {
        InProcessBus { endpoints: HashMap::new() }
    }

    /// Registers an endpoint at `path` with the configuration blob it will offer from
    /// `select_configuration`.
    pub fn register(&mut self, path: impl Into<String>, preferred: Vec<u8>) {
        self.endpoints.insert(path.into(), Endpoint { preferred, configured: None });
    }

    pub fn is_configured(&self, path: &str) -> bool {
        self.endpoints.get(path).is_some_and(|e| e.configured.is_some())
    }
}

impl MediaBus for InProcessBus {
    fn set_configuration(&mut self, path: &str, capabilities: &[u8]) -> Result<(), BusError> {
        let endpoint = self.endpoints.get_mut(path).ok_or_else(|| BusError::UnknownPath(path.to_string()))?;
        if endpoint.configured.is_some() {
            return Err(BusError::AlreadyConfigured(path.to_string()));
        }
        if capabilities.is_empty() {
            return Err(BusError::InvalidCapabilities("empty capability blob".to_string()));
        }
        endpoint.configured = Some(capabilities.to_vec());
        Ok(())
    }

    fn select_configuration(&mut self, path: &str, _capabilities: &[u8]) -> Result<Vec<u8>, BusError> {
        let endpoint = self.endpoints.get(path).ok_or_else(|| BusError::UnknownPath(path.to_string()))?;
        Ok(endpoint.preferred.clone())
    }

    fn clear_configuration(&mut self, path: &str) -> Result<(), BusError> {
        let endpoint = self.endpoints.get_mut(path).ok_or_else(|| BusError::UnknownPath(path.to_string()))?;
        endpoint.configured = None;
        Ok(())
    }

    fn release(&mut self, path: &str) -> Result<(), BusError> {
        if !self.endpoints.contains_key(path) {
            return Err(BusError::UnknownPath(path.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_configuration_rejects_duplicates() {
        let mut bus = InProcessBus::new();
        bus.register("/endpoint/sbc", vec![1, 2, 3]);
        bus.set_configuration("/endpoint/sbc", &[0xaa]).unwrap();
        assert!(bus.is_configured("/endpoint/sbc"));
        let err = bus.set_configuration("/endpoint/sbc", &[0xbb]).unwrap_err();
        assert_eq!(err, BusError::AlreadyConfigured("/endpoint/sbc".to_string()));
    }

    #[test]
    fn clear_configuration_allows_reconfiguration() {
        let mut bus = InProcessBus::new();
        bus.register("/endpoint/sbc", vec![1]);
        bus.set_configuration("/endpoint/sbc", &[0xaa]).unwrap();
        bus.clear_configuration("/endpoint/sbc").unwrap();
        assert!(!bus.is_configured("/endpoint/sbc"));
        bus.set_configuration("/endpoint/sbc", &[0xbb]).unwrap();
    }

    #[test]
    fn unknown_path_is_rejected() {
        let mut bus = InProcessBus::new();
        assert!(matches!(bus.set_configuration("/nope", &[1]), Err(BusError::UnknownPath(_))));
    }

    #[test]
    fn select_configuration_returns_registered_preference() {
        let mut bus = InProcessBus::new();
        bus.register("/endpoint/sbc", vec![9, 9]);
        let chosen = bus.select_configuration("/endpoint/sbc", &[1, 2]).unwrap();
        assert_eq!(chosen, vec![9, 9]);
    }
}
