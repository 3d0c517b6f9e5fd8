//! Property lists: ordered string-keyed maps of byte-array values, carried over the wire by the
//! `P` tag-struct type and attached to clients, streams and the entities introspection exposes.

use std::collections::BTreeMap;

/// Well-known property keys.
pub mod properties {
    pub const MEDIA_NAME: &str = "media.name";
    pub const MEDIA_TITLE: &str = "media.title";
    pub const MEDIA_ARTIST: &str = "media.artist";
    pub const MEDIA_ROLE: &str = "media.role";
    pub const APPLICATION_NAME: &str = "application.name";
    pub const APPLICATION_ID: &str = "application.id";
    pub const APPLICATION_VERSION: &str = "application.version";
    pub const APPLICATION_PROCESS_ID: &str = "application.process.id";
    pub const APPLICATION_PROCESS_BINARY: &str = "application.process.binary";
    pub const APPLICATION_PROCESS_USER: &str = "application.process.user";
    pub const APPLICATION_PROCESS_HOST: &str = "application.process.host";
    pub const DEVICE_STRING: &str = "device.string";
    pub const DEVICE_DESCRIPTION: &str = "device.description";
}

/// Update semantics for [`Proplist::update`], mirroring the wire `UPDATE_*` command variants.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UpdateMode {
    /// Replace the whole list.
    Set,
    /// Merge in, with new values overwriting any existing key.
    Merge,
    /// Merge in, but leave existing keys untouched.
    Replace,
}

/// A property list. Values are opaque byte arrays on the wire; most in practice are nil-terminated
/// UTF-8 strings, so string-typed accessors are provided alongside the raw ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proplist {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Proplist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a string-valued property (encoded without a trailing nil; the nil terminator is a
    /// wire-framing detail of [`crate::tagstruct`], not part of the stored value).
    pub fn set_str(&mut self, key: impl Into<String>, value: impl AsRef<str>) {
        self.entries.insert(key.into(), value.as_ref().as_bytes().to_vec());
    }

    pub fn set_raw(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.entries.insert(key.into(), value);
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn get_raw(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn unset(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Merges `other` into `self` per `mode`.
    pub fn update(&mut self, mode: UpdateMode, other: &Proplist) {
        match mode {
            UpdateMode::Set => {
                self.entries = other.entries.clone();
            }
            UpdateMode::Merge => {
                for (k, v) in &other.entries {
                    self.entries.insert(k.clone(), v.clone());
                }
            }
            UpdateMode::Replace => {
                for (k, v) in &other.entries {
                    self.entries.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_str() {
        let mut p = Proplist::new();
        p.set_str(properties::APPLICATION_NAME, "probe");
        assert_eq!(p.get_str(properties::APPLICATION_NAME), Some("probe"));
    }

    #[test]
    fn replace_mode_keeps_existing() {
        let mut a = Proplist::new();
        a.set_str("k", "orig");
        let mut b = Proplist::new();
        b.set_str("k", "new");
        b.set_str("k2", "v2");
        a.update(UpdateMode::Replace, &b);
        assert_eq!(a.get_str("k"), Some("orig"));
        assert_eq!(a.get_str("k2"), Some("v2"));
    }

    #[test]
    fn merge_mode_overwrites() {
        let mut a = Proplist::new();
        a.set_str("k", "orig");
        let mut b = Proplist::new();
        b.set_str("k", "new");
        a.update(UpdateMode::Merge, &b);
        assert_eq!(a.get_str("k"), Some("new"));
    }
}
