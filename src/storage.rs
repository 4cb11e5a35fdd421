//! # Device Storage
//!
//! The client persists the identity issued by fleet provisioning and offers a
//! small opaque blob for application data. Actual non-volatile storage is a
//! collaborator; [`MemoryStorage`] keeps everything in RAM for hosts and tests.

use heapless::String;

use crate::config::{CERTIFICATE_LEN, PRIVATE_KEY_LEN, THING_NAME_LEN};

/// Size of the application data blob.
pub const APP_DATA_LEN: usize = 256;

/// Identity material produced by provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub thing_name: String<THING_NAME_LEN>,
    pub certificate: String<CERTIFICATE_LEN>,
    pub private_key: String<PRIVATE_KEY_LEN>,
}

/// Persistent storage collaborator.
pub trait DeviceStorage {
    #[cfg(not(feature = "defmt"))]
    type Error: core::fmt::Debug;
    #[cfg(feature = "defmt")]
    type Error: core::fmt::Debug + defmt::Format;

    /// `true` once an identity has been stored.
    fn is_device_registered(&self) -> bool;

    /// The stored identity, if any.
    fn identity(&self) -> Option<&Identity>;

    fn store_identity(&mut self, identity: &Identity) -> Result<(), Self::Error>;

    fn read_app_data(&self, out: &mut [u8; APP_DATA_LEN]) -> Result<(), Self::Error>;

    fn write_app_data(&mut self, data: &[u8; APP_DATA_LEN]) -> Result<(), Self::Error>;

    fn erase_app_data(&mut self) -> Result<(), Self::Error>;

    /// The stored thing name, if any.
    fn thing_name(&self) -> Option<&str> {
        self.identity().map(|id| id.thing_name.as_str())
    }
}

/// RAM-backed storage.
pub struct MemoryStorage {
    identity: Option<Identity>,
    app_data: [u8; APP_DATA_LEN],
}

impl MemoryStorage {
    pub const fn new() -> Self {
        Self {
            identity: None,
            app_data: [0; APP_DATA_LEN],
        }
    }

    /// Storage that already holds an identity.
    pub fn with_identity(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            ..Self::new()
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStorage for MemoryStorage {
    type Error = core::convert::Infallible;

    fn is_device_registered(&self) -> bool {
        self.identity.is_some()
    }

    fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    fn store_identity(&mut self, identity: &Identity) -> Result<(), Self::Error> {
        self.identity = Some(identity.clone());
        Ok(())
    }

    fn read_app_data(&self, out: &mut [u8; APP_DATA_LEN]) -> Result<(), Self::Error> {
        out.copy_from_slice(&self.app_data);
        Ok(())
    }

    fn write_app_data(&mut self, data: &[u8; APP_DATA_LEN]) -> Result<(), Self::Error> {
        self.app_data.copy_from_slice(data);
        Ok(())
    }

    fn erase_app_data(&mut self) -> Result<(), Self::Error> {
        self.app_data = [0; APP_DATA_LEN];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trip() {
        let mut storage = MemoryStorage::new();
        assert!(!storage.is_device_registered());
        assert_eq!(storage.thing_name(), None);

        let mut identity = Identity::default();
        identity.thing_name.push_str("sensor-01").unwrap();
        identity.certificate.push_str("-----BEGIN CERTIFICATE-----").unwrap();
        storage.store_identity(&identity).unwrap();

        assert!(storage.is_device_registered());
        assert_eq!(storage.thing_name(), Some("sensor-01"));
        assert_eq!(storage.identity(), Some(&identity));
    }

    #[test]
    fn app_data_write_read_erase() {
        let mut storage = MemoryStorage::new();
        let mut blob = [0u8; APP_DATA_LEN];
        blob[0] = 0xAB;
        blob[APP_DATA_LEN - 1] = 0xCD;
        storage.write_app_data(&blob).unwrap();

        let mut out = [0u8; APP_DATA_LEN];
        storage.read_app_data(&mut out).unwrap();
        assert_eq!(out, blob);

        storage.erase_app_data().unwrap();
        storage.read_app_data(&mut out).unwrap();
        assert_eq!(out, [0u8; APP_DATA_LEN]);
    }
}
