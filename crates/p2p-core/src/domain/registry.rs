//! Keyed registry of every discovered device.
//!
//! The registry is the single owner of [`NetworkDevice`] values.  Lookups are
//! by address, so an upsert is a map lookup rather than a scan over all known
//! devices.  A `BTreeMap` keeps iteration order stable, which makes the
//! "device lost" notifications sent on reset deterministic.

use std::collections::BTreeMap;

use crate::domain::device::{DeviceAddress, DeviceState, NetworkDevice};

/// Outcome of [`DeviceRegistry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// The address was new; a device in `Idle` state was created.
    Inserted,
    /// The address was known; its name was refreshed in place.
    Updated,
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceAddress, NetworkDevice>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new idle device or refreshes the name of a known one.
    ///
    /// The state of an existing device is never touched.
    pub fn upsert(
        &mut self,
        address: &str,
        name: &str,
        config_methods: Option<String>,
    ) -> Upsert {
        if let Some(device) = self.devices.get_mut(address) {
            device.name = name.to_string();
            if config_methods.is_some() {
                device.config_methods = config_methods;
            }
            return Upsert::Updated;
        }

        let mut device = NetworkDevice::new(address, name);
        device.config_methods = config_methods;
        self.devices.insert(address.to_string(), device);
        Upsert::Inserted
    }

    pub fn get(&self, address: &str) -> Option<&NetworkDevice> {
        self.devices.get(address)
    }

    pub fn contains(&self, address: &str) -> bool {
        self.devices.contains_key(address)
    }

    /// Sets the state of a device and returns the updated device.
    pub fn set_state(&mut self, address: &str, state: DeviceState) -> Option<&NetworkDevice> {
        let device = self.devices.get_mut(address)?;
        device.state = state;
        Some(device)
    }

    pub fn remove(&mut self, address: &str) -> Option<NetworkDevice> {
        self.devices.remove(address)
    }

    /// Removes and returns every device in address order.
    pub fn drain(&mut self) -> Vec<NetworkDevice> {
        std::mem::take(&mut self.devices).into_values().collect()
    }

    /// Returns a snapshot of all devices in address order.
    pub fn snapshot(&self) -> Vec<NetworkDevice> {
        self.devices.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "4e:74:03:70:e2:c1";

    #[test]
    fn test_registry_starts_empty() {
        let registry = DeviceRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_upsert_inserts_idle_device() {
        // Arrange
        let mut registry = DeviceRegistry::new();

        // Act
        let outcome = registry.upsert(ADDR, "Aquaris M10", Some("0x188".into()));

        // Assert
        assert_eq!(outcome, Upsert::Inserted);
        let device = registry.get(ADDR).expect("device");
        assert_eq!(device.state, DeviceState::Idle);
        assert_eq!(device.config_methods.as_deref(), Some("0x188"));
    }

    #[test]
    fn test_upsert_same_address_updates_in_place() {
        // Arrange
        let mut registry = DeviceRegistry::new();
        registry.upsert(ADDR, "old", None);
        registry.set_state(ADDR, DeviceState::Connected);

        // Act
        let outcome = registry.upsert(ADDR, "new", None);

        // Assert: one entry, latest name, state untouched
        assert_eq!(outcome, Upsert::Updated);
        assert_eq!(registry.len(), 1);
        let device = registry.get(ADDR).expect("device");
        assert_eq!(device.name, "new");
        assert_eq!(device.state, DeviceState::Connected);
    }

    #[test]
    fn test_set_state_on_unknown_address_returns_none() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.set_state(ADDR, DeviceState::Failure).is_none());
    }

    #[test]
    fn test_drain_returns_devices_in_address_order_and_empties() {
        let mut registry = DeviceRegistry::new();
        registry.upsert("bb:00:00:00:00:00", "b", None);
        registry.upsert("aa:00:00:00:00:00", "a", None);

        let drained = registry.drain();

        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].name, "a");
        assert_eq!(drained[1].name, "b");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_remove_deletes_device() {
        let mut registry = DeviceRegistry::new();
        registry.upsert(ADDR, "x", None);
        assert!(registry.remove(ADDR).is_some());
        assert!(!registry.contains(ADDR));
    }
}
