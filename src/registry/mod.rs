//! Device registry.
//!
//! Devices are registered once while a bench is wired and looked up by
//! role, feature or location from then on. Lookups always return a
//! [`DeviceHandle`]; a miss gives the `Unavailable` variant instead of an
//! absence, so drivers fail only when they actually touch the device.
//!
//! ```
//! use consolebench::registry::{DeviceDescriptor, DeviceRegistry};
//! use consolebench::session::ScriptedTransport;
//! use consolebench::ConsoleBuilder;
//!
//! let mut registry = DeviceRegistry::new();
//! let cm = ConsoleBuilder::new("cm1").with_transport(ScriptedTransport::new());
//! registry
//!     .register(DeviceDescriptor::new("cm1", "cm").with_feature("docsis-3.1"), cm)
//!     .unwrap();
//!
//! assert!(registry.by_role("cm").same_device(&registry.accessor("cm1")));
//! assert!(!registry.by_role("cmts").is_available());
//! ```

mod handle;

pub use handle::{DeviceHandle, RegisteredDevice};

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::config::{DeviceConfig, Inventory};
use crate::console::{ConsoleBuilder, ConsoleDevice};
use crate::result::{Error, ExpectError, RegistryError};

/// Registry metadata of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Unique accessor name
    pub accessor: String,
    /// Role tag
    pub role: String,
    /// Feature tags
    pub features: BTreeSet<String>,
    /// Location tag
    pub location: Option<String>,
}

impl DeviceDescriptor {
    /// Descriptor with no features or location.
    pub fn new(accessor: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            accessor: accessor.into(),
            role: role.into(),
            features: BTreeSet::new(),
            location: None,
        }
    }

    /// Add a feature tag.
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.features.insert(feature.into());
        self
    }

    /// Set the location tag.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Descriptor for an inventory entry.
    pub fn from_config(device: &DeviceConfig) -> Self {
        Self {
            accessor: device.name.clone(),
            role: device.role.clone(),
            features: device.features.iter().cloned().collect(),
            location: device.location.clone(),
        }
    }

    /// Whether every filter set on `query` holds.
    pub fn matches(&self, query: &DeviceQuery) -> bool {
        query.accessor.as_ref().is_none_or(|a| *a == self.accessor)
            && query.role.as_ref().is_none_or(|r| *r == self.role)
            && query
                .feature
                .as_ref()
                .is_none_or(|f| self.features.contains(f))
            && query
                .location
                .as_ref()
                .is_none_or(|l| self.location.as_ref() == Some(l))
    }
}

/// Lookup filters; all that are set must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceQuery {
    /// Required accessor name
    pub accessor: Option<String>,
    /// Required role
    pub role: Option<String>,
    /// Required feature
    pub feature: Option<String>,
    /// Required location
    pub location: Option<String>,
}

impl DeviceQuery {
    /// Query by accessor name.
    pub fn accessor(name: impl Into<String>) -> Self {
        Self {
            accessor: Some(name.into()),
            ..Self::default()
        }
    }

    /// Query by role.
    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Self::default()
        }
    }

    /// Query by feature.
    pub fn feature(feature: impl Into<String>) -> Self {
        Self {
            feature: Some(feature.into()),
            ..Self::default()
        }
    }

    /// Query by location.
    pub fn location(location: impl Into<String>) -> Self {
        Self {
            location: Some(location.into()),
            ..Self::default()
        }
    }

    /// Also require a feature.
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Also require a location.
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for DeviceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = [
            ("accessor", &self.accessor),
            ("role", &self.role),
            ("feature", &self.feature),
            ("location", &self.location),
        ]
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| format!("{key}={v}")))
        .collect();
        if parts.is_empty() {
            f.write_str("any device")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// All devices of one bench.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Vec<Rc<RegisteredDevice>>,
    accessors: HashMap<String, usize>,
}

impl DeviceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn and register every inventory device.
    ///
    /// The inventory is validated before anything is spawned.
    pub fn from_inventory(inventory: &Inventory) -> Result<Self, Error> {
        Self::from_inventory_with(inventory, ConsoleBuilder::spawn)
    }

    /// Like [`from_inventory`](Self::from_inventory), with a custom
    /// builder-to-device step (e.g. to inject transports).
    pub fn from_inventory_with(
        inventory: &Inventory,
        mut build: impl FnMut(ConsoleBuilder) -> Result<ConsoleDevice, ExpectError>,
    ) -> Result<Self, Error> {
        inventory.validate()?;
        let mut registry = Self::new();
        for device in &inventory.devices {
            let builder = ConsoleBuilder::from_device_config(device, &inventory.run)?;
            let console = match build(builder) {
                Ok(console) => console,
                Err(e) => {
                    registry.close_all();
                    return Err(e.into());
                }
            };
            registry.register(DeviceDescriptor::from_config(device), console)?;
        }
        tracing::info!(devices = registry.len(), "bench wired");
        Ok(registry)
    }

    /// Register a device under its accessor name.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateAccessor`] if the name is taken.
    pub fn register(
        &mut self,
        descriptor: DeviceDescriptor,
        console: ConsoleDevice,
    ) -> Result<DeviceHandle, RegistryError> {
        if self.accessors.contains_key(&descriptor.accessor) {
            return Err(RegistryError::DuplicateAccessor {
                name: descriptor.accessor,
            });
        }
        tracing::debug!(accessor = %descriptor.accessor, role = %descriptor.role, "registered");
        self.accessors
            .insert(descriptor.accessor.clone(), self.devices.len());
        let device = Rc::new(RegisteredDevice {
            descriptor,
            console: RefCell::new(console),
        });
        self.devices.push(device.clone());
        Ok(DeviceHandle::Available(device))
    }

    /// The device registered under `name`.
    pub fn accessor(&self, name: &str) -> DeviceHandle {
        match self.accessors.get(name) {
            Some(&index) => DeviceHandle::Available(self.devices[index].clone()),
            None => DeviceHandle::Unavailable(DeviceQuery::accessor(name)),
        }
    }

    /// The device with role `role`.
    pub fn by_role(&self, role: &str) -> DeviceHandle {
        self.find(&DeviceQuery::role(role))
    }

    /// The device offering `feature`.
    pub fn by_feature(&self, feature: &str) -> DeviceHandle {
        self.find(&DeviceQuery::feature(feature))
    }

    /// The device at `location`.
    pub fn by_location(&self, location: &str) -> DeviceHandle {
        self.find(&DeviceQuery::location(location))
    }

    /// Look up `count` devices matching `query`.
    ///
    /// # Errors
    ///
    /// Only single-device lookups are supported; any other `count` is
    /// [`RegistryError::UnsupportedCount`].
    pub fn lookup(&self, query: &DeviceQuery, count: usize) -> Result<DeviceHandle, RegistryError> {
        if count != 1 {
            return Err(RegistryError::UnsupportedCount { count });
        }
        Ok(self.find(query))
    }

    /// First device, in registration order, matching `query`.
    pub fn find(&self, query: &DeviceQuery) -> DeviceHandle {
        self.devices
            .iter()
            .find(|d| d.descriptor.matches(query))
            .map(|d| DeviceHandle::Available(d.clone()))
            .unwrap_or_else(|| DeviceHandle::Unavailable(query.clone()))
    }

    /// Handles for every device, in registration order.
    pub fn handles(&self) -> Vec<DeviceHandle> {
        self.devices
            .iter()
            .map(|d| DeviceHandle::Available(d.clone()))
            .collect()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Close every device; devices busy elsewhere are skipped.
    pub fn close_all(&self) {
        for device in &self.devices {
            match device.console.try_borrow_mut() {
                Ok(mut console) => console.close(),
                Err(_) => {
                    tracing::warn!(accessor = %device.descriptor.accessor, "busy, not closed")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ScriptedTransport;

    fn console(name: &str) -> ConsoleDevice {
        ConsoleBuilder::new(name).with_transport(ScriptedTransport::new())
    }

    fn bench() -> DeviceRegistry {
        let mut registry = DeviceRegistry::new();
        registry
            .register(
                DeviceDescriptor::new("wan", "router")
                    .with_feature("nat")
                    .at("rack-3"),
                console("wan"),
            )
            .unwrap();
        registry
            .register(
                DeviceDescriptor::new("cm1", "cm").with_feature("docsis-3.1"),
                console("cm1"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_lookup_identity_is_stable() {
        let registry = bench();
        let a = registry.by_role("router");
        let b = registry.by_role("router");
        assert!(a.same_device(&b));
        assert!(a.same_device(&registry.by_feature("nat")));
        assert!(a.same_device(&registry.by_location("rack-3")));
        assert!(!a.same_device(&registry.by_role("cm")));
    }

    #[test]
    fn test_duplicate_accessor() {
        let mut registry = bench();
        let err = registry
            .register(DeviceDescriptor::new("wan", "router"), console("wan"))
            .unwrap_err();
        assert_eq!(
            err,
            RegistryError::DuplicateAccessor {
                name: "wan".into()
            }
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unavailable_handle() {
        let registry = bench();
        let missing = registry.by_role("cmts");
        assert!(!missing.is_available());
        assert_eq!(missing.to_string(), "<unavailable: role=cmts>");
        assert!(format!("{missing:?}").starts_with("Unavailable"));
        assert!(!missing.same_device(&missing.clone()));

        let err = missing.run_command("show cable modem", None).unwrap_err();
        assert!(matches!(
            err,
            Error::Registry(RegistryError::DeviceDoesNotExist { .. })
        ));
        assert!(missing.close().is_err());
    }

    #[test]
    fn test_combined_query() {
        let registry = bench();
        let query = DeviceQuery::role("router").with_feature("docsis-3.1");
        assert!(!registry.find(&query).is_available());
        assert_eq!(query.to_string(), "role=router, feature=docsis-3.1");
    }

    #[test]
    fn test_count_must_be_one() {
        let registry = bench();
        assert_eq!(
            registry.lookup(&DeviceQuery::role("cm"), 2).unwrap_err(),
            RegistryError::UnsupportedCount { count: 2 }
        );
        assert!(registry
            .lookup(&DeviceQuery::role("cm"), 1)
            .unwrap()
            .is_available());
    }

    #[test]
    fn test_nested_borrow_is_busy() {
        let registry = bench();
        let wan = registry.accessor("wan");
        let inner = wan
            .with(|_| registry.accessor("wan").with(|_| ()))
            .unwrap();
        assert!(matches!(inner, Err(RegistryError::DeviceBusy { .. })));
    }

    #[test]
    fn test_missing_accessor_display() {
        let registry = bench();
        assert_eq!(
            registry.accessor("lan").to_string(),
            "<unavailable: accessor=lan>"
        );
    }

    #[test]
    fn test_close_all() {
        let registry = bench();
        registry.close_all();
        assert!(!registry.accessor("cm1").with(|c| c.is_open()).unwrap());
    }
}
