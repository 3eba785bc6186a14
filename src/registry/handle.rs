//! Device handles returned by registry lookups

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use super::{DeviceDescriptor, DeviceQuery};
use crate::console::ConsoleDevice;
use crate::pattern::Pattern;
use crate::result::{Error, ExpectError, MatchResult, RegistryError};

/// A console device together with its registry descriptor.
pub struct RegisteredDevice {
    pub(super) descriptor: DeviceDescriptor,
    pub(super) console: RefCell<ConsoleDevice>,
}

impl RegisteredDevice {
    /// Registry metadata.
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }
}

/// Result of a registry lookup.
///
/// A miss is not an absence: it yields [`DeviceHandle::Unavailable`], which
/// can be printed, compared and checked with [`is_available`], while every
/// real operation on it fails with [`RegistryError::DeviceDoesNotExist`].
///
/// [`is_available`]: DeviceHandle::is_available
#[derive(Clone)]
pub enum DeviceHandle {
    /// A registered device
    Available(Rc<RegisteredDevice>),
    /// Nothing matched the query
    Unavailable(DeviceQuery),
}

impl DeviceHandle {
    /// Whether the lookup found a device.
    pub fn is_available(&self) -> bool {
        matches!(self, DeviceHandle::Available(_))
    }

    /// Registry metadata, if available.
    pub fn descriptor(&self) -> Option<&DeviceDescriptor> {
        match self {
            DeviceHandle::Available(device) => Some(&device.descriptor),
            DeviceHandle::Unavailable(_) => None,
        }
    }

    /// True when both handles point at the same registered device.
    pub fn same_device(&self, other: &DeviceHandle) -> bool {
        match (self, other) {
            (DeviceHandle::Available(a), DeviceHandle::Available(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Borrow the console for the duration of `f`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DeviceDoesNotExist`] on an unavailable handle and
    /// [`RegistryError::DeviceBusy`] when called from inside another `with`
    /// on the same device.
    pub fn with<R>(&self, f: impl FnOnce(&mut ConsoleDevice) -> R) -> Result<R, RegistryError> {
        match self {
            DeviceHandle::Available(device) => {
                let mut console =
                    device
                        .console
                        .try_borrow_mut()
                        .map_err(|_| RegistryError::DeviceBusy {
                            name: device.descriptor.accessor.clone(),
                        })?;
                Ok(f(&mut console))
            }
            DeviceHandle::Unavailable(query) => Err(RegistryError::DeviceDoesNotExist {
                query: query.to_string(),
            }),
        }
    }

    fn console_op<R>(
        &self,
        f: impl FnOnce(&mut ConsoleDevice) -> Result<R, ExpectError>,
    ) -> Result<R, Error> {
        Ok(self.with(f)??)
    }

    /// See [`ConsoleDevice::run_command`].
    pub fn run_command(&self, cmd: &str, timeout: Option<Duration>) -> Result<String, Error> {
        self.console_op(|c| c.run_command(cmd, timeout))
    }

    /// See [`ConsoleDevice::emit`].
    pub fn emit(&self, text: &str) -> Result<(), Error> {
        self.console_op(|c| c.emit(text))
    }

    /// See [`ConsoleDevice::send_control`].
    pub fn send_control(&self, c: char) -> Result<(), Error> {
        self.console_op(|console| console.send_control(c))
    }

    /// See [`ConsoleDevice::expect_any`].
    pub fn expect_any(
        &self,
        patterns: &[Pattern],
        timeout: Option<Duration>,
    ) -> Result<MatchResult, Error> {
        self.console_op(|c| c.expect_any(patterns, timeout))
    }

    /// See [`ConsoleDevice::expect_exact`].
    pub fn expect_exact(&self, text: &str, timeout: Option<Duration>) -> Result<MatchResult, Error> {
        self.console_op(|c| c.expect_exact(text, timeout))
    }

    /// Close the device's session.
    pub fn close(&self) -> Result<(), Error> {
        Ok(self.with(ConsoleDevice::close)?)
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceHandle::Available(device) => f.write_str(&device.descriptor.accessor),
            DeviceHandle::Unavailable(query) => write!(f, "<unavailable: {query}>"),
        }
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceHandle::Available(device) => f
                .debug_tuple("Available")
                .field(&device.descriptor)
                .finish(),
            DeviceHandle::Unavailable(query) => f.debug_tuple("Unavailable").field(query).finish(),
        }
    }
}
