//! ## Types
//!
//! The different types used across the crate
//!

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusb::{Context, DeviceHandle, Direction, TransferType};

/// ### Handle
///
/// Alias for a libusb device handle wrapped in an Arc and Mutex, so it can
/// be shared between a device's owning supervisor entry and any session
/// built on top of it, while still being safely accessed from one logical
/// task at a time (see concurrency model).
///
#[derive(Debug, Clone)]
pub struct Handle(Arc<Mutex<DeviceHandle<Context>>>);

impl Handle {
    pub fn new(handle: DeviceHandle<Context>) -> Handle {
        Handle(Arc::new(Mutex::new(handle)))
    }

    pub fn borrow(&self) -> MutexGuard<'_, DeviceHandle<Context>> {
        self.0.lock().unwrap()
    }
}

/// ### Timeout
///
/// Alias for a duration wrapped in an Arc and Mutex.
#[derive(Debug, Clone)]
pub struct Timeout(Arc<Mutex<Duration>>);

impl Timeout {
    pub fn new(duration: Duration) -> Timeout {
        Timeout(Arc::new(Mutex::new(duration)))
    }

    pub fn borrow(&self) -> MutexGuard<'_, Duration> {
        self.0.lock().unwrap()
    }
}

/// ### Transaction Id Counter
///
/// The monotonically increasing transaction id assigned to every Command.
///
/// OpenSession is observed to use transaction id 0 exactly once; every
/// subsequent command increments first, then uses the new value. This is
/// modeled by starting the internal counter at `u32::MAX` so the first
/// pre-increment wraps to 0, and every call after that increments normally.
///
#[derive(Debug, Clone)]
pub struct TxCounter(Arc<Mutex<u32>>);

impl TxCounter {
    /// Return a fresh counter whose first `next()` call yields 0.
    pub fn new() -> TxCounter {
        TxCounter(Arc::new(Mutex::new(u32::MAX)))
    }

    /// Pre-increment and return the new transaction id.
    pub fn next(&self) -> u32 {
        let mut tx_id = self.0.lock().unwrap();
        *tx_id = tx_id.wrapping_add(1);
        *tx_id
    }
}

impl Default for TxCounter {
    fn default() -> Self {
        TxCounter::new()
    }
}

/// USB device address
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceAddr {
    /// USB bus number
    pub bus: u8,
    /// USB device number
    pub device: u8,
}

/// USB device identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceId {
    /// USB Id Vendor
    pub vendor_id: u16,
    /// USB Id Product
    pub product_id: u16,
}

/// USB device info
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub address: DeviceAddr,
}

/// ### Device Mode
///
/// A collection of the configuration, interface and interface number. Also if the interface has a kernel driver attached.
///
#[derive(Debug, Clone, Default)]
pub struct DeviceMode {
    /// The USB configuration number
    pub config_number: u8,
    /// The interface number specific to the configuration
    pub interface_number: u8,
    /// The setting number specific to the interface
    pub setting_number: u8,
    /// If the device has a kernel driver. Important for returning control to the OS (on Linux).
    pub has_kernel_driver: bool,
}

/// ### Endpoint
///
/// Properties of an endpoint.
///
#[derive(Clone, Debug)]
pub struct Endpoint {
    /// Address of the endpoint on the interface
    pub address: u8,
    /// The maximal size a packet can have on this endpoint
    pub max_packet_size: u16,
    /// The transfer type of the endpoint (for this profile, Bulk only)
    pub transfer_type: TransferType,
    /// The direction of the endpoint (In or Out)
    pub direction: Direction,
}

/// ### MTP Endpoints
///
/// The bulk endpoint pair this profile's single claimed interface exposes.
///
#[derive(Clone, Debug)]
pub struct MtpEndpoints {
    /// The mandatory BULK OUT endpoint
    pub bulk_out_ep: Endpoint,
    /// The mandatory BULK IN endpoint
    pub bulk_in_ep: Endpoint,
}
