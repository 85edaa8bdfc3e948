//! ## Initialization
//!
//! A set of functions to help initialize a connection to a recorder device.
//!

use crate::{
    constants::usb::VENDOR_ID,
    error::Error,
    types::{DeviceAddr, DeviceId, DeviceInfo, DeviceMode, Endpoint, MtpEndpoints},
};

use anyhow::Result;
use rusb::{Context, Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};

/// Device filter
///
/// Narrows device discovery down to one device among several attached
/// recorders. Only devices matching this crate's vendor id are ever
/// considered; a filter further narrows among those matches.
pub trait DeviceFilter {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool;
}

/// Get the first found recorder device.
impl DeviceFilter for () {
    fn apply_filter<T: UsbContext>(
        &self,
        _device: &Device<T>,
        _device_desc: &DeviceDescriptor,
    ) -> bool {
        true
    }
}

/// Get a recorder device by USB bus/address.
impl DeviceFilter for DeviceAddr {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        _device_desc: &DeviceDescriptor,
    ) -> bool {
        self.bus == device.bus_number() && self.device == device.address()
    }
}

/// Get a recorder device by USB bus/address (bus, address)
impl DeviceFilter for (u8, u8) {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        _device_desc: &DeviceDescriptor,
    ) -> bool {
        self.0 == device.bus_number() && self.1 == device.address()
    }
}

/// Get a recorder device by USB identifiers
impl DeviceFilter for DeviceId {
    fn apply_filter<T: UsbContext>(
        &self,
        _device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        self.vendor_id == device_desc.vendor_id() && self.product_id == device_desc.product_id()
    }
}

/// Get a recorder device by USB identifiers (idVendor, idProduct)
impl DeviceFilter for (u16, u16) {
    fn apply_filter<T: UsbContext>(
        &self,
        _device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        self.0 == device_desc.vendor_id() && self.1 == device_desc.product_id()
    }
}

/// Get a recorder device by info (both USB identifiers and address)
impl DeviceFilter for DeviceInfo {
    fn apply_filter<T: UsbContext>(
        &self,
        device: &Device<T>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        self.id.apply_filter(device, device_desc) && self.address.apply_filter(device, device_desc)
    }
}

/// Allow apply filter by reference
impl<T: DeviceFilter> DeviceFilter for &T {
    fn apply_filter<X: UsbContext>(
        &self,
        device: &Device<X>,
        device_desc: &DeviceDescriptor,
    ) -> bool {
        (**self).apply_filter(device, device_desc)
    }
}

fn is_vendor_match(device_desc: &DeviceDescriptor) -> bool {
    device_desc.vendor_id() == VENDOR_ID
}

/// ### List Devices
///
/// List all attached devices matching this crate's vendor id.
///
pub fn list_devices<T: UsbContext>(context: &mut T) -> Result<Vec<DeviceInfo>> {
    Ok(context
        .devices()?
        .iter()
        .filter_map(|device| {
            let device_desc = device.device_descriptor().ok()?;
            if is_vendor_match(&device_desc) {
                Some(DeviceInfo {
                    id: DeviceId {
                        vendor_id: device_desc.vendor_id(),
                        product_id: device_desc.product_id(),
                    },
                    address: DeviceAddr {
                        bus: device.bus_number(),
                        device: device.address(),
                    },
                })
            } else {
                None
            }
        })
        .collect())
}

/// ### Open Device
///
/// Open a device matching this crate's vendor id and the given filter.
///
pub fn open_device<T: UsbContext>(
    context: &mut T,
    filter: impl DeviceFilter,
) -> Result<(Device<T>, DeviceHandle<T>)> {
    let devices = context.devices()?;

    for device in devices.iter() {
        if let Ok(device_desc) = device.device_descriptor() {
            if is_vendor_match(&device_desc) && filter.apply_filter(&device, &device_desc) {
                if let Ok(handle) = device.open() {
                    return Ok((device, handle));
                }
            }
        }
    }

    Err(Error::DeviceNotFound.into())
}

/// ### Get Device Mode
///
/// This profile always uses configuration 1, interface 0, the first
/// alternate setting (spec §4.1, §6).
pub fn get_device_mode(device: &Device<Context>) -> Result<DeviceMode> {
    let device_desc = device.device_descriptor()?;
    if device_desc.num_configurations() == 0 {
        return Err(Error::ConfigurationNotFound.into());
    }

    let config_desc = device.config_descriptor(0)?;
    let interface = config_desc
        .interfaces()
        .next()
        .ok_or(Error::InterfaceNotFound)?;
    let interface_desc = interface
        .descriptors()
        .next()
        .ok_or(Error::InterfaceSettingNotFound)?;

    Ok(DeviceMode {
        config_number: config_desc.number(),
        interface_number: interface_desc.interface_number(),
        setting_number: interface_desc.setting_number(),
        has_kernel_driver: false,
    })
}

/// ### Detach Kernel Driver
///
/// If the interface uses a kernel driver, detach it for the duration of the
/// connection.
///
pub fn detach_kernel_driver(
    mode: &mut DeviceMode,
    handle: &mut DeviceHandle<Context>,
) -> Result<()> {
    mode.has_kernel_driver = match handle.kernel_driver_active(mode.interface_number) {
        Ok(true) => {
            handle.detach_kernel_driver(mode.interface_number)?;
            true
        }
        _ => false,
    };

    Ok(())
}

/// ### Get Endpoints
///
/// Discover the bulk IN/OUT endpoint pair on the interface's first
/// alternate setting. Interrupt endpoints are ignored (spec §4.1).
///
pub fn get_endpoints(mode: &DeviceMode, device: &Device<Context>) -> Result<MtpEndpoints> {
    let config_desc = device.config_descriptor(mode.config_number - 1)?;
    let interface = match config_desc
        .interfaces()
        .find(|inter| inter.number() == mode.interface_number)
    {
        Some(i) => i,
        None => return Err(Error::InterfaceNotFound.into()),
    };
    let interface_desc = match interface
        .descriptors()
        .find(|d| d.setting_number() == mode.setting_number)
    {
        Some(desc) => desc,
        None => return Err(Error::InterfaceSettingNotFound.into()),
    };

    let mut endpoints_list: Vec<Endpoint> = Vec::new();
    for endpoint in interface_desc.endpoint_descriptors() {
        endpoints_list.push(Endpoint {
            address: endpoint.address(),
            max_packet_size: endpoint.max_packet_size(),
            transfer_type: endpoint.transfer_type(),
            direction: endpoint.direction(),
        })
    }

    // Lowest-numbered endpoint of each bulk direction wins (spec §4.1).
    let bulk_out_ep = endpoints_list
        .iter()
        .filter(|ep| ep.transfer_type == TransferType::Bulk && ep.direction == Direction::Out)
        .min_by_key(|ep| ep.address)
        .cloned()
        .ok_or(Error::EndpointMissing { direction: "out" })?;
    let bulk_in_ep = endpoints_list
        .iter()
        .filter(|ep| ep.transfer_type == TransferType::Bulk && ep.direction == Direction::In)
        .min_by_key(|ep| ep.address)
        .cloned()
        .ok_or(Error::EndpointMissing { direction: "in" })?;

    Ok(MtpEndpoints {
        bulk_out_ep,
        bulk_in_ep,
    })
}
