//! Bulk Transport
//!
//! Thin adapter over the USB host: open/close a device, select
//! configuration 1, claim interface 0, discover the bulk IN/OUT endpoint
//! pair, and exchange raw buffers on them. No MTP framing happens here;
//! that's the Container Codec's job (`crate::codec::container`).
//!

use std::thread::sleep;
use std::time::Duration;

use anyhow::Result;
use rusb::Context;

use crate::constants::misc::{DEFAULT_TIMEOUT_DURATION, MTP_PACKET_MAX_SIZE};
use crate::error::Error;
use crate::init::{self, DeviceFilter};
use crate::types::{DeviceMode, Endpoint, Handle, MtpEndpoints, Timeout};

/// Every bulk OUT write on this device family must be followed by a short
/// pause; removing it breaks transfers on some hosts.
const INTER_PACKET_DELAY: Duration = Duration::from_millis(10);

/// Minimal interface a Transaction Engine needs from a transport. Lets the
/// engine be tested against an in-process fake instead of real hardware.
pub trait BulkTransportLike {
    fn send(&self, bytes: &[u8]) -> Result<()>;
    fn recv(&self) -> Result<Vec<u8>>;
    fn timeout(&self) -> Duration;
    fn set_timeout(&self, duration: Duration);
}

/// ### BulkTransport
///
/// Owns the claimed USB interface and its bulk endpoint pair for one
/// recorder device. Not `Clone`: the claimed interface has exactly one
/// owner for its lifetime (spec §5), and that owner releases it on drop.
///
#[derive(Debug)]
pub struct BulkTransport {
    handle: Handle,
    mode: DeviceMode,
    endpoints: MtpEndpoints,
    timeout: Timeout,
}

impl BulkTransport {
    /// ### Open
    ///
    /// Open a device matching this crate's vendor id and `filter`, select
    /// configuration 1, claim interface 0, and discover endpoints.
    ///
    pub fn open(filter: impl DeviceFilter) -> Result<BulkTransport> {
        let mut context = Context::new()?;
        let (device, mut handle) = init::open_device(&mut context, filter)?;

        let mut mode = init::get_device_mode(&device)?;
        init::detach_kernel_driver(&mut mode, &mut handle)?;

        let endpoints = init::get_endpoints(&mode, &device)?;

        handle
            .set_active_configuration(mode.config_number)
            .map_err(|_| Error::DeviceUnavailable)?;
        handle
            .claim_interface(mode.interface_number)
            .map_err(|_| Error::DeviceUnavailable)?;

        Ok(BulkTransport {
            handle: Handle::new(handle),
            mode,
            endpoints,
            timeout: Timeout::new(DEFAULT_TIMEOUT_DURATION),
        })
    }

    /// Endpoint pair this transport discovered.
    pub fn endpoints(&self) -> &MtpEndpoints {
        &self.endpoints
    }

    fn bulk_out_endpoint(&self) -> &Endpoint {
        &self.endpoints.bulk_out_ep
    }

    fn bulk_in_endpoint(&self) -> &Endpoint {
        &self.endpoints.bulk_in_ep
    }

    /// Release the claimed interface. Also happens on drop, so calling
    /// this explicitly is only useful to observe the outcome.
    pub fn close(self) -> Result<()> {
        self.handle
            .borrow()
            .release_interface(self.mode.interface_number)?;
        Ok(())
    }
}

impl Drop for BulkTransport {
    fn drop(&mut self) {
        let handle = self.handle.borrow();
        if let Err(e) = handle.release_interface(self.mode.interface_number) {
            log::warn!("failed to release interface {}: {e}", self.mode.interface_number);
        }
        if self.mode.has_kernel_driver {
            if let Err(e) = handle.attach_kernel_driver(self.mode.interface_number) {
                log::warn!("failed to reattach kernel driver to interface {}: {e}", self.mode.interface_number);
            }
        }
    }
}

impl BulkTransportLike for BulkTransport {
    fn send(&self, bytes: &[u8]) -> Result<()> {
        self.handle.borrow().write_bulk(
            self.bulk_out_endpoint().address,
            bytes,
            *self.timeout.borrow(),
        )?;
        sleep(INTER_PACKET_DELAY);
        Ok(())
    }

    fn recv(&self) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; MTP_PACKET_MAX_SIZE];
        let n = self.handle.borrow().read_bulk(
            self.bulk_in_endpoint().address,
            &mut buffer,
            *self.timeout.borrow(),
        )?;
        buffer.truncate(n);
        Ok(buffer)
    }

    fn timeout(&self) -> Duration {
        *self.timeout.borrow()
    }

    fn set_timeout(&self, duration: Duration) {
        *self.timeout.borrow() = duration;
    }
}

#[cfg(test)]
pub mod fake {
    //! An in-process fake transport for exercising the Transaction Engine
    //! and higher layers without real hardware. Pushes/pops fixed-size
    //! "bulk transfers" from two independent queues, mirroring the
    //! half-duplex bulk IN/OUT pair the real transport exposes.

    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    #[derive(Debug, Default)]
    pub struct FakeTransport {
        pub to_device: RefCell<VecDeque<Vec<u8>>>,
        pub from_device: RefCell<VecDeque<Vec<u8>>>,
        pub timeout: RefCell<Duration>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            FakeTransport {
                to_device: RefCell::new(VecDeque::new()),
                from_device: RefCell::new(VecDeque::new()),
                timeout: RefCell::new(DEFAULT_TIMEOUT_DURATION),
            }
        }

        /// Queue up a packet the fake device will hand back on the next `recv()`.
        pub fn push_in(&self, bytes: Vec<u8>) {
            self.from_device.borrow_mut().push_back(bytes);
        }

        /// Drain what the host wrote on the bulk OUT side so far.
        pub fn drain_out(&self) -> Vec<Vec<u8>> {
            self.to_device.borrow_mut().drain(..).collect()
        }
    }

    impl BulkTransportLike for FakeTransport {
        fn send(&self, bytes: &[u8]) -> Result<()> {
            self.to_device.borrow_mut().push_back(bytes.to_vec());
            Ok(())
        }

        fn recv(&self) -> Result<Vec<u8>> {
            self.from_device
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| Error::TransportLost("fake transport starved".into()).into())
        }

        fn timeout(&self) -> Duration {
            *self.timeout.borrow()
        }

        fn set_timeout(&self, duration: Duration) {
            *self.timeout.borrow() = duration;
        }
    }
}
