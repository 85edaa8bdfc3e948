//! # mtp-rs
//!
//! Client-side USB Media Transfer Protocol (MTP v1.1) driver for a
//! family of vendor recorder devices. Speaks the single bulk-IN/bulk-OUT
//! interface these devices expose: Container framing, the ten MTP
//! operations this profile needs, chunked large-object download, and
//! the device-lifecycle bookkeeping a host application hangs its own UI
//! or document store off of.
//!
//! ## Usage
//!
//! To use, add the following line to your project's Cargo.toml dependencies:
//! ```toml
//! mtp-rs = "0.1"
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use mtp_rs::session::Session;
//! use mtp_rs::transport::BulkTransport;
//!
//! fn main() -> anyhow::Result<()> {
//!     let transport = BulkTransport::open(())?;
//!     let mut session = Session::new(transport);
//!
//!     session.open_session()?;
//!     let storage_ids = session.get_storage_ids()?;
//!     for id in storage_ids {
//!         session.get_storage_info(id)?;
//!     }
//!     session.close_session()?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Scope
//!
//! This crate targets the single fixed USB profile these recorders
//! expose (one configuration, one interface, one bulk endpoint pair).
//! It does not implement the full MTP operation set, MTP events on the
//! interrupt endpoint, PIMA object properties, or MTP/IP transport.
//!

pub mod codec;
pub mod config;
pub mod constants;
pub mod engine;
mod error;
mod init;
pub mod session;
pub mod streaming;
pub mod supervisor;
pub mod transport;
mod types;

pub use error::Error;
pub use init::DeviceFilter;
pub use types::{DeviceAddr, DeviceId, DeviceInfo, DeviceMode, Endpoint, MtpEndpoints};

use anyhow::Result;

/// List every attached device matching this crate's vendor id, without
/// opening any of them.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let mut context = rusb::Context::new()?;
    init::list_devices(&mut context)
}
