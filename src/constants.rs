//! ## Constants
//!
//! Various constants used throughout the project.
//!

#[allow(unused)]
pub mod usb {
    /// USB vendor id used to filter the recorder devices this crate targets.
    pub const VENDOR_ID: u16 = 0x1D3D;
}

#[allow(unused)]
pub mod misc {
    use std::time::Duration;

    /// The default timeout duration for Command/Response phases.
    pub const DEFAULT_TIMEOUT_DURATION: Duration = Duration::from_secs(5);
    /// Default timeout for bulk-IN reads during a large-object download.
    pub const DEFAULT_DOWNLOAD_TIMEOUT_DURATION: Duration = Duration::from_secs(30);
    /// The size in bytes of a Container header in a bulk transfer.
    pub const CONTAINER_HEADER_SIZE: usize = 12;
    /// Maximum size in bytes of a single bulk packet on this profile's endpoints.
    pub const MTP_PACKET_MAX_SIZE: usize = 512;
    /// Payload byte count carried by the very first Data write of a Data-out
    /// phase, chosen so the first transfer (header + payload) stays <= 512
    /// bytes. A reverse-engineered quirk the device depends on; preserved
    /// verbatim.
    pub const FIRST_DATA_OUT_PAYLOAD_SIZE: usize = 500;
    /// Default chunk window (in received packets) for large-object streaming.
    pub const DEFAULT_CHUNK_WINDOW_PACKETS: u64 = 50_000;
}

/// MTP operation codes used by this crate (spec §6, all others unsupported).
#[allow(unused)]
pub mod operations {
    pub const OPEN_SESSION: u16 = 0x1002;
    pub const CLOSE_SESSION: u16 = 0x1003;
    pub const GET_STORAGE_IDS: u16 = 0x1004;
    pub const GET_STORAGE_INFO: u16 = 0x1005;
    pub const GET_OBJECT_HANDLES: u16 = 0x1007;
    pub const GET_OBJECT_INFO: u16 = 0x1008;
    pub const GET_OBJECT: u16 = 0x1009;
    pub const DELETE_OBJECT: u16 = 0x100B;
    pub const SEND_OBJECT_INFO: u16 = 0x100C;
    pub const SEND_OBJECT: u16 = 0x100D;
}

/// MTP response codes recognized by this crate.
#[allow(unused)]
pub mod responses {
    pub const OK: u16 = 0x2001;
    pub const SESSION_ALREADY_OPEN: u16 = 0x201E;
}

/// Storage type values for the `StorageInfo` dataset (PIMA 15740 §5.2.1).
///
/// Kept in its own namespace since the underlying wire value 0x0000
/// collides with `filesystem_type::UNDEFINED` below for a different enum.
#[allow(unused)]
pub mod storage_type {
    pub const UNDEFINED: u16 = 0x0000;
    pub const FIXED_ROM: u16 = 0x0001;
    pub const REMOVABLE_ROM: u16 = 0x0002;
    pub const FIXED_RAM: u16 = 0x0003;
    pub const REMOVABLE_RAM: u16 = 0x0004;
}

/// Filesystem type values for the `StorageInfo` dataset.
///
/// Distinct namespace from `storage_type`: both define an "undefined"
/// variant at wire value 0x0000 but they are not interchangeable.
#[allow(unused)]
pub mod filesystem_type {
    pub const UNDEFINED: u16 = 0x0000;
    pub const GENERIC_FLAT: u16 = 0x0001;
    pub const GENERIC_HIERARCHICAL: u16 = 0x0002;
    pub const DCF: u16 = 0x0003;
}

/// Access capability values for the `StorageInfo` dataset.
#[allow(unused)]
pub mod access_capability {
    pub const READ_WRITE: u16 = 0x0000;
    pub const READ_ONLY: u16 = 0x0001;
    pub const READ_ONLY_WITH_OBJECT_DELETION: u16 = 0x0002;
}

/// Object format codes relevant to this profile.
#[allow(unused)]
pub mod object_format {
    pub const UNDEFINED: u16 = 0x3000;
}

/// Fixed byte observed at offset 13 of a captured `ObjectInfo` dataset.
/// Reverse-engineered; meaning unknown. Preserve verbatim, do not interpret.
pub const OBJECT_INFO_RESERVED_BYTE_13: u8 = 0x30;

/// The fixed session id used by this profile.
pub const SESSION_ID: u32 = 1;
