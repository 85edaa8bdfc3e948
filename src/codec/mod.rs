//! ## Codec
//!
//! Wire formats for this MTP profile: Container packet framing
//! (`container`) and dataset encodings carried inside Data phases
//! (`dataset`).
//!

pub mod container;
pub mod dataset;

pub use container::{Container, ContainerType};
pub use dataset::{MtpDateTime, ObjectInfo, StorageInfo};
