//! ## MTP Errors
//!
//! The errors used throughout the crate.
//!

#[allow(unused)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no device matched the requested filter")]
    DeviceNotFound,
    #[error("device could not be opened")]
    DeviceUnavailable,
    #[error("specified configuration not found")]
    ConfigurationNotFound,
    #[error("specified interface not found")]
    InterfaceNotFound,
    #[error("specified interface setting not found")]
    InterfaceSettingNotFound,
    #[error("required bulk endpoint missing: {direction}")]
    EndpointMissing { direction: &'static str },
    #[error("used incorrect endpoint")]
    IncorrectEndpoint,
    #[error("usb transfer failed or device disappeared: {0}")]
    TransportLost(String),
    #[error("malformed mtp protocol exchange: {0}")]
    ProtocolError(String),
    #[error("device returned mtp response code 0x{0:04X}")]
    MtpStatus(u16),
    #[error("operation timed out")]
    Timeout,
    #[error("failed to parse dataset or config data: {0}")]
    ParseError(String),
}

impl From<rusb::Error> for Error {
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::Timeout => Error::Timeout,
            other => Error::TransportLost(other.to_string()),
        }
    }
}
