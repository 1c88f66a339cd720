//! ## USBTMC Errors
//!
//! The errors used throughout the crate.
//!

use std::borrow::Borrow;

use crate::constants::usbtmc_status;

/// Result type of the protocol layers.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no USBTMC interface with a matching protocol found on the device")]
    NoMatchingInterface,
    #[error("more than one {0} endpoint on the USBTMC interface")]
    AmbiguousEndpoint(&'static str),
    #[error("{0} endpoint not found on the USBTMC interface")]
    MissingEndpoint(&'static str),
    #[error("device has no interrupt in endpoint")]
    NoInterruptEndpoint,
    #[error("message of {size} bytes exceeds the maximum bulk out size of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("response tag {actual} does not match request tag {expected}")]
    TagMismatch { expected: u8, actual: u8 },
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("response declared {declared} bytes but only {received} arrived")]
    IncompleteResponse { declared: usize, received: usize },
    #[error("malformed block data: {0}")]
    MalformedBlockData(String),
    #[error("GET_CAPABILITIES failed with status {:#04x} ({})", .status, status_name(.status))]
    Capabilities { status: u8 },
    #[error("READ_STATUS_BYTE failed with status {:#04x} ({})", .status, status_name(.status))]
    StatusByte { status: u8 },
    #[error("{0} is not supported by this device")]
    NotSupported(&'static str),
    #[error("no request is waiting for a response")]
    NoPendingRequest,
    #[error("request with tag {tag} has not been answered yet")]
    RequestOutstanding { tag: u8 },
    #[error("bulk out transfer sent {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("usb transfer timed out")]
    TransportTimeout,
    #[error("usb error: {0}")]
    Usb(rusb::Error),
    #[error("response is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<rusb::Error> for Error {
    fn from(error: rusb::Error) -> Self {
        match error {
            rusb::Error::Timeout => Error::TransportTimeout,
            other => Error::Usb(other),
        }
    }
}

fn status_name(status: impl Borrow<u8>) -> &'static str {
    usbtmc_status::name(*status.borrow())
}
