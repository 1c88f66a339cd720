//! ## Headers
//!
//! Encoding and decoding of the 12 byte headers that start every USBTMC bulk
//! message. All multi-byte fields are little-endian.
//!
//! ```text
//! 0       1      2             3         4..8          8..12
//! MsgID   bTag   bTagInverse   reserved  transferSize  message specific
//! ```
//!

use crate::constants::bulk_msg_id;
use crate::constants::misc::{EOM, TERM_CHAR_ENABLED, USBTMC_HEADER_SIZE};
use crate::error::{Error, Result};

/// A fixed layout bulk header.
pub trait MessageHeader: Sized {
    /// The MsgID every header of this kind carries
    const MSG_ID: u8;

    fn encode(&self) -> [u8; USBTMC_HEADER_SIZE];

    fn decode(buffer: &[u8]) -> Result<Self>;
}

/// A header the device sends in front of a response.
pub trait InboundHeader: MessageHeader {
    fn btag(&self) -> u8;

    /// Number of payload bytes following the header, padding excluded
    fn transfer_size(&self) -> u32;
}

/// Number of zero bytes needed after a header and `payload_len` bytes to land on
/// a 4 byte boundary.
pub fn padding(payload_len: usize) -> usize {
    (4 - (USBTMC_HEADER_SIZE + payload_len) % 4) % 4
}

fn prefix(msg_id: u8, btag: u8) -> [u8; USBTMC_HEADER_SIZE] {
    let mut header = [0x00; USBTMC_HEADER_SIZE];
    header[0] = msg_id;
    header[1] = btag;
    header[2] = !btag;
    header
}

fn with_transfer_size(
    mut header: [u8; USBTMC_HEADER_SIZE],
    transfer_size: u32,
) -> [u8; USBTMC_HEADER_SIZE] {
    header[4..8].copy_from_slice(&transfer_size.to_le_bytes());
    header
}

fn check_len(buffer: &[u8]) -> Result<&[u8; USBTMC_HEADER_SIZE]> {
    buffer
        .get(..USBTMC_HEADER_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| {
            Error::MalformedHeader(format!(
                "got {} bytes, a header is {} bytes",
                buffer.len(),
                USBTMC_HEADER_SIZE
            ))
        })
}

/// Validate the length, MsgID and bTagInverse of a typed header and return it
/// with its bTag.
fn check_typed(buffer: &[u8], msg_id: u8) -> Result<(&[u8; USBTMC_HEADER_SIZE], u8)> {
    let header = check_len(buffer)?;

    if header[0] != msg_id {
        return Err(Error::MalformedHeader(format!(
            "MsgID {} where {} was expected",
            header[0], msg_id
        )));
    }
    if header[2] != !header[1] {
        return Err(Error::MalformedHeader(format!(
            "bTagInverse {:#04x} does not match bTag {:#04x}",
            header[2], header[1]
        )));
    }

    Ok((header, header[1]))
}

fn transfer_size(header: &[u8; USBTMC_HEADER_SIZE]) -> u32 {
    u32::from_le_bytes([header[4], header[5], header[6], header[7]])
}

/// Generic bulk out header, any MsgID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOutHeader {
    pub msg_id: u8,
    pub btag: u8,
    pub btag_inverse: u8,
    pub data: [u8; 8],
}

/// Generic bulk in header, any MsgID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkInHeader {
    pub msg_id: u8,
    pub btag: u8,
    pub btag_inverse: u8,
    pub response: [u8; 8],
}

macro_rules! raw_header {
    ($name:ident, $field:ident) => {
        impl $name {
            pub fn encode(&self) -> [u8; USBTMC_HEADER_SIZE] {
                let mut header = [0x00; USBTMC_HEADER_SIZE];
                header[0] = self.msg_id;
                header[1] = self.btag;
                header[2] = self.btag_inverse;
                header[4..].copy_from_slice(&self.$field);
                header
            }

            pub fn decode(buffer: &[u8]) -> Result<Self> {
                let header = check_len(buffer)?;
                let mut $field = [0x00; 8];
                $field.copy_from_slice(&header[4..]);

                Ok($name {
                    msg_id: header[0],
                    btag: header[1],
                    btag_inverse: header[2],
                    $field,
                })
            }
        }
    };
}

raw_header!(BulkOutHeader, data);
raw_header!(BulkInHeader, response);

/// DEV_DEP_MSG_OUT: a device dependent command from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevDepMsgOut {
    pub btag: u8,
    pub transfer_size: u32,
    pub transfer_attributes: u8,
}

impl DevDepMsgOut {
    pub fn is_eom(&self) -> bool {
        self.transfer_attributes & EOM != 0
    }
}

impl MessageHeader for DevDepMsgOut {
    const MSG_ID: u8 = bulk_msg_id::DEVICE_DEPENDENT_MSG_OUT;

    fn encode(&self) -> [u8; USBTMC_HEADER_SIZE] {
        let mut header = with_transfer_size(prefix(Self::MSG_ID, self.btag), self.transfer_size);
        header[8] = self.transfer_attributes;
        header
    }

    fn decode(buffer: &[u8]) -> Result<Self> {
        let (header, btag) = check_typed(buffer, Self::MSG_ID)?;
        Ok(DevDepMsgOut {
            btag,
            transfer_size: transfer_size(header),
            transfer_attributes: header[8],
        })
    }
}

/// REQUEST_DEV_DEP_MSG_IN: asks the device to send up to `transfer_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestDevDepMsgIn {
    pub btag: u8,
    pub transfer_size: u32,
    pub transfer_attributes: u8,
    pub term_char: u8,
}

impl RequestDevDepMsgIn {
    pub fn new(btag: u8, transfer_size: u32, term_char: Option<u8>) -> Self {
        match term_char {
            Some(tc) => RequestDevDepMsgIn {
                btag,
                transfer_size,
                transfer_attributes: TERM_CHAR_ENABLED,
                term_char: tc,
            },
            None => RequestDevDepMsgIn {
                btag,
                transfer_size,
                transfer_attributes: 0,
                term_char: 0,
            },
        }
    }
}

impl MessageHeader for RequestDevDepMsgIn {
    const MSG_ID: u8 = bulk_msg_id::REQUEST_DEVICE_DEPENDENT_MSG_IN;

    fn encode(&self) -> [u8; USBTMC_HEADER_SIZE] {
        let mut header = with_transfer_size(prefix(Self::MSG_ID, self.btag), self.transfer_size);
        header[8] = self.transfer_attributes;
        header[9] = self.term_char;
        header
    }

    fn decode(buffer: &[u8]) -> Result<Self> {
        let (header, btag) = check_typed(buffer, Self::MSG_ID)?;
        Ok(RequestDevDepMsgIn {
            btag,
            transfer_size: transfer_size(header),
            transfer_attributes: header[8],
            term_char: header[9],
        })
    }
}

/// DEV_DEP_MSG_IN: the header in front of a device response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DevDepMsgIn {
    pub btag: u8,
    pub transfer_size: u32,
    pub transfer_attributes: u8,
}

impl DevDepMsgIn {
    pub fn is_eom(&self) -> bool {
        self.transfer_attributes & EOM != 0
    }
}

impl MessageHeader for DevDepMsgIn {
    const MSG_ID: u8 = bulk_msg_id::DEVICE_DEPENDENT_MSG_IN;

    fn encode(&self) -> [u8; USBTMC_HEADER_SIZE] {
        let mut header = with_transfer_size(prefix(Self::MSG_ID, self.btag), self.transfer_size);
        header[8] = self.transfer_attributes;
        header
    }

    fn decode(buffer: &[u8]) -> Result<Self> {
        let (header, btag) = check_typed(buffer, Self::MSG_ID)?;
        Ok(DevDepMsgIn {
            btag,
            transfer_size: transfer_size(header),
            transfer_attributes: header[8],
        })
    }
}

macro_rules! sized_header {
    ($(#[$doc:meta])* $name:ident, $msg_id:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub btag: u8,
            pub transfer_size: u32,
        }

        impl MessageHeader for $name {
            const MSG_ID: u8 = $msg_id;

            fn encode(&self) -> [u8; USBTMC_HEADER_SIZE] {
                with_transfer_size(prefix(Self::MSG_ID, self.btag), self.transfer_size)
            }

            fn decode(buffer: &[u8]) -> Result<Self> {
                let (header, btag) = check_typed(buffer, Self::MSG_ID)?;
                Ok($name {
                    btag,
                    transfer_size: transfer_size(header),
                })
            }
        }
    };
}

sized_header!(
    /// VENDOR_SPECIFIC_OUT
    VendorSpecificOut,
    bulk_msg_id::VENDOR_SPECIFIC_MSG_OUT
);
sized_header!(
    /// REQUEST_VENDOR_SPECIFIC_IN
    RequestVendorSpecificIn,
    bulk_msg_id::REQUEST_VENDOR_SPECIFIC_MSG_IN
);
sized_header!(
    /// VENDOR_SPECIFIC_IN
    VendorSpecificIn,
    bulk_msg_id::VENDOR_SPECIFIC_MSG_IN
);

/// USB488 TRIGGER: a bare header, everything after the tag is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerOut {
    pub btag: u8,
}

impl MessageHeader for TriggerOut {
    const MSG_ID: u8 = bulk_msg_id::TRIGGER;

    fn encode(&self) -> [u8; USBTMC_HEADER_SIZE] {
        prefix(Self::MSG_ID, self.btag)
    }

    fn decode(buffer: &[u8]) -> Result<Self> {
        let (_, btag) = check_typed(buffer, Self::MSG_ID)?;
        Ok(TriggerOut { btag })
    }
}

impl InboundHeader for DevDepMsgIn {
    fn btag(&self) -> u8 {
        self.btag
    }

    fn transfer_size(&self) -> u32 {
        self.transfer_size
    }
}

impl InboundHeader for VendorSpecificIn {
    fn btag(&self) -> u8 {
        self.btag
    }

    fn transfer_size(&self) -> u32 {
        self.transfer_size
    }
}
