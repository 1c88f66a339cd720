//! ## Constants
//!
//! Various constants used throughout the project.
//!

pub mod usb {
    /// The class code for usbtmc ("Application-Specific")
    pub const USBTMC_CLASS_CODE: u8 = 0xFE;
    /// The subclass code for usbtmc
    pub const USBTMC_SUBCLASS_CODE: u8 = 0x03;
    /// The protocol code of a plain USBTMC interface
    pub const USBTMC_PROTOCOL_CODE: u8 = 0x00;
    /// The protocol code for the USB488 spec of usbtmc
    pub const USB488_PROTOCOL_CODE: u8 = 0x01;
}

pub mod misc {
    use std::time::Duration;

    /// The default timeout duration
    pub const DEFAULT_TIMEOUT_DURATION: Duration = Duration::from_secs(2);
    /// The size in bytes of a USBTMC header in a bulk transfer
    pub const USBTMC_HEADER_SIZE: usize = 12;
    /// The size in bytes of a GET_CAPABILITIES response
    pub const CAPABILITIES_SIZE: usize = 0x18;
    /// Transfer size asked for by a plain query
    pub const DEFAULT_TRANSFER_SIZE: u32 = 1024;
    /// First valid bTag
    pub const TAG_MIN: u8 = 2;
    /// Last valid bTag before wrapping back to `TAG_MIN`
    pub const TAG_MAX: u8 = 127;
    /// bmTransferAttributes bit marking the last transfer of a message
    pub const EOM: u8 = 0b0000_0001;
    /// bmTransferAttributes bit enabling TermChar on a REQUEST_DEV_DEP_MSG_IN
    pub const TERM_CHAR_ENABLED: u8 = 0b0000_0010;
}

#[allow(unused)]
pub mod usbtmc_status {
    /// Success
    pub const STATUS_SUCCESS: u8 = 0x01;
    /// The device has received a split transaction CHECK_STATUS request and the request is being processed
    pub const STATUS_PENDING: u8 = 0x02;
    /// Failure for unspecified or undefined reason
    pub const STATUS_FAILED: u8 = 0x80;
    /// The device received an INITIATE_ABORT request, but the request is not in progress
    pub const STATUS_TRANSFER_NOT_IN_PROGRESS: u8 = 0x81;
    /// The device got a CHECK_STATUS request without any INITIATE request being processed
    pub const STATUS_SPLIT_NOT_IN_PROGRESS: u8 = 0x82;
    /// The device got an INITIATE request, but another one is already being processed
    pub const STATUS_SPLIT_IN_PROGRESS: u8 = 0x83;

    pub fn name(status: u8) -> &'static str {
        match status {
            STATUS_SUCCESS => "STATUS_SUCCESS",
            STATUS_PENDING => "STATUS_PENDING",
            STATUS_FAILED => "STATUS_FAILED",
            STATUS_TRANSFER_NOT_IN_PROGRESS => "STATUS_TRANSFER_NOT_IN_PROGRESS",
            STATUS_SPLIT_NOT_IN_PROGRESS => "STATUS_SPLIT_NOT_IN_PROGRESS",
            STATUS_SPLIT_IN_PROGRESS => "STATUS_SPLIT_IN_PROGRESS",
            _ => "unknown status",
        }
    }
}

#[allow(unused)]
pub mod control_requests {
    /// bmRequestType of every class request used here (IN, class, interface)
    pub const CLASS_INTERFACE_IN: u8 = 0xA1;

    pub const INITIATE_ABORT_BULK_OUT: u8 = 1;
    pub const CHECK_ABORT_BULK_OUT_STATUS: u8 = 2;
    pub const INITIATE_ABORT_BULK_IN: u8 = 3;
    pub const CHECK_ABORT_BULK_IN_STATUS: u8 = 4;
    pub const INITIATE_CLEAR: u8 = 5;
    pub const CHECK_CLEAR_STATUS: u8 = 6;
    pub const GET_CAPABILITIES: u8 = 7;
    pub const INDICATOR_PULSE: u8 = 64;
    // USB488 subclass requests
    pub const READ_STATUS_BYTE: u8 = 128;
    pub const REN_CONTROL: u8 = 160;
    pub const GO_TO_LOCAL: u8 = 161;
    pub const LOCAL_LOCKOUT: u8 = 162;
}

#[allow(unused)]
pub mod bulk_msg_id {
    pub const DEVICE_DEPENDENT_MSG_OUT: u8 = 1;
    pub const REQUEST_DEVICE_DEPENDENT_MSG_IN: u8 = 2;
    pub const VENDOR_SPECIFIC_MSG_OUT: u8 = 126;
    pub const REQUEST_VENDOR_SPECIFIC_MSG_IN: u8 = 127;
    pub const DEVICE_DEPENDENT_MSG_IN: u8 = 2;
    pub const VENDOR_SPECIFIC_MSG_IN: u8 = 127;
    /// USB488 TRIGGER
    pub const TRIGGER: u8 = 128;
}

pub mod ds1104z {
    pub const VENDOR_ID: u16 = 0x1AB1;
    pub const PRODUCT_ID: u16 = 0x04CE;
    /// The scope chokes on bulk-out transfers larger than this
    pub const MAX_OUT_SIZE: usize = 64;
    /// Size of the chunks the scope splits every response into
    pub const CHUNK_SIZE: usize = 64;
    /// Read size used on the bulk-in endpoint; covers the 512 byte wMaxPacketSize
    /// the firmware switches to after the first command
    pub const READ_SIZE: usize = 512;
}
