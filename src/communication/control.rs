//! ## Control
//!
//! Set of control requests to send to the device.
//!

use crate::communication::transport::Transport;
use crate::constants::control_requests::{
    CLASS_INTERFACE_IN, GET_CAPABILITIES, READ_STATUS_BYTE,
};
use crate::constants::misc::CAPABILITIES_SIZE;
use crate::constants::usbtmc_status;
use crate::error::{Error, Result};

use tracing::{debug, warn};

/// Bit set in the first byte of every READ_STATUS_BYTE interrupt notification
const STATUS_NOTIFICATION: u8 = 0x80;

/// ### Get Capabilities
///
/// Issue GET_CAPABILITIES and return the 24 byte response once its status has
/// been checked.
///
pub fn get_capabilities<T: Transport + ?Sized>(transport: &mut T) -> Result<Vec<u8>> {
    let w_index = u16::from(transport.interface_number());

    // execute the request
    let buffer = transport.control_in(
        CLASS_INTERFACE_IN,
        GET_CAPABILITIES,
        0x0000,
        w_index,
        CAPABILITIES_SIZE,
    )?;

    // verify the status
    match buffer.first() {
        Some(&usbtmc_status::STATUS_SUCCESS) => {}
        Some(&status) => return Err(Error::Capabilities { status }),
        None => {
            return Err(Error::MalformedHeader(
                "empty GET_CAPABILITIES response".to_string(),
            ))
        }
    }

    debug!("capabilities {:02x?}", buffer);

    Ok(buffer)
}

/// ### Read Status Byte
///
/// Read the USB488 status byte. The control transfer carries the status byte
/// itself unless the device has an interrupt endpoint, in which case the value
/// arrives there as a `(0x80 | bTag, status byte)` notification.
///
/// #### Arguments
/// - `transport` -> the USBTMC interface
/// - `btag` -> the tag identifying this request, 2..=127
///
pub fn read_status_byte<T: Transport + ?Sized>(transport: &mut T, btag: u8) -> Result<u8> {
    let w_index = u16::from(transport.interface_number());

    // send/read the request
    let buffer = transport.control_in(
        CLASS_INTERFACE_IN,
        READ_STATUS_BYTE,
        u16::from(btag),
        w_index,
        3,
    )?;
    if buffer.len() < 3 {
        return Err(Error::MalformedHeader(format!(
            "READ_STATUS_BYTE response is {} bytes, expected 3",
            buffer.len()
        )));
    }

    // check that it is successful
    if buffer[0] != usbtmc_status::STATUS_SUCCESS {
        return Err(Error::StatusByte { status: buffer[0] });
    }
    if buffer[1] != btag {
        return Err(Error::TagMismatch {
            expected: btag,
            actual: buffer[1],
        });
    }

    if !transport.has_interrupt_in() {
        return Ok(buffer[2]);
    }

    if buffer[2] != 0 {
        warn!("READ_STATUS_BYTE returned {:#04x} where 0 was expected", buffer[2]);
    }

    let notification = transport.read_interrupt_in(2)?;
    if notification.len() != 2 || notification[0] & STATUS_NOTIFICATION == 0 {
        return Err(Error::MalformedHeader(format!(
            "bad status byte notification {:02x?}",
            notification
        )));
    }
    let notified_tag = notification[0] & !STATUS_NOTIFICATION;
    if notified_tag != btag {
        return Err(Error::TagMismatch {
            expected: btag,
            actual: notified_tag,
        });
    }

    Ok(notification[1])
}
