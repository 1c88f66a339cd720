//! ## USB488
//!
//! The USB488 subclass: status byte polling, the TRIGGER message and the
//! extended capabilities layout.
//!

use std::ops::{Deref, DerefMut};

use crate::communication::transport::{RusbTransport, Transport};
use crate::communication::{bulk, control};
use crate::device::{Device, UsbtmcRequests};
use crate::error::{Error, Result};
use crate::header::TriggerOut;
use crate::init::{self, DeviceFilter};
use crate::types::{TmcProtocol, Usb488Capabilities};

use anyhow::Context as _;
use tracing::debug;

/// ### USB488 Requests
///
/// The USB488 control requests. READ_STATUS_BYTE is required, the remote /
/// local requests answer [`Error::NotSupported`] unless overridden.
///
pub trait Usb488Requests: UsbtmcRequests {
    fn read_status_byte(&mut self) -> Result<u8>;

    fn ren_control(&mut self, _enable: bool) -> Result<()> {
        Err(Error::NotSupported("REN_CONTROL"))
    }

    fn go_to_local(&mut self) -> Result<()> {
        Err(Error::NotSupported("GO_TO_LOCAL"))
    }

    fn local_lockout(&mut self) -> Result<()> {
        Err(Error::NotSupported("LOCAL_LOCKOUT"))
    }
}

/// ### USB488 Device
///
/// A [`Device`] on an interface speaking the USB488 protocol. Dereferences to
/// the underlying session for commands and queries.
///
#[derive(Debug)]
pub struct Usb488Device<T: Transport> {
    device: Device<T>,
}

impl Usb488Device<RusbTransport> {
    /// ### Open
    ///
    /// Connect to the first USB488 device accepted by `filter`.
    ///
    pub fn open(filter: impl DeviceFilter) -> anyhow::Result<Usb488Device<RusbTransport>> {
        let protocols = [TmcProtocol::Usb488];
        let context = rusb::Context::new().context("failed to create libusb context")?;
        let (device, handle) = init::open_device(&context, filter, &protocols)?;
        let transport = RusbTransport::open(&device, handle, &protocols)
            .context("failed to claim the USB488 interface")?;

        Ok(Usb488Device::new(transport))
    }
}

impl<T: Transport> Usb488Device<T> {
    pub fn new(transport: T) -> Usb488Device<T> {
        Usb488Device {
            device: Device::new(transport),
        }
    }

    /// ### Trigger
    ///
    /// Send the USB488 TRIGGER bulk message (the equivalent of `*TRG`).
    ///
    pub fn trigger(&mut self) -> Result<()> {
        self.device.check_idle()?;
        let btag = self.device.new_tag();
        let max_out_size = self.device.max_out_size();

        debug!("TRIGGER tag {}", btag);
        bulk::write(
            self.device.transport_mut(),
            &bulk::frame(&TriggerOut { btag }, &[]),
            max_out_size,
        )
    }

    pub fn into_inner(self) -> Device<T> {
        self.device
    }
}

impl<T: Transport> Deref for Usb488Device<T> {
    type Target = Device<T>;

    fn deref(&self) -> &Device<T> {
        &self.device
    }
}

impl<T: Transport> DerefMut for Usb488Device<T> {
    fn deref_mut(&mut self) -> &mut Device<T> {
        &mut self.device
    }
}

impl<T: Transport> UsbtmcRequests for Usb488Device<T> {
    type Capabilities = Usb488Capabilities;

    /// GET_CAPABILITIES, decoded with the USB488 layout.
    fn get_capabilities(&mut self) -> Result<Usb488Capabilities> {
        let buffer = control::get_capabilities(self.device.transport_mut())?;
        Usb488Capabilities::parse(&buffer)
    }
}

impl<T: Transport> Usb488Requests for Usb488Device<T> {
    fn read_status_byte(&mut self) -> Result<u8> {
        let btag = self.device.new_tag();
        let status_byte = control::read_status_byte(self.device.transport_mut(), btag)?;

        debug!("status byte {:#04x} (tag {})", status_byte, btag);
        Ok(status_byte)
    }
}
