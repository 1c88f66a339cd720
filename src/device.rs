//! ## Device
//!
//! A USBTMC session: tag bookkeeping, message framing and the command / query
//! sequencing on top of a [`Transport`].
//!

use crate::communication::transport::{RusbTransport, Transport};
use crate::communication::{bulk, control};
use crate::constants::misc::{DEFAULT_TRANSFER_SIZE, EOM};
use crate::error::{Error, Result};
use crate::header::{
    DevDepMsgIn, DevDepMsgOut, RequestDevDepMsgIn, RequestVendorSpecificIn, VendorSpecificIn,
    VendorSpecificOut,
};
use crate::init::{self, DeviceFilter};
use crate::types::{BTag, Capabilities, Framing, TmcProtocol};

use anyhow::Context as _;
use tracing::debug;

/// ### USBTMC Requests
///
/// The class specific control requests of USBTMC. Only GET_CAPABILITIES is
/// required; the others answer [`Error::NotSupported`] unless a device
/// overrides them.
///
pub trait UsbtmcRequests {
    /// The decoded GET_CAPABILITIES response
    type Capabilities;

    fn get_capabilities(&mut self) -> Result<Self::Capabilities>;

    fn initiate_abort_bulk_out(&mut self, _btag: u8) -> Result<()> {
        Err(Error::NotSupported("INITIATE_ABORT_BULK_OUT"))
    }

    fn check_abort_bulk_out_status(&mut self) -> Result<()> {
        Err(Error::NotSupported("CHECK_ABORT_BULK_OUT_STATUS"))
    }

    fn initiate_abort_bulk_in(&mut self, _btag: u8) -> Result<()> {
        Err(Error::NotSupported("INITIATE_ABORT_BULK_IN"))
    }

    fn check_abort_bulk_in_status(&mut self) -> Result<()> {
        Err(Error::NotSupported("CHECK_ABORT_BULK_IN_STATUS"))
    }

    fn initiate_clear(&mut self) -> Result<()> {
        Err(Error::NotSupported("INITIATE_CLEAR"))
    }

    fn check_clear_status(&mut self) -> Result<()> {
        Err(Error::NotSupported("CHECK_CLEAR_STATUS"))
    }

    fn indicator_pulse(&mut self) -> Result<()> {
        Err(Error::NotSupported("INDICATOR_PULSE"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    DeviceDependent,
    VendorSpecific,
}

/// The single request the device has been asked to answer.
#[derive(Debug, Clone, Copy)]
struct PendingRequest {
    btag: u8,
    transfer_size: u32,
    kind: RequestKind,
}

/// ### Device
///
/// A session with one USBTMC interface.
///
/// At most one request is outstanding at any time: every `request_*` call must
/// be followed by the matching `receive_*` call before the next request.
///
#[derive(Debug)]
pub struct Device<T: Transport> {
    transport: T,
    btag: BTag,
    max_out_size: usize,
    framing: Framing,
    pending: Option<PendingRequest>,
}

impl Device<RusbTransport> {
    /// ### Open
    ///
    /// Connect to a USB device and claim its USBTMC interface.
    ///
    /// Use `filter` argument to select instrument device:
    /// - `()` - first found USBTMC device
    /// - `DeviceId` - device by USB identifiers
    /// - `DeviceAddr` - device by USB bus and device number
    /// - `DeviceInfo` - device by both USB identifiers and address
    ///
    pub fn open(filter: impl DeviceFilter) -> anyhow::Result<Device<RusbTransport>> {
        let protocols = [TmcProtocol::Usbtmc, TmcProtocol::Usb488];
        // setup context
        let context = rusb::Context::new().context("failed to create libusb context")?;
        let (device, handle) = init::open_device(&context, filter, &protocols)?;
        let transport = RusbTransport::open(&device, handle, &protocols)
            .context("failed to claim the USBTMC interface")?;

        Ok(Device::new(transport))
    }
}

impl<T: Transport> Device<T> {
    pub fn new(transport: T) -> Device<T> {
        let max_out_size = transport.max_out_packet_size();

        Device {
            transport,
            btag: BTag::new(),
            max_out_size,
            framing: Framing::default(),
            pending: None,
        }
    }

    pub fn activate(&mut self) -> Result<()> {
        self.transport.activate()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Largest bulk out transfer, header and padding included
    pub fn max_out_size(&self) -> usize {
        self.max_out_size
    }

    pub fn set_max_out_size(&mut self, max_out_size: usize) {
        self.max_out_size = max_out_size;
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn set_framing(&mut self, framing: Framing) {
        self.framing = framing;
    }

    /// ### New Tag
    ///
    /// The next bTag, cycling through 2..=127.
    ///
    pub fn new_tag(&mut self) -> u8 {
        self.btag.next()
    }

    /// Fail with [`Error::RequestOutstanding`] while a response is still owed.
    pub(crate) fn check_idle(&self) -> Result<()> {
        match self.pending {
            Some(pending) => Err(Error::RequestOutstanding { tag: pending.btag }),
            None => Ok(()),
        }
    }

    fn take_pending(&mut self, kind: RequestKind) -> Result<PendingRequest> {
        match self.pending {
            Some(pending) if pending.kind == kind => {
                self.pending = None;
                Ok(pending)
            }
            _ => Err(Error::NoPendingRequest),
        }
    }

    /// ### Send Command
    ///
    /// Send `payload` as a single DEV_DEP_MSG_OUT with EOM set. Returns the tag
    /// the message was sent with.
    ///
    pub fn send_command(&mut self, payload: &[u8]) -> Result<u8> {
        self.check_idle()?;
        let btag = self.new_tag();
        let header = DevDepMsgOut {
            btag,
            transfer_size: payload.len() as u32,
            transfer_attributes: EOM,
        };

        debug!("DEV_DEP_MSG_OUT tag {} ({} bytes)", btag, payload.len());
        bulk::write(
            &mut self.transport,
            &bulk::frame(&header, payload),
            self.max_out_size,
        )?;

        Ok(btag)
    }

    /// ### Request Response
    ///
    /// Ask the device to prepare a response of at most `expected_size` bytes.
    /// Nothing is read here; see [`Device::receive_response`].
    ///
    pub fn request_response(&mut self, expected_size: u32) -> Result<u8> {
        self.check_idle()?;
        let btag = self.new_tag();
        let header = RequestDevDepMsgIn::new(btag, expected_size, None);

        debug!("REQUEST_DEV_DEP_MSG_IN tag {} ({} bytes)", btag, expected_size);
        bulk::write(
            &mut self.transport,
            &bulk::frame(&header, &[]),
            self.max_out_size,
        )?;

        self.pending = Some(PendingRequest {
            btag,
            transfer_size: expected_size,
            kind: RequestKind::DeviceDependent,
        });

        Ok(btag)
    }

    /// ### Receive Response
    ///
    /// Read the DEV_DEP_MSG_IN answering the outstanding request. The response
    /// must carry the request's tag and its payload is exactly the header's
    /// transferSize bytes long.
    ///
    pub fn receive_response(&mut self) -> Result<(DevDepMsgIn, Vec<u8>)> {
        let pending = self.take_pending(RequestKind::DeviceDependent)?;
        let (header, data) =
            bulk::read::<_, DevDepMsgIn>(&mut self.transport, pending.transfer_size, self.framing)?;

        debug!(
            "DEV_DEP_MSG_IN tag {} ({} bytes, eom {})",
            header.btag,
            data.len(),
            header.is_eom()
        );
        check_tag(pending.btag, header.btag)?;

        Ok((header, data))
    }

    /// ### Read Response
    ///
    /// Request up to `expected_size` bytes and read them back.
    ///
    pub fn read_response(&mut self, expected_size: u32) -> Result<(DevDepMsgIn, Vec<u8>)> {
        self.request_response(expected_size)?;
        self.receive_response()
    }

    /// ### Query Raw
    ///
    /// Send a command and get up to `expected_size` bytes of response.
    ///
    pub fn query_raw(&mut self, cmd: &[u8], expected_size: u32) -> Result<(DevDepMsgIn, Vec<u8>)> {
        self.send_command(cmd)?;
        self.read_response(expected_size)
    }

    /// ### Query With Size
    ///
    /// Send a command and get a response from the device.
    /// The response is a utf-8 string with the trailing whitespace removed.
    ///
    pub fn query_with_size(&mut self, cmd: &str, expected_size: u32) -> Result<String> {
        let (_, data) = self.query_raw(cmd.as_bytes(), expected_size)?;
        let resp = String::from_utf8(data)?;

        Ok(resp.trim_end().to_string())
    }

    /// ### Query
    ///
    /// [`Device::query_with_size`] with the default transfer size.
    ///
    pub fn query(&mut self, cmd: &str) -> Result<String> {
        self.query_with_size(cmd, DEFAULT_TRANSFER_SIZE)
    }

    /// ### Command
    ///
    /// Send a command to the device.
    ///
    pub fn command(&mut self, cmd: &str) -> Result<()> {
        self.send_command(cmd.as_bytes())?;
        Ok(())
    }

    /// ### Exec
    ///
    /// Run a command, querying it when it ends in `?`. Only queries produce a
    /// response.
    ///
    pub fn exec(&mut self, cmd: &str) -> Result<Option<String>> {
        if cmd.trim().ends_with('?') {
            self.query(cmd).map(Some)
        } else {
            self.command(cmd).map(|_| None)
        }
    }

    /// ### Send Vendor Specific
    ///
    /// Send `payload` as a VENDOR_SPECIFIC_OUT message.
    ///
    pub fn send_vendor_specific(&mut self, payload: &[u8]) -> Result<u8> {
        self.check_idle()?;
        let btag = self.new_tag();
        let header = VendorSpecificOut {
            btag,
            transfer_size: payload.len() as u32,
        };

        debug!("VENDOR_SPECIFIC_OUT tag {} ({} bytes)", btag, payload.len());
        bulk::write(
            &mut self.transport,
            &bulk::frame(&header, payload),
            self.max_out_size,
        )?;

        Ok(btag)
    }

    /// ### Request Vendor Specific
    ///
    /// Ask for a VENDOR_SPECIFIC_IN response of at most `expected_size` bytes.
    ///
    pub fn request_vendor_specific(&mut self, expected_size: u32) -> Result<u8> {
        self.check_idle()?;
        let btag = self.new_tag();
        let header = RequestVendorSpecificIn {
            btag,
            transfer_size: expected_size,
        };

        bulk::write(
            &mut self.transport,
            &bulk::frame(&header, &[]),
            self.max_out_size,
        )?;

        self.pending = Some(PendingRequest {
            btag,
            transfer_size: expected_size,
            kind: RequestKind::VendorSpecific,
        });

        Ok(btag)
    }

    /// ### Receive Vendor Specific
    ///
    /// Read the VENDOR_SPECIFIC_IN answering the outstanding vendor request.
    ///
    pub fn receive_vendor_specific(&mut self) -> Result<(VendorSpecificIn, Vec<u8>)> {
        let pending = self.take_pending(RequestKind::VendorSpecific)?;
        let (header, data) = bulk::read::<_, VendorSpecificIn>(
            &mut self.transport,
            pending.transfer_size,
            self.framing,
        )?;
        check_tag(pending.btag, header.btag)?;

        Ok((header, data))
    }
}

fn check_tag(expected: u8, actual: u8) -> Result<()> {
    if actual != expected {
        return Err(Error::TagMismatch { expected, actual });
    }
    Ok(())
}

impl<T: Transport> UsbtmcRequests for Device<T> {
    type Capabilities = Capabilities;

    /// GET_CAPABILITIES, decoded with the base USBTMC layout.
    fn get_capabilities(&mut self) -> Result<Capabilities> {
        let buffer = control::get_capabilities(&mut self.transport)?;
        Capabilities::parse(&buffer)
    }
}
