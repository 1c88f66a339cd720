//! ## DS1104Z
//!
//! Rigol DS1104Z support. The scope is a USB488 device with two firmware bugs
//! this module works around:
//!
//! - responses always arrive in 64 byte chunks, even though the bulk in
//!   endpoint advertises a wMaxPacketSize of 64 that changes to 512 after the
//!   first command;
//! - a block query answered in one go is unreliable, so blocks are read in
//!   three requests (prefix, length, payload).
//!

use std::ops::{Deref, DerefMut};

use crate::block::{self, Block};
use crate::communication::transport::{RusbTransport, Transport};
use crate::constants::ds1104z::{CHUNK_SIZE, MAX_OUT_SIZE, READ_SIZE};
use crate::error::{Error, Result};
use crate::init;
use crate::types::{DeviceId, DeviceInfo, Framing, TmcProtocol};
use crate::usb488::Usb488Device;

pub use crate::constants::ds1104z::{PRODUCT_ID, VENDOR_ID};

use anyhow::Context as _;
use tracing::debug;

/// ### DS1104Z
///
/// A DS1104Z session. Dereferences to the [`Usb488Device`] underneath.
///
#[derive(Debug)]
pub struct Ds1104z<T: Transport> {
    device: Usb488Device<T>,
}

impl Ds1104z<RusbTransport> {
    /// ### Find USB Devices
    ///
    /// Every attached DS1104Z.
    ///
    pub fn find_usb_devs(context: &rusb::Context) -> Result<Vec<DeviceInfo>> {
        init::find_devices(
            context,
            DeviceId {
                vendor_id: VENDOR_ID,
                product_id: PRODUCT_ID,
            },
        )
    }

    /// ### Open One
    ///
    /// Open the only DS1104Z attached. Fails when there is none or more than
    /// one.
    ///
    pub fn open_one() -> anyhow::Result<Ds1104z<RusbTransport>> {
        let context = rusb::Context::new().context("failed to create libusb context")?;
        let devices = Self::find_usb_devs(&context)?;

        let info = match devices.as_slice() {
            [info] => *info,
            [] => anyhow::bail!("no matching devices"),
            many => anyhow::bail!(
                "multiple matching devices: {}",
                many.iter()
                    .map(|d| format!("{:03}-{:03}", d.address.bus, d.address.device))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        };

        let protocols = [TmcProtocol::Usb488];
        let (device, handle) = init::open_device(&context, info, &protocols)?;
        let transport = RusbTransport::open(&device, handle, &protocols)
            .context("failed to claim the DS1104Z interface")?;

        Ok(Ds1104z::new(transport))
    }
}

impl<T: Transport> Ds1104z<T> {
    pub fn new(transport: T) -> Ds1104z<T> {
        let mut device = Usb488Device::new(transport);
        device.set_max_out_size(MAX_OUT_SIZE);
        // Larger reads than the chunk size in case the firmware ever gets fixed.
        device.set_framing(Framing::FixedChunk {
            chunk_len: CHUNK_SIZE,
            read_len: READ_SIZE,
        });

        Ds1104z { device }
    }

    /// ### Read TMC Block
    ///
    /// Send a query answered with block data and read the block back.
    ///
    pub fn read_tmc_block(&mut self, cmd: &[u8]) -> Result<Block> {
        let digits = self.probe_block_marker(cmd)?;
        let (length_field, count) = self.read_block_length(digits)?;
        let data = self.read_block_payload(count)?;

        let mut header = format!("#{}", digits).into_bytes();
        header.extend_from_slice(&length_field);

        Ok(Block { header, data })
    }

    /// Step 1: query and read only `#<digits>`.
    fn probe_block_marker(&mut self, cmd: &[u8]) -> Result<usize> {
        let (_, prefix) = self.device.query_raw(cmd, 2)?;
        check_stage_len("block prefix", &prefix, 2)?;

        let digits = block::parse_digit_count(&prefix)?;
        debug!("block length field is {} digits", digits);
        Ok(digits)
    }

    /// Step 2: read the `digits` wide length field.
    fn read_block_length(&mut self, digits: usize) -> Result<(Vec<u8>, usize)> {
        let (_, field) = self.device.read_response(digits as u32)?;
        check_stage_len("block length", &field, digits)?;

        let count = block::parse_length(&field)?;
        debug!("block payload is {} bytes", count);
        Ok((field, count))
    }

    /// Step 3: read the payload and its terminating newline.
    fn read_block_payload(&mut self, count: usize) -> Result<Vec<u8>> {
        let too_large = || Error::MalformedBlockData(format!("block of {} bytes is too large", count));
        let transfer_size = count
            .checked_add(1)
            .and_then(|len| u32::try_from(len).ok())
            .ok_or_else(too_large)?;

        let (header, payload) = self.device.read_response(transfer_size)?;
        check_stage_len("block payload", &payload, transfer_size as usize)?;
        if !header.is_eom() {
            return Err(Error::MalformedBlockData(
                "block payload does not end the message".to_string(),
            ));
        }

        block::strip_terminator(payload, count)
    }

    /// ### Read Display Data
    ///
    /// Screenshot of the display, as the image block `:DISP:DATA?` returns.
    ///
    pub fn read_disp_data(&mut self) -> Result<Block> {
        self.read_tmc_block(b":DISP:DATA?")
    }

    /// ### System Error
    ///
    /// Pop the oldest entry of the error queue as `(code, message)`.
    ///
    pub fn system_error(&mut self) -> Result<(i32, String)> {
        let resp = self.device.query(":SYST:ERR?")?;
        parse_error_entry(&resp)
    }

    pub fn into_inner(self) -> Usb488Device<T> {
        self.device
    }
}

fn check_stage_len(stage: &str, data: &[u8], expected: usize) -> Result<()> {
    if data.len() != expected {
        return Err(Error::MalformedBlockData(format!(
            "{}: asked for {} bytes, received {}",
            stage,
            expected,
            data.len()
        )));
    }
    Ok(())
}

/// Parse an error queue entry such as `-113,"Undefined header"`.
fn parse_error_entry(entry: &str) -> Result<(i32, String)> {
    let bad_entry = || Error::MalformedResponse(format!("bad error queue entry {:?}", entry));

    let (code, message) = entry.trim().split_once(',').ok_or_else(bad_entry)?;
    let code = code.trim().parse::<i32>().map_err(|_| bad_entry())?;
    let message = message.trim().trim_matches('"').to_string();

    Ok((code, message))
}

impl<T: Transport> Deref for Ds1104z<T> {
    type Target = Usb488Device<T>;

    fn deref(&self) -> &Usb488Device<T> {
        &self.device
    }
}

impl<T: Transport> DerefMut for Ds1104z<T> {
    fn deref_mut(&mut self) -> &mut Usb488Device<T> {
        &mut self.device
    }
}
