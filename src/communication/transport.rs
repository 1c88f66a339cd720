//! Transport
//!
//! The blocking USB primitives the protocol layers are written against, and
//! their implementation on top of libusb.
//!

use std::time::Duration;

use crate::constants::misc::DEFAULT_TIMEOUT_DURATION;
use crate::error::{Error, Result};
use crate::init::{self, InterfaceInfo};
use crate::types::{DeviceMode, TmcProtocol, UsbtmcEndpoints};

use rusb::{Context, Device, DeviceHandle};
use tracing::{debug, trace, warn};

/// ### Transport
///
/// A USBTMC interface with its endpoints already discovered. Every call blocks
/// until the transfer completes or the transport's own timeout expires, in
/// which case it fails with [`Error::TransportTimeout`].
///
pub trait Transport {
    /// Make sure the device is configured. An already configured device is fine.
    fn activate(&mut self) -> Result<()>;

    fn write_bulk_out(&mut self, data: &[u8]) -> Result<()>;

    /// Read at most `max_len` bytes from the bulk in endpoint.
    fn read_bulk_in(&mut self, max_len: usize) -> Result<Vec<u8>>;

    /// Read at most `max_len` bytes from the interrupt in endpoint.
    fn read_interrupt_in(&mut self, max_len: usize) -> Result<Vec<u8>>;

    /// Issue an IN control transfer and return the bytes the device sent.
    fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    ) -> Result<Vec<u8>>;

    fn interface_number(&self) -> u8;

    /// wMaxPacketSize of the bulk out endpoint
    fn max_out_packet_size(&self) -> usize;

    /// wMaxPacketSize of the bulk in endpoint
    fn max_in_packet_size(&self) -> usize;

    fn has_interrupt_in(&self) -> bool;
}

/// ### Rusb Transport
///
/// [`Transport`] over a claimed libusb interface. The interface is released
/// (and the kernel driver reattached) when the transport is dropped.
///
#[derive(Debug)]
pub struct RusbTransport {
    handle: DeviceHandle<Context>,
    mode: DeviceMode,
    endpoints: UsbtmcEndpoints,
    timeout: Duration,
}

impl RusbTransport {
    /// ### Open
    ///
    /// Find the USBTMC interface speaking one of `protocols`, detach the kernel
    /// driver if one is bound, configure the device and claim the interface.
    ///
    pub fn open(
        device: &Device<Context>,
        mut handle: DeviceHandle<Context>,
        protocols: &[TmcProtocol],
    ) -> Result<RusbTransport> {
        let interfaces: Vec<InterfaceInfo> = init::describe_interfaces(device)?;
        let (mut mode, endpoints) = init::find_usbtmc_interface(&interfaces, protocols)?;

        // detach kernel driver if it is used
        init::detach_kernel_driver(&mut mode, &mut handle)?;

        let mut transport = RusbTransport {
            handle,
            mode,
            endpoints,
            timeout: DEFAULT_TIMEOUT_DURATION,
        };

        // CONFIGURE DEVICE
        // ==========
        transport.activate()?;
        transport
            .handle
            .claim_interface(transport.mode.interface_number)?;
        transport
            .handle
            .set_alternate_setting(transport.mode.interface_number, transport.mode.setting_number)?;

        debug!(
            "claimed interface {} (configuration {}, setting {})",
            transport.mode.interface_number, transport.mode.config_number, transport.mode.setting_number
        );

        Ok(transport)
    }

    /// ### Set Timeout
    ///
    /// Set a new timeout for every transfer on this transport.
    ///
    pub fn set_timeout(&mut self, duration: Duration) {
        self.timeout = duration;
    }

    pub fn mode(&self) -> &DeviceMode {
        &self.mode
    }

    pub fn endpoints(&self) -> &UsbtmcEndpoints {
        &self.endpoints
    }
}

impl Transport for RusbTransport {
    fn activate(&mut self) -> Result<()> {
        if let Ok(active) = self.handle.active_configuration() {
            if active == self.mode.config_number {
                return Ok(());
            }
        }

        match self.handle.set_active_configuration(self.mode.config_number) {
            // the interface is in use; the configuration is already set
            Err(rusb::Error::Busy) => Ok(()),
            other => Ok(other?),
        }
    }

    fn write_bulk_out(&mut self, data: &[u8]) -> Result<()> {
        trace!("bulk out {:02x?}", data);
        let written =
            self.handle
                .write_bulk(self.endpoints.bulk_out_ep.address, data, self.timeout)?;
        check_written(written, data.len())
    }

    fn read_bulk_in(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0x00; max_len];
        let bytes_read =
            self.handle
                .read_bulk(self.endpoints.bulk_in_ep.address, &mut buffer, self.timeout)?;
        buffer.truncate(bytes_read);
        trace!("bulk in {:02x?}", buffer);
        Ok(buffer)
    }

    fn read_interrupt_in(&mut self, max_len: usize) -> Result<Vec<u8>> {
        let endpoint = self
            .endpoints
            .interrupt_ep
            .as_ref()
            .ok_or(Error::NoInterruptEndpoint)?;

        let mut buffer = vec![0x00; max_len];
        let bytes_read = self
            .handle
            .read_interrupt(endpoint.address, &mut buffer, self.timeout)?;
        buffer.truncate(bytes_read);
        trace!("interrupt in {:02x?}", buffer);
        Ok(buffer)
    }

    fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    ) -> Result<Vec<u8>> {
        let mut buffer = vec![0x00; length];
        let bytes_read = self.handle.read_control(
            request_type,
            request,
            value,
            index,
            &mut buffer,
            self.timeout,
        )?;
        buffer.truncate(bytes_read);
        trace!("control in {:#04x}/{} {:02x?}", request_type, request, buffer);
        Ok(buffer)
    }

    fn interface_number(&self) -> u8 {
        self.mode.interface_number
    }

    fn max_out_packet_size(&self) -> usize {
        self.endpoints.bulk_out_ep.max_packet_size as usize
    }

    fn max_in_packet_size(&self) -> usize {
        self.endpoints.bulk_in_ep.max_packet_size as usize
    }

    fn has_interrupt_in(&self) -> bool {
        self.endpoints.interrupt_ep.is_some()
    }
}

/// A bulk out transfer must carry the whole frame.
fn check_written(written: usize, expected: usize) -> Result<()> {
    if written != expected {
        warn!("bulk out wrote {} of {} bytes", written, expected);
        return Err(Error::ShortWrite { written, expected });
    }
    Ok(())
}

impl Drop for RusbTransport {
    fn drop(&mut self) {
        // RESET THE CONFIGURATION
        // Release the interface
        if let Err(e) = self.handle.release_interface(self.mode.interface_number) {
            warn!("failed to release usb interface: {}", e);
        }
        // Reattach the kernel driver if it was disconnected
        if self.mode.has_kernel_driver {
            if let Err(e) = self.handle.attach_kernel_driver(self.mode.interface_number) {
                warn!("failed to reattach kernel driver: {}", e);
            }
        }
    }
}
