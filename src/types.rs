//! ## Types
//!
//! The different types used across the crate
//!

use crate::constants::misc::{CAPABILITIES_SIZE, TAG_MAX, TAG_MIN};
use crate::error::{Error, Result};

use rusb::{Direction, TransferType};

/// ### bTag
///
/// The bTag element used to identify a bulk request.
///
/// Each time a value is taken, the counter is incremented. Values stay in
/// `2..=127` and wrap from 127 back to 2.
///
#[derive(Debug)]
pub struct BTag(u8);

impl BTag {
    /// ### New
    ///
    /// Return a fresh bTag set at the value 2.
    ///
    pub fn new() -> BTag {
        BTag(TAG_MIN)
    }

    /// ### Next
    ///
    /// Return the current bTag value and advance the counter.
    ///
    pub fn next(&mut self) -> u8 {
        let btag = self.0;

        self.0 = if btag >= TAG_MAX { TAG_MIN } else { btag + 1 };

        btag
    }
}

impl Default for BTag {
    fn default() -> Self {
        BTag::new()
    }
}

/// USB identifiers of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Location of a device on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddr {
    pub bus: u8,
    pub device: u8,
}

/// Both the identifiers and the location of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub address: DeviceAddr,
}

/// ### TMC Protocol
///
/// The `bInterfaceProtocol` values a USBTMC interface can advertise.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmcProtocol {
    /// Plain USBTMC
    Usbtmc,
    /// USBTMC with the USB488 subclass
    Usb488,
}

impl TmcProtocol {
    pub fn code(self) -> u8 {
        use crate::constants::usb::{USB488_PROTOCOL_CODE, USBTMC_PROTOCOL_CODE};

        match self {
            TmcProtocol::Usbtmc => USBTMC_PROTOCOL_CODE,
            TmcProtocol::Usb488 => USB488_PROTOCOL_CODE,
        }
    }
}

/// ### Device Mode
///
/// A collection of the configuration, interface and interface number. Also if the interface has a kernel driver attached.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceMode {
    /// The USB configuration number
    pub config_number: u8,
    /// The interface number specific to the configuration
    pub interface_number: u8,
    /// The setting number specific to the interface
    pub setting_number: u8,
    /// If the device has a kernel driver. Important for returning control to the OS (on Linux).
    pub has_kernel_driver: bool,
}

/// ### Endpoint
///
/// Properties of an endpoint.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Address of the endpoint on the interface
    pub address: u8,
    /// The maximal size a packet can have on this endpoint
    pub max_packet_size: u16,
    /// The transfer type of the endpoint (for USBTMC, Bulk or Interrupt)
    pub transfer_type: TransferType,
    /// The direction of the endpoint (for USBTMC, In or Out)
    pub direction: Direction,
}

/// ### USBTMC Endpoints
///
/// Endpoints specific to the USBTMC spec.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsbtmcEndpoints {
    /// The mandatory BULK OUT endpoint
    pub bulk_out_ep: Endpoint,
    /// The mandatory BULK IN endpoint
    pub bulk_in_ep: Endpoint,
    /// The optional INTERRUPT IN endpoint
    pub interrupt_ep: Option<Endpoint>,
}

/// ### Framing
///
/// How the end of a DEV_DEP_MSG_IN transfer is recognised on the bulk in endpoint.
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Framing {
    /// Conforming devices: the transfer ends with a short packet.
    #[default]
    ShortPacket,
    /// Devices that split every response into `chunk_len` sized packets whatever
    /// their wMaxPacketSize says. Each read asks for `read_len` bytes and a packet
    /// of exactly `chunk_len` bytes means more is coming.
    FixedChunk { chunk_len: usize, read_len: usize },
}

/// ### Capabilities
///
/// The collected capabilities of a USBTMC device.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub bcd_version: u16,
    /// Can accept a control command for pulse
    pub accepts_indicator_pulse_request: bool,
    /// Only sends data to the controller
    pub is_talk_only: bool,
    /// Only accepts data from the controller
    pub is_listen_only: bool,
    /// When returning data, it has a terminator character in the data
    pub supports_bulk_in_term_char: bool,
}

impl Capabilities {
    /// Decode the base layout of a GET_CAPABILITIES response. The status byte is
    /// checked by the caller.
    pub fn parse(buffer: &[u8]) -> Result<Capabilities> {
        check_capabilities_len(buffer)?;

        let interface_capabilities = buffer[4];
        let device_capabilities = buffer[5];

        Ok(Capabilities {
            bcd_version: u16::from_le_bytes([buffer[2], buffer[3]]),
            accepts_indicator_pulse_request: interface_capabilities & 0b0000_0100 != 0,
            is_talk_only: interface_capabilities & 0b0000_0010 != 0,
            is_listen_only: interface_capabilities & 0b0000_0001 != 0,
            supports_bulk_in_term_char: device_capabilities & 0b0000_0001 != 0,
        })
    }
}

/// ### USB488 Capabilities
///
/// Capabilities of a USB488 device, decoded from the extended layout.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Usb488Capabilities {
    pub usbtmc: Capabilities,
    pub bcd_usb488: u16,
    /// The interface is a USB488.2 interface
    pub is_488_2: bool,
    /// Accepts REN_CONTROL, GO_TO_LOCAL and LOCAL_LOCKOUT
    pub accepts_remote_local: bool,
    /// Accepts the TRIGGER bulk message
    pub accepts_trigger: bool,
    /// Understands all mandatory SCPI commands
    pub is_scpi: bool,
    /// SR1 capable (service requests through the interrupt endpoint)
    pub is_sr1: bool,
    /// RL1 capable (full remote/local)
    pub is_rl1: bool,
    /// DT1 capable (device trigger)
    pub is_dt1: bool,
}

impl Usb488Capabilities {
    pub fn parse(buffer: &[u8]) -> Result<Usb488Capabilities> {
        let usbtmc = Capabilities::parse(buffer)?;

        let interface_capabilities = buffer[14];
        let device_capabilities = buffer[15];

        Ok(Usb488Capabilities {
            usbtmc,
            bcd_usb488: u16::from_le_bytes([buffer[12], buffer[13]]),
            is_488_2: interface_capabilities & 0b0000_0100 != 0,
            accepts_remote_local: interface_capabilities & 0b0000_0010 != 0,
            accepts_trigger: interface_capabilities & 0b0000_0001 != 0,
            is_scpi: device_capabilities & 0b0000_1000 != 0,
            is_sr1: device_capabilities & 0b0000_0100 != 0,
            is_rl1: device_capabilities & 0b0000_0010 != 0,
            is_dt1: device_capabilities & 0b0000_0001 != 0,
        })
    }
}

fn check_capabilities_len(buffer: &[u8]) -> Result<()> {
    if buffer.len() < CAPABILITIES_SIZE {
        return Err(Error::MalformedHeader(format!(
            "capabilities response is {} bytes, expected {}",
            buffer.len(),
            CAPABILITIES_SIZE
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn btag_starts_at_two_and_wraps_after_127() {
        let mut btag = BTag::new();
        let tags: Vec<u8> = (0..252).map(|_| btag.next()).collect();

        assert_eq!(tags[0], 2);
        assert_eq!(tags[125], 127);
        assert_eq!(tags[126], 2);
        assert!(tags.iter().all(|t| (2..=127).contains(t)));
    }

    #[test]
    fn parse_base_capabilities() {
        let mut buffer = [0u8; 24];
        buffer[0] = 0x01;
        buffer[2] = 0x00;
        buffer[3] = 0x01;
        buffer[4] = 0b0000_0101;
        buffer[5] = 0b0000_0001;

        let caps = Capabilities::parse(&buffer).unwrap();
        assert_eq!(caps.bcd_version, 0x0100);
        assert!(caps.accepts_indicator_pulse_request);
        assert!(!caps.is_talk_only);
        assert!(caps.is_listen_only);
        assert!(caps.supports_bulk_in_term_char);
    }

    #[test]
    fn parse_usb488_capabilities() {
        let mut buffer = [0u8; 24];
        buffer[0] = 0x01;
        buffer[12] = 0x00;
        buffer[13] = 0x01;
        buffer[14] = 0b0000_0110;
        buffer[15] = 0b0000_1111;

        let caps = Usb488Capabilities::parse(&buffer).unwrap();
        assert_eq!(caps.bcd_usb488, 0x0100);
        assert!(caps.is_488_2);
        assert!(caps.accepts_remote_local);
        assert!(!caps.accepts_trigger);
        assert!(caps.is_scpi && caps.is_sr1 && caps.is_rl1 && caps.is_dt1);
    }

    #[test]
    fn short_packet_framing_is_the_default() {
        assert_eq!(Framing::default(), Framing::ShortPacket);
    }

    #[test]
    fn short_capabilities_buffer_is_rejected() {
        assert!(matches!(
            Capabilities::parse(&[0x01; 6]),
            Err(Error::MalformedHeader(_))
        ));
    }
}
