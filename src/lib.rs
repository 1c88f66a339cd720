//! # Rigol USBTMC
//!
//! Pure Rust implementation of the USBTMC protocol and its USB488 subclass, with
//! the workarounds needed to talk to a Rigol DS1104Z oscilloscope.
//!
//! The crate implements writing DEVICE_DEPENDENT messages to the BULK OUT
//! endpoint, reading them back from the BULK IN endpoint, the GET_CAPABILITIES
//! and READ_STATUS_BYTE control requests, the USB488 TRIGGER message and
//! IEEE-488.2 block data decoding.
//!
//! ## Usage
//!
//! To use, add the following line to your project's Cargo.toml dependencies:
//! ```toml
//! rigol-usbtmc = "0.1"
//! ```
//!
//! ## Example
//!
//! The example below demonstrates how to connect to, send commands to and query the device.
//!
//! ```no_run
//! use rigol_usbtmc::{Device, DeviceId};
//!
//! fn main() -> anyhow::Result<()> {
//!     // connect to the device
//!     let mut device = Device::open(DeviceId { vendor_id: 0x1AB1, product_id: 0x04CE })?;
//!
//!     // send a command to the device
//!     device.command(":RUN")?;
//!
//!     // query the device and get a string
//!     let idn: String = device.query("*IDN?")?;
//!
//!     // let the trailing '?' decide
//!     let answer: Option<String> = device.exec(":TIM:SCAL?")?;
//!     Ok(())
//! }
//! ```
//!
//! Block data from the scope goes through [`Ds1104z`]:
//!
//! ```no_run
//! use rigol_usbtmc::Ds1104z;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut scope = Ds1104z::open_one()?;
//!     let screenshot = scope.read_disp_data()?;
//!     std::fs::write("screen.bmp", screenshot.data)?;
//!     Ok(())
//! }
//! ```
//!
//! Everything above the USB transfers is written against the [`Transport`]
//! trait, so a session can be driven by anything that moves bytes.
//!

mod constants;
mod error;
mod init;
mod types;
mod communication {
    pub mod bulk;
    pub mod control;
    pub mod transport;
}

pub mod block;
pub mod device;
pub mod ds1104z;
pub mod header;
pub mod usb488;

pub use block::Block;
pub use communication::transport::{RusbTransport, Transport};
pub use device::{Device, UsbtmcRequests};
pub use ds1104z::Ds1104z;
pub use error::{Error, Result};
pub use init::{
    classify_endpoints, find_devices, find_usbtmc_interface, list_devices, DeviceFilter,
    InterfaceInfo,
};
pub use types::{
    BTag, Capabilities, DeviceAddr, DeviceId, DeviceInfo, DeviceMode, Endpoint, Framing,
    TmcProtocol, Usb488Capabilities, UsbtmcEndpoints,
};
pub use usb488::{Usb488Device, Usb488Requests};

/// USBTMC status codes returned by the class requests
pub mod status {
    pub use crate::constants::usbtmc_status::*;
}
