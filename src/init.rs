//! ## Initialization
//!
//! A set of functions to find a USBTMC device and pick the interface and
//! endpoints to talk to it through.
//!

use crate::{
    constants::usb::*,
    error::{Error, Result},
    types::{DeviceAddr, DeviceId, DeviceInfo, DeviceMode, Endpoint, TmcProtocol, UsbtmcEndpoints},
};

use anyhow::Context as _;
use rusb::{Device, DeviceDescriptor, DeviceHandle, Direction, TransferType, UsbContext};
use tracing::debug;

/// Device filter
pub trait DeviceFilter {
    fn apply_filter<T: UsbContext>(&self, device: &Device<T>, device_desc: &DeviceDescriptor)
        -> bool;
}

/// Get first found TMC device
impl DeviceFilter for () {
    fn apply_filter<T: UsbContext>(&self, _device: &Device<T>, _desc: &DeviceDescriptor) -> bool {
        true
    }
}

/// Get TMC device by USB device address
impl DeviceFilter for DeviceAddr {
    fn apply_filter<T: UsbContext>(&self, device: &Device<T>, _desc: &DeviceDescriptor) -> bool {
        self.bus == device.bus_number() && self.device == device.address()
    }
}

/// Get TMC device by USB identifiers
impl DeviceFilter for DeviceId {
    fn apply_filter<T: UsbContext>(&self, _device: &Device<T>, desc: &DeviceDescriptor) -> bool {
        self.vendor_id == desc.vendor_id() && self.product_id == desc.product_id()
    }
}

/// Get TMC device by info (both USB identifiers and address)
impl DeviceFilter for DeviceInfo {
    fn apply_filter<T: UsbContext>(&self, device: &Device<T>, desc: &DeviceDescriptor) -> bool {
        self.id.apply_filter(device, desc) && self.address.apply_filter(device, desc)
    }
}

/// Allow apply filter by reference
impl<F: DeviceFilter> DeviceFilter for &F {
    fn apply_filter<T: UsbContext>(&self, device: &Device<T>, desc: &DeviceDescriptor) -> bool {
        (**self).apply_filter(device, desc)
    }
}

/// ### Interface Info
///
/// One alternate setting of one interface, flattened out of the libusb
/// descriptors.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceInfo {
    pub config_number: u8,
    pub interface_number: u8,
    pub setting_number: u8,
    pub class_code: u8,
    pub sub_class_code: u8,
    pub protocol_code: u8,
    pub endpoints: Vec<Endpoint>,
}

impl InterfaceInfo {
    fn is_usbtmc(&self, protocols: &[TmcProtocol]) -> bool {
        self.class_code == USBTMC_CLASS_CODE
            && self.sub_class_code == USBTMC_SUBCLASS_CODE
            && protocols.iter().any(|p| p.code() == self.protocol_code)
    }
}

/// ### Describe Interfaces
///
/// Walk every configuration of the device and list its interface settings.
///
pub fn describe_interfaces<T: UsbContext>(device: &Device<T>) -> Result<Vec<InterfaceInfo>> {
    let device_desc = device.device_descriptor()?;
    let mut interfaces = Vec::new();

    for n in 0..device_desc.num_configurations() {
        let config_desc = device.config_descriptor(n)?;
        for interface in config_desc.interfaces() {
            for interface_desc in interface.descriptors() {
                interfaces.push(InterfaceInfo {
                    config_number: config_desc.number(),
                    interface_number: interface_desc.interface_number(),
                    setting_number: interface_desc.setting_number(),
                    class_code: interface_desc.class_code(),
                    sub_class_code: interface_desc.sub_class_code(),
                    protocol_code: interface_desc.protocol_code(),
                    endpoints: interface_desc
                        .endpoint_descriptors()
                        .map(|endpoint| Endpoint {
                            address: endpoint.address(),
                            max_packet_size: endpoint.max_packet_size(),
                            transfer_type: endpoint.transfer_type(),
                            direction: endpoint.direction(),
                        })
                        .collect(),
                });
            }
        }
    }

    Ok(interfaces)
}

/// ### Find USBTMC Interface
///
/// Pick the first interface setting that is USBTMC with one of the allowed
/// protocols and sort out its endpoints.
///
pub fn find_usbtmc_interface(
    interfaces: &[InterfaceInfo],
    protocols: &[TmcProtocol],
) -> Result<(DeviceMode, UsbtmcEndpoints)> {
    let interface = interfaces
        .iter()
        .find(|i| i.is_usbtmc(protocols))
        .ok_or(Error::NoMatchingInterface)?;

    debug!(
        "usbtmc interface {} setting {} protocol {:#04x}",
        interface.interface_number, interface.setting_number, interface.protocol_code
    );

    let endpoints = classify_endpoints(&interface.endpoints)?;
    let mode = DeviceMode {
        config_number: interface.config_number,
        interface_number: interface.interface_number,
        setting_number: interface.setting_number,
        has_kernel_driver: false,
    };

    Ok((mode, endpoints))
}

/// ### Classify Endpoints
///
/// Split the endpoints of a USBTMC interface into bulk out, bulk in and the
/// optional interrupt in. Anything else is ignored.
///
pub fn classify_endpoints(endpoints: &[Endpoint]) -> Result<UsbtmcEndpoints> {
    let mut bulk_out_ep = None;
    let mut bulk_in_ep = None;
    let mut interrupt_ep = None;

    for endpoint in endpoints {
        let (slot, name) = match (endpoint.transfer_type, endpoint.direction) {
            (TransferType::Bulk, Direction::Out) => (&mut bulk_out_ep, "bulk out"),
            (TransferType::Bulk, Direction::In) => (&mut bulk_in_ep, "bulk in"),
            (TransferType::Interrupt, Direction::In) => (&mut interrupt_ep, "interrupt in"),
            _ => continue,
        };
        if slot.is_some() {
            return Err(Error::AmbiguousEndpoint(name));
        }
        *slot = Some(endpoint.clone());
    }

    Ok(UsbtmcEndpoints {
        bulk_out_ep: bulk_out_ep.ok_or(Error::MissingEndpoint("bulk out"))?,
        bulk_in_ep: bulk_in_ep.ok_or(Error::MissingEndpoint("bulk in"))?,
        interrupt_ep,
    })
}

fn is_tmc_device<T: UsbContext>(device: &Device<T>, protocols: &[TmcProtocol]) -> bool {
    describe_interfaces(device)
        .map(|interfaces| interfaces.iter().any(|i| i.is_usbtmc(protocols)))
        .unwrap_or(false)
}

fn device_info<T: UsbContext>(device: &Device<T>, device_desc: &DeviceDescriptor) -> DeviceInfo {
    DeviceInfo {
        id: DeviceId {
            vendor_id: device_desc.vendor_id(),
            product_id: device_desc.product_id(),
        },
        address: DeviceAddr {
            bus: device.bus_number(),
            device: device.address(),
        },
    }
}

/// ### List Devices
///
/// List all TMC devices using a libusb context.
///
pub fn list_devices<T: UsbContext>(
    context: &T,
    protocols: &[TmcProtocol],
) -> Result<Vec<DeviceInfo>> {
    Ok(context
        .devices()?
        .iter()
        .filter_map(|device| {
            let device_desc = device.device_descriptor().ok()?;
            is_tmc_device(&device, protocols).then(|| device_info(&device, &device_desc))
        })
        .collect())
}

/// ### Find Devices
///
/// Every attached device with the given identifiers, USBTMC or not. Zero,
/// one or many matches are all valid answers; the caller decides.
///
pub fn find_devices<T: UsbContext>(context: &T, id: DeviceId) -> Result<Vec<DeviceInfo>> {
    Ok(context
        .devices()?
        .iter()
        .filter_map(|device| {
            let device_desc = device.device_descriptor().ok()?;
            id.apply_filter(&device, &device_desc)
                .then(|| device_info(&device, &device_desc))
        })
        .collect())
}

/// ### Open Device
///
/// Open the first USBTMC device accepted by `filter`.
///
pub fn open_device<T: UsbContext>(
    context: &T,
    filter: impl DeviceFilter,
    protocols: &[TmcProtocol],
) -> anyhow::Result<(Device<T>, DeviceHandle<T>)> {
    let devices = context.devices().context("failed to list usb devices")?;

    for device in devices.iter() {
        if let Ok(device_desc) = device.device_descriptor() {
            if is_tmc_device(&device, protocols) && filter.apply_filter(&device, &device_desc) {
                let handle = device.open().with_context(|| {
                    format!(
                        "failed to open usb device {:04x}:{:04x}",
                        device_desc.vendor_id(),
                        device_desc.product_id()
                    )
                })?;
                return Ok((device, handle));
            }
        }
    }

    anyhow::bail!("no matching USBTMC device found")
}

/// ### Detach Kernel Driver
///
/// If the interface uses a kernel driver, detach it for the duration of the program.
///
pub fn detach_kernel_driver<T: UsbContext>(
    mode: &mut DeviceMode,
    handle: &mut DeviceHandle<T>,
) -> Result<()> {
    mode.has_kernel_driver = match handle.kernel_driver_active(mode.interface_number) {
        Ok(true) => {
            handle.detach_kernel_driver(mode.interface_number)?;
            true
        }
        _ => false,
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(address: u8, transfer_type: TransferType, direction: Direction) -> Endpoint {
        Endpoint {
            address,
            max_packet_size: 64,
            transfer_type,
            direction,
        }
    }

    fn interface(protocol_code: u8, endpoints: Vec<Endpoint>) -> InterfaceInfo {
        InterfaceInfo {
            config_number: 1,
            interface_number: 0,
            setting_number: 0,
            class_code: USBTMC_CLASS_CODE,
            sub_class_code: USBTMC_SUBCLASS_CODE,
            protocol_code,
            endpoints,
        }
    }

    fn usb488_endpoints() -> Vec<Endpoint> {
        vec![
            endpoint(0x01, TransferType::Bulk, Direction::Out),
            endpoint(0x82, TransferType::Bulk, Direction::In),
            endpoint(0x83, TransferType::Interrupt, Direction::In),
        ]
    }

    #[test]
    fn picks_the_usbtmc_interface() {
        let mut other = interface(0x00, vec![]);
        other.class_code = 0x08;
        other.interface_number = 1;
        let mut tmc = interface(USB488_PROTOCOL_CODE, usb488_endpoints());
        tmc.interface_number = 2;

        let (mode, endpoints) =
            find_usbtmc_interface(&[other, tmc], &[TmcProtocol::Usb488]).unwrap();

        assert_eq!(mode.interface_number, 2);
        assert_eq!(endpoints.bulk_out_ep.address, 0x01);
        assert_eq!(endpoints.bulk_in_ep.address, 0x82);
        assert_eq!(endpoints.interrupt_ep.map(|e| e.address), Some(0x83));
    }

    #[test]
    fn protocol_must_be_allowed() {
        let plain = interface(USBTMC_PROTOCOL_CODE, usb488_endpoints());

        let result = find_usbtmc_interface(&[plain.clone()], &[TmcProtocol::Usb488]);
        assert!(matches!(result, Err(Error::NoMatchingInterface)));

        let result =
            find_usbtmc_interface(&[plain], &[TmcProtocol::Usbtmc, TmcProtocol::Usb488]);
        assert!(result.is_ok());
    }

    #[test]
    fn second_bulk_in_is_ambiguous() {
        let mut endpoints = usb488_endpoints();
        endpoints.push(endpoint(0x84, TransferType::Bulk, Direction::In));

        assert!(matches!(
            classify_endpoints(&endpoints),
            Err(Error::AmbiguousEndpoint("bulk in"))
        ));
    }

    #[test]
    fn missing_bulk_out_is_reported() {
        let endpoints = vec![endpoint(0x82, TransferType::Bulk, Direction::In)];

        assert!(matches!(
            classify_endpoints(&endpoints),
            Err(Error::MissingEndpoint("bulk out"))
        ));
    }

    #[test]
    fn interrupt_endpoint_is_optional() {
        let endpoints = vec![
            endpoint(0x01, TransferType::Bulk, Direction::Out),
            endpoint(0x82, TransferType::Bulk, Direction::In),
            endpoint(0x03, TransferType::Interrupt, Direction::Out),
        ];

        let endpoints = classify_endpoints(&endpoints).unwrap();
        assert!(endpoints.interrupt_ep.is_none());
    }
}
