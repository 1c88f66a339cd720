//! Tests for the USB488 extension

mod common;

use common::MockTransport;
use rigol_usbtmc::header::{MessageHeader, TriggerOut};
use rigol_usbtmc::{Error, Usb488Device, Usb488Requests, UsbtmcRequests};

fn usb488_with_interrupt() -> MockTransport {
    let mut mock = MockTransport::new();
    mock.interrupt = true;
    mock
}

#[test]
fn status_byte_from_control_transfer() {
    let mut mock = MockTransport::new();
    mock.control.push_back(vec![0x01, 2, 0x42]);
    let mut device = Usb488Device::new(mock);

    assert_eq!(device.read_status_byte().unwrap(), 0x42);
    assert_eq!(
        device.transport().control_requests,
        vec![(0xA1, 128, 2, 0, 3)]
    );
}

#[test]
fn status_byte_from_interrupt_notification() {
    let mut mock = usb488_with_interrupt();
    mock.control.push_back(vec![0x01, 2, 0x00]);
    mock.interrupt_in.push_back(vec![0x82, 0x10]);
    let mut device = Usb488Device::new(mock);

    assert_eq!(device.read_status_byte().unwrap(), 0x10);
}

#[test]
fn status_byte_uses_fresh_tags() {
    let mut mock = MockTransport::new();
    mock.control.push_back(vec![0x01, 2, 0x00]);
    mock.control.push_back(vec![0x01, 3, 0x40]);
    let mut device = Usb488Device::new(mock);

    device.read_status_byte().unwrap();
    assert_eq!(device.read_status_byte().unwrap(), 0x40);
    assert_eq!(device.transport().control_requests[1].2, 3);
}

#[test]
fn failed_status_byte_carries_the_status() {
    let mut mock = MockTransport::new();
    mock.control.push_back(vec![0x80, 2, 0x00]);
    let mut device = Usb488Device::new(mock);

    assert!(matches!(
        device.read_status_byte(),
        Err(Error::StatusByte { status: 0x80 })
    ));
}

#[test]
fn control_transfer_must_echo_the_tag() {
    let mut mock = MockTransport::new();
    mock.control.push_back(vec![0x01, 9, 0x42]);
    let mut device = Usb488Device::new(mock);

    assert!(matches!(
        device.read_status_byte(),
        Err(Error::TagMismatch {
            expected: 2,
            actual: 9
        })
    ));
}

#[test]
fn notification_must_echo_the_tag() {
    let mut mock = usb488_with_interrupt();
    mock.control.push_back(vec![0x01, 2, 0x00]);
    mock.interrupt_in.push_back(vec![0x85, 0x10]);
    let mut device = Usb488Device::new(mock);

    assert!(matches!(
        device.read_status_byte(),
        Err(Error::TagMismatch {
            expected: 2,
            actual: 5
        })
    ));
}

#[test]
fn notification_without_high_bit_is_malformed() {
    let mut mock = usb488_with_interrupt();
    mock.control.push_back(vec![0x01, 2, 0x00]);
    mock.interrupt_in.push_back(vec![0x02, 0x10]);
    let mut device = Usb488Device::new(mock);

    assert!(matches!(
        device.read_status_byte(),
        Err(Error::MalformedHeader(_))
    ));
}

#[test]
fn usb488_capabilities_layout() {
    let mut response = vec![0u8; 24];
    response[0] = 0x01;
    response[3] = 0x01;
    response[12] = 0x00;
    response[13] = 0x01;
    response[14] = 0b0000_0111;
    response[15] = 0b0000_1000;
    let mut mock = MockTransport::new();
    mock.control.push_back(response);
    let mut device = Usb488Device::new(mock);

    let caps = device.get_capabilities().unwrap();

    assert_eq!(caps.usbtmc.bcd_version, 0x0100);
    assert_eq!(caps.bcd_usb488, 0x0100);
    assert!(caps.is_488_2 && caps.accepts_remote_local && caps.accepts_trigger);
    assert!(caps.is_scpi);
    assert!(!caps.is_sr1);
}

#[test]
fn trigger_is_a_bare_header() {
    let mut device = Usb488Device::new(MockTransport::new());

    device.trigger().unwrap();

    let written = &device.transport().written;
    assert_eq!(written[0].len(), 12);
    assert_eq!(TriggerOut::decode(&written[0]).unwrap(), TriggerOut { btag: 2 });
}

#[test]
fn remote_local_requests_are_not_supported() {
    let mut device = Usb488Device::new(MockTransport::new());

    assert!(matches!(
        device.ren_control(true),
        Err(Error::NotSupported("REN_CONTROL"))
    ));
    assert!(matches!(device.go_to_local(), Err(Error::NotSupported(_))));
    assert!(matches!(device.local_lockout(), Err(Error::NotSupported(_))));
}

#[test]
fn base_session_is_reachable() {
    let mock = MockTransport::with_responses(&[b"0\n"]);
    let mut device = Usb488Device::new(mock);

    assert_eq!(device.query("*OPC?").unwrap(), "0");
}

#[test]
fn trigger_waits_for_the_outstanding_response() {
    let mut device = Usb488Device::new(MockTransport::new());
    device.request_response(10).unwrap();

    assert!(matches!(
        device.trigger(),
        Err(Error::RequestOutstanding { tag: 2 })
    ));
    assert_eq!(device.transport().written.len(), 1);
}
