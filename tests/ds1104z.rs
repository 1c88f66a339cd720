//! Tests for the DS1104Z chunking workaround and block reads

mod common;

use common::MockTransport;
use rigol_usbtmc::block::encode_block;
use rigol_usbtmc::header::{MessageHeader, RequestDevDepMsgIn};
use rigol_usbtmc::{Device, Ds1104z, Error, Framing};

fn requested_sizes(mock: &MockTransport) -> Vec<u32> {
    mock.written
        .iter()
        .filter(|w| w[0] == 2)
        .map(|w| RequestDevDepMsgIn::decode(w).unwrap().transfer_size)
        .collect()
}

#[test]
fn chunked_response_is_reassembled() {
    let mut mock = MockTransport::chunked(&[]);
    mock.output = (0..200u32).map(|i| i as u8).collect();
    let mut device = Device::new(mock);
    device.set_framing(Framing::FixedChunk {
        chunk_len: 64,
        read_len: 512,
    });

    let (header, data) = device.read_response(200).unwrap();

    assert_eq!(header.transfer_size, 200);
    assert_eq!(data, (0..200u32).map(|i| i as u8).collect::<Vec<u8>>());
    // 212 byte frame: 64 + 64 + 64 + 20
    assert_eq!(device.transport().reads, vec![512, 512, 512, 512]);
}

#[test]
fn chunk_sized_response_stops_at_declared_size() {
    // 12 + 52 bytes is exactly one chunk
    let mut mock = MockTransport::chunked(&[]);
    mock.output = vec![b'x'; 52];
    let mut device = Device::new(mock);
    device.set_framing(Framing::FixedChunk {
        chunk_len: 64,
        read_len: 512,
    });

    let (_, data) = device.read_response(52).unwrap();

    assert_eq!(data.len(), 52);
    assert_eq!(device.transport().reads.len(), 1);
}

#[test]
fn short_chunk_ends_the_transfer() {
    let mut device = Device::new(MockTransport::chunked(&[]));
    device.set_framing(Framing::FixedChunk {
        chunk_len: 64,
        read_len: 512,
    });
    device.request_response(100).unwrap();

    // header claims 100 bytes but the device stops after 20
    let mock = device.transport_mut();
    mock.bulk_in.clear();
    let mut packet = rigol_usbtmc::header::DevDepMsgIn {
        btag: 2,
        transfer_size: 100,
        transfer_attributes: 1,
    }
    .encode()
    .to_vec();
    packet.extend_from_slice(&[0u8; 20]);
    mock.bulk_in.push_back(packet);

    assert!(matches!(
        device.receive_response(),
        Err(Error::IncompleteResponse {
            declared: 100,
            received: 20
        })
    ));
    assert_eq!(device.transport().reads.len(), 1);
}

#[test]
fn block_is_read_in_three_stages() {
    let image: Vec<u8> = (0..300u32).map(|i| (i * 7) as u8).collect();
    let response = encode_block(&image);
    let mut scope = Ds1104z::new(MockTransport::chunked(&[&response]));

    let block = scope.read_disp_data().unwrap();

    assert_eq!(block.header, b"#3300".to_vec());
    assert_eq!(block.data, image);

    let mock = scope.transport();
    assert_eq!(&mock.written[0][12..23], b":DISP:DATA?");
    assert_eq!(requested_sizes(mock), vec![2, 3, 301]);
}

#[test]
fn small_block() {
    let mut scope = Ds1104z::new(MockTransport::chunked(&[b"#15hello\n"]));

    let block = scope.read_tmc_block(b":WAV:DATA?").unwrap();

    assert_eq!(block.header, b"#15".to_vec());
    assert_eq!(block.data, b"hello".to_vec());
}

#[test]
fn empty_block() {
    let mut scope = Ds1104z::new(MockTransport::chunked(&[b"#10\n"]));

    let block = scope.read_tmc_block(b":WAV:DATA?").unwrap();

    assert!(block.data.is_empty());
}

#[test]
fn block_without_marker_is_malformed() {
    let mut scope = Ds1104z::new(MockTransport::chunked(&[b"15hello\n"]));

    assert!(matches!(
        scope.read_tmc_block(b":WAV:DATA?"),
        Err(Error::MalformedBlockData(_))
    ));
}

#[test]
fn block_without_newline_is_malformed() {
    let mut scope = Ds1104z::new(MockTransport::chunked(&[b"#15hellox"]));

    assert!(matches!(
        scope.read_tmc_block(b":WAV:DATA?"),
        Err(Error::MalformedBlockData(_))
    ));
}

#[test]
fn block_shorter_than_declared_is_malformed() {
    let mut scope = Ds1104z::new(MockTransport::chunked(&[b"#18hello\n"]));

    assert!(matches!(
        scope.read_tmc_block(b":WAV:DATA?"),
        Err(Error::MalformedBlockData(_))
    ));
}

#[test]
fn block_with_non_decimal_length_is_malformed() {
    let mut scope = Ds1104z::new(MockTransport::chunked(&[b"#2x5hello\n"]));

    assert!(matches!(
        scope.read_tmc_block(b":WAV:DATA?"),
        Err(Error::MalformedBlockData(_))
    ));
}

#[test]
fn system_error_is_parsed() {
    let mut scope = Ds1104z::new(MockTransport::chunked(&[b"0,\"No error\"\n"]));

    assert_eq!(scope.system_error().unwrap(), (0, "No error".to_string()));
}

#[test]
fn commands_are_limited_to_64_bytes() {
    let mut mock = MockTransport::new();
    mock.max_out = 512;
    let mut scope = Ds1104z::new(mock);

    assert_eq!(scope.max_out_size(), 64);
    assert!(matches!(
        scope.send_command(&[b':'; 60]),
        Err(Error::PayloadTooLarge { max: 64, .. })
    ));
}

#[test]
fn tag_mismatch_aborts_a_block_read() {
    let mut mock = MockTransport::chunked(&[b"#15hello\n"]);
    mock.tag_override = Some(42);
    let mut scope = Ds1104z::new(mock);

    assert!(matches!(
        scope.read_tmc_block(b":WAV:DATA?"),
        Err(Error::TagMismatch { actual: 42, .. })
    ));
}
