//! Bulk
//!
//! Low level functions to write framed messages to the BULK OUT endpoint and
//! to reassemble responses from the BULK IN endpoint.
//!

use crate::communication::transport::Transport;
use crate::constants::misc::USBTMC_HEADER_SIZE;
use crate::error::{Error, Result};
use crate::header::{padding, InboundHeader, MessageHeader};
use crate::types::Framing;

use tracing::trace;

/// ### Frame
///
/// Concatenate a header and its payload, zero padded to a 4 byte boundary.
///
pub fn frame<H: MessageHeader>(header: &H, payload: &[u8]) -> Vec<u8> {
    let pad = padding(payload.len());

    let mut data = Vec::with_capacity(USBTMC_HEADER_SIZE + payload.len() + pad);
    data.extend_from_slice(&header.encode());
    data.extend_from_slice(payload);
    data.resize(data.len() + pad, 0x00);
    data
}

/// ### Write
///
/// Write one framed message to the BULK OUT endpoint. The whole message has to
/// fit in a single transfer of at most `max_out_size` bytes.
///
pub fn write<T: Transport + ?Sized>(transport: &mut T, data: &[u8], max_out_size: usize) -> Result<()> {
    if data.len() > max_out_size {
        return Err(Error::PayloadTooLarge {
            size: data.len(),
            max: max_out_size,
        });
    }

    transport.write_bulk_out(data)
}

fn round_up(len: usize, packet_size: usize) -> usize {
    len.div_ceil(packet_size) * packet_size
}

/// ### Read
///
/// Read a response to a request for `expected_size` bytes: decode the header in
/// front of the first packet, then keep reading until the declared
/// transferSize is reached or `framing` says the device is done. The returned
/// payload is exactly transferSize bytes.
///
pub fn read<T: Transport + ?Sized, H: InboundHeader>(
    transport: &mut T,
    expected_size: u32,
    framing: Framing,
) -> Result<(H, Vec<u8>)> {
    let max_packet_size = transport.max_in_packet_size().max(1);

    // size of the next read
    let next_read_len = |remaining: usize| match framing {
        Framing::ShortPacket => round_up(remaining, max_packet_size),
        Framing::FixedChunk { read_len, .. } => read_len,
    };
    // whether a packet of `len` bytes, read with a buffer of `requested` bytes,
    // leaves the transfer open
    let more_follows = |len: usize, requested: usize| match framing {
        Framing::ShortPacket => len > 0 && len == requested,
        Framing::FixedChunk { chunk_len, .. } => len == chunk_len,
    };

    // READ THE HEADER
    // ==========
    let mut requested = next_read_len(USBTMC_HEADER_SIZE + expected_size as usize);
    let packet = transport.read_bulk_in(requested)?;
    let header = H::decode(&packet)?;
    let declared = header.transfer_size() as usize;

    let mut last_len = packet.len();
    let mut data = packet[USBTMC_HEADER_SIZE..].to_vec();

    // READING LOOP
    // ==========
    while data.len() < declared && more_follows(last_len, requested) {
        requested = next_read_len(declared - data.len());
        let packet = transport.read_bulk_in(requested)?;
        trace!("continuation packet of {} bytes", packet.len());

        last_len = packet.len();
        data.extend_from_slice(&packet);
    }

    if data.len() < declared {
        return Err(Error::IncompleteResponse {
            declared,
            received: data.len(),
        });
    }

    // drop the alignment bytes and anything past the declared size
    data.truncate(declared);

    Ok((header, data))
}
