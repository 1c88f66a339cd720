//! A scripted USBTMC device for the integration tests.
//!
//! The mock answers DEV_DEP_MSG_OUT queries (text ending in `?`) by loading the
//! next queued response into its output buffer, and answers each
//! REQUEST_DEV_DEP_MSG_IN by sending up to the requested number of bytes from
//! that buffer behind a DEV_DEP_MSG_IN header echoing the request's tag.

#![allow(dead_code)]

use std::collections::VecDeque;

use rigol_usbtmc::header::{DevDepMsgIn, MessageHeader, RequestDevDepMsgIn};
use rigol_usbtmc::{Error, Result, Transport};

pub struct MockTransport {
    /// Every bulk out transfer, in order
    pub written: Vec<Vec<u8>>,
    /// max_len of every bulk in read, in order
    pub reads: Vec<usize>,
    /// Responses loaded into the output buffer, one per query
    pub responses: VecDeque<Vec<u8>>,
    /// Bytes the device still has to send
    pub output: Vec<u8>,
    /// Packets waiting on the bulk in endpoint
    pub bulk_in: VecDeque<Vec<u8>>,
    /// Split every response into packets of this size, whatever the read size
    pub chunk: Option<usize>,
    /// Answer with this tag instead of the request's
    pub tag_override: Option<u8>,
    pub control: VecDeque<Vec<u8>>,
    pub control_requests: Vec<(u8, u8, u16, u16, usize)>,
    pub interrupt_in: VecDeque<Vec<u8>>,
    pub interrupt: bool,
    pub max_out: usize,
    pub max_in: usize,
    pub activations: usize,
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport {
            written: Vec::new(),
            reads: Vec::new(),
            responses: VecDeque::new(),
            output: Vec::new(),
            bulk_in: VecDeque::new(),
            chunk: None,
            tag_override: None,
            control: VecDeque::new(),
            control_requests: Vec::new(),
            interrupt_in: VecDeque::new(),
            interrupt: false,
            max_out: 512,
            max_in: 512,
            activations: 0,
        }
    }

    /// A device answering its queries with `responses`, in order.
    pub fn with_responses(responses: &[&[u8]]) -> MockTransport {
        let mut mock = MockTransport::new();
        mock.responses = responses.iter().map(|r| r.to_vec()).collect();
        mock
    }

    /// A device that sends everything in 64 byte chunks.
    pub fn chunked(responses: &[&[u8]]) -> MockTransport {
        let mut mock = MockTransport::with_responses(responses);
        mock.chunk = Some(64);
        mock.max_in = 64;
        mock.max_out = 64;
        mock
    }

    fn answer_request(&mut self, request: RequestDevDepMsgIn) {
        let size = (request.transfer_size as usize).min(self.output.len());
        let payload: Vec<u8> = self.output.drain(..size).collect();
        let header = DevDepMsgIn {
            btag: self.tag_override.unwrap_or(request.btag),
            transfer_size: payload.len() as u32,
            transfer_attributes: if self.output.is_empty() { 0x01 } else { 0x00 },
        };

        let mut frame = header.encode().to_vec();
        frame.extend_from_slice(&payload);
        while frame.len() % 4 != 0 {
            frame.push(0x00);
        }

        match self.chunk {
            Some(chunk) => self
                .bulk_in
                .extend(frame.chunks(chunk).map(|c| c.to_vec())),
            None => self.bulk_in.push_back(frame),
        }
    }
}

impl Transport for MockTransport {
    fn activate(&mut self) -> Result<()> {
        self.activations += 1;
        Ok(())
    }

    fn write_bulk_out(&mut self, data: &[u8]) -> Result<()> {
        self.written.push(data.to_vec());

        match data[0] {
            1 => {
                let size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
                let command = &data[12..12 + size];
                let last = command.iter().rev().find(|b| !b.is_ascii_whitespace());
                if last == Some(&b'?') {
                    if let Some(response) = self.responses.pop_front() {
                        self.output.extend(response);
                    }
                }
            }
            2 => {
                let request = RequestDevDepMsgIn::decode(data)?;
                self.answer_request(request);
            }
            _ => {}
        }

        Ok(())
    }

    fn read_bulk_in(&mut self, max_len: usize) -> Result<Vec<u8>> {
        self.reads.push(max_len);

        let mut packet = self.bulk_in.pop_front().ok_or(Error::TransportTimeout)?;
        if packet.len() > max_len {
            let rest = packet.split_off(max_len);
            self.bulk_in.push_front(rest);
        }
        Ok(packet)
    }

    fn read_interrupt_in(&mut self, _max_len: usize) -> Result<Vec<u8>> {
        if !self.interrupt {
            return Err(Error::NoInterruptEndpoint);
        }
        self.interrupt_in.pop_front().ok_or(Error::TransportTimeout)
    }

    fn control_in(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        length: usize,
    ) -> Result<Vec<u8>> {
        self.control_requests
            .push((request_type, request, value, index, length));
        self.control.pop_front().ok_or(Error::TransportTimeout)
    }

    fn interface_number(&self) -> u8 {
        0
    }

    fn max_out_packet_size(&self) -> usize {
        self.max_out
    }

    fn max_in_packet_size(&self) -> usize {
        self.max_in
    }

    fn has_interrupt_in(&self) -> bool {
        self.interrupt
    }
}
