//! MTP transaction engine.
//!
//! A transaction is one Command container, at most one Data phase in
//! either direction, and one Response container, all sharing a
//! transaction id. The device may deliver the Data and Response packets
//! in either order once host-side buffering is involved, so completion
//! sorts the two by container type instead of by arrival.

use std::time::Duration;

use crate::consts::{op_name, COMMAND_TIMEOUT, DATA_TIMEOUT, MTP_PACKET_MAX_SIZE};
use crate::container::{self, Container, ContainerKind};
use crate::error::Error;
use crate::transport::BulkTransport;

/// Outcome of one completed transaction.
#[derive(Debug)]
pub struct CompletedTransaction {
    pub response_code: u16,
    pub response_params: Vec<u32>,
    pub data: Option<Vec<u8>>,
}

pub struct TransactionEngine<T> {
    transport: T,
    next_tx_id: u32,
}

impl<T: BulkTransport> TransactionEngine<T> {
    pub fn new(transport: T) -> TransactionEngine<T> {
        TransactionEngine {
            transport,
            next_tx_id: 0,
        }
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the engine and recover the transport.
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Run a transaction with no data phase.
    pub fn command(&mut self, op: u16, params: &[u32]) -> Result<CompletedTransaction, Error> {
        self.execute(op, params, None, false)
    }

    /// Run a transaction whose response carries a data phase.
    pub fn command_with_data_in(
        &mut self,
        op: u16,
        params: &[u32],
    ) -> Result<CompletedTransaction, Error> {
        self.execute(op, params, None, true)
    }

    /// Run a transaction that sends a data phase to the device.
    pub fn command_with_data_out(
        &mut self,
        op: u16,
        params: &[u32],
        payload: &[u8],
    ) -> Result<CompletedTransaction, Error> {
        self.execute(op, params, Some(payload), false)
    }

    fn execute(
        &mut self,
        op: u16,
        params: &[u32],
        data_out: Option<&[u8]>,
        expect_data_in: bool,
    ) -> Result<CompletedTransaction, Error> {
        let tx_id = self.issue(op, params)?;
        if let Some(payload) = data_out {
            self.send_data_phase(op, tx_id, payload)?;
        }

        let mut data: Option<Vec<u8>> = None;
        let response = loop {
            let timeout = if expect_data_in && data.is_none() {
                DATA_TIMEOUT
            } else {
                COMMAND_TIMEOUT
            };
            let raw = self.recv_packet(timeout)?;
            let packet = container::decode(&raw)?;
            self.check_tx_id(&packet, tx_id)?;
            match packet.kind {
                ContainerKind::Data if expect_data_in && data.is_none() => {
                    data = Some(self.read_data_phase(raw.len(), packet)?);
                }
                ContainerKind::Data => {
                    return Err(Error::Protocol(format!(
                        "stray data phase in {} transaction",
                        op_name(op)
                    )));
                }
                ContainerKind::Response => break packet,
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected {other:?} container in {} transaction",
                        op_name(op)
                    )));
                }
            }
        };

        // Reordered delivery: the response surfaced first and the data
        // phase is still on the wire.
        if expect_data_in && data.is_none() {
            let raw = self.recv_packet(DATA_TIMEOUT)?;
            let packet = container::decode(&raw)?;
            self.check_tx_id(&packet, tx_id)?;
            if packet.kind != ContainerKind::Data {
                return Err(Error::Protocol(format!(
                    "{} transaction completed without a data phase",
                    op_name(op)
                )));
            }
            data = Some(self.read_data_phase(raw.len(), packet)?);
        }

        let response_params = response.params()?;
        log::trace!(
            "{} tx {tx_id} -> {:#06X} {response_params:x?}",
            op_name(op),
            response.code
        );
        Ok(CompletedTransaction {
            response_code: response.code,
            response_params,
            data,
        })
    }

    /// Send the Command container under a fresh transaction id.
    pub(crate) fn issue(&mut self, op: u16, params: &[u32]) -> Result<u32, Error> {
        let tx_id = self.next_tx_id;
        self.next_tx_id = self.next_tx_id.wrapping_add(1);
        log::trace!("{} tx {tx_id} params {params:x?}", op_name(op));
        self.transport
            .send(&container::encode_command(op, tx_id, params))?;
        Ok(tx_id)
    }

    /// Send one logical data phase. The container is framed once and
    /// split into bulk writes: the first write carries the 12-byte
    /// header plus 500 payload bytes, later writes up to 512 bytes. A
    /// stream ending on an exact packet boundary is closed with a
    /// zero-length write.
    pub(crate) fn send_data_phase(
        &mut self,
        op: u16,
        tx_id: u32,
        payload: &[u8],
    ) -> Result<(), Error> {
        let frame = container::encode_data(op, tx_id, payload);
        for chunk in frame.chunks(MTP_PACKET_MAX_SIZE) {
            self.transport.send(chunk)?;
        }
        if frame.len() % MTP_PACKET_MAX_SIZE == 0 {
            self.transport.send(&[])?;
        }
        Ok(())
    }

    /// Aggregate a data phase that began with `first`. Reads continue
    /// while packets come in full; the phase ends when the declared
    /// length is reached or the device sends a short packet.
    fn read_data_phase(&mut self, first_raw_len: usize, first: Container) -> Result<Vec<u8>, Error> {
        let declared = first.declared_payload_len();
        let mut payload = first.payload;
        payload.reserve(declared.saturating_sub(payload.len()));
        let mut last_len = first_raw_len;

        while payload.len() < declared && last_len == MTP_PACKET_MAX_SIZE {
            let pkt = self.recv_packet(DATA_TIMEOUT)?;
            last_len = pkt.len();
            let take = pkt.len().min(declared - payload.len());
            payload.extend_from_slice(&pkt[..take]);
        }
        if payload.len() < declared {
            return Err(Error::Protocol(format!(
                "data phase ended after {} of {declared} bytes",
                payload.len()
            )));
        }
        // A stream that filled every packet is closed by a trailing
        // zero-length packet; consume it before the response is read.
        if last_len == MTP_PACKET_MAX_SIZE {
            let trailer = self.recv_packet(DATA_TIMEOUT)?;
            if !trailer.is_empty() {
                return Err(Error::Protocol(format!(
                    "expected end-of-transfer packet, got {} bytes",
                    trailer.len()
                )));
            }
        }
        Ok(payload)
    }

    /// Read one packet and require it to be the Response for `tx_id`.
    pub(crate) fn read_response(&mut self, tx_id: u32) -> Result<(u16, Vec<u32>), Error> {
        let raw = self.recv_packet(COMMAND_TIMEOUT)?;
        let packet = container::decode(&raw)?;
        self.check_tx_id(&packet, tx_id)?;
        if packet.kind != ContainerKind::Response {
            return Err(Error::Protocol(format!(
                "expected response container, got {:?}",
                packet.kind
            )));
        }
        Ok((packet.code, packet.params()?))
    }

    /// One raw bulk read.
    pub(crate) fn recv_packet(&mut self, timeout: Duration) -> Result<Vec<u8>, Error> {
        self.transport.recv(timeout)
    }

    fn check_tx_id(&self, packet: &Container, tx_id: u32) -> Result<(), Error> {
        if packet.tx_id != tx_id {
            return Err(Error::Protocol(format!(
                "transaction id {} in reply, expected {tx_id}",
                packet.tx_id
            )));
        }
        Ok(())
    }
}
