//! USB bulk transport.
//!
//! The recorders expose one interface with a bulk IN and a bulk OUT
//! endpoint. The trait seam exists so the transaction engine can run
//! against a scripted transport in tests.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};

use crate::consts::{MTP_PACKET_MAX_SIZE, RECORDER_VENDOR_ID};
use crate::error::Error;

/// The recorders drop bulk writes that arrive back to back; the stock
/// host tool paces them with a 10 ms gap.
const INTER_PACKET_GAP: Duration = Duration::from_millis(10);

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Half-duplex bulk pipe to one device.
pub trait BulkTransport {
    /// Write one buffer as a single bulk OUT transfer. No framing added.
    fn send(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Read one bulk IN transfer of up to 512 bytes. May legitimately
    /// return fewer bytes, or none at all.
    fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>, Error>;

    /// Release the device. Further calls will fail.
    fn close(&mut self);
}

/// rusb-backed transport.
pub struct UsbTransport {
    handle: DeviceHandle<Context>,
    iface: u8,
    ep_in: u8,
    ep_out: u8,
    released: bool,
}

impl UsbTransport {
    /// Open the device, select configuration 1, claim interface 0 and
    /// discover the bulk endpoint pair on its first alternate setting.
    pub fn open(device: &Device<Context>) -> Result<UsbTransport, Error> {
        let handle = device.open().map_err(Error::TransportLost)?;
        let _ = handle.set_auto_detach_kernel_driver(true);
        handle
            .set_active_configuration(1)
            .map_err(Error::TransportLost)?;
        handle.claim_interface(0).map_err(Error::TransportLost)?;

        let (ep_in, ep_out) = Self::bulk_endpoints(device)?;
        log::debug!(
            "opened recorder (bus {:03} dev {:03}) ep_in {ep_in:#04x} ep_out {ep_out:#04x}",
            device.bus_number(),
            device.address()
        );

        Ok(UsbTransport {
            handle,
            iface: 0,
            ep_in,
            ep_out,
            released: false,
        })
    }

    /// Lowest-numbered bulk endpoint of each direction on the first
    /// interface's first alternate. Interrupt endpoints are ignored.
    fn bulk_endpoints(device: &Device<Context>) -> Result<(u8, u8), Error> {
        let config = device
            .active_config_descriptor()
            .map_err(Error::TransportLost)?;
        let alt = config
            .interfaces()
            .next()
            .and_then(|i| i.descriptors().next())
            .ok_or(Error::EndpointMissing)?;

        let mut ep_in: Option<u8> = None;
        let mut ep_out: Option<u8> = None;
        for ep in alt.endpoint_descriptors() {
            if ep.transfer_type() != TransferType::Bulk {
                continue;
            }
            let slot = match ep.direction() {
                Direction::In => &mut ep_in,
                Direction::Out => &mut ep_out,
            };
            match slot {
                Some(existing) if *existing & 0x0F <= ep.number() => {}
                _ => *slot = Some(ep.address()),
            }
        }
        match (ep_in, ep_out) {
            (Some(i), Some(o)) => Ok((i, o)),
            _ => Err(Error::EndpointMissing),
        }
    }

    /// All recorder devices currently on the bus.
    pub fn scan(ctx: &Context) -> Result<Vec<Device<Context>>, Error> {
        let devices = ctx
            .devices()
            .map_err(Error::TransportLost)?
            .iter()
            .filter(|dev| {
                dev.device_descriptor()
                    .map(|d| d.vendor_id() == RECORDER_VENDOR_ID)
                    .unwrap_or(false)
            })
            .collect();
        Ok(devices)
    }
}

impl BulkTransport for UsbTransport {
    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        self.handle
            .write_bulk(self.ep_out, data, WRITE_TIMEOUT)
            .map_err(Error::TransportLost)?;
        thread::sleep(INTER_PACKET_GAP);
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Vec<u8>, Error> {
        let mut buf = [0u8; MTP_PACKET_MAX_SIZE];
        let n = self
            .handle
            .read_bulk(self.ep_in, &mut buf, timeout)
            .map_err(|e| match e {
                rusb::Error::Timeout => Error::Timeout,
                other => Error::TransportLost(other),
            })?;
        Ok(buf[..n].to_vec())
    }

    fn close(&mut self) {
        if !self.released {
            let _ = self.handle.release_interface(self.iface);
            self.released = true;
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Scripted transport for tests: replies are handed out one bulk read
/// at a time, writes are recorded.
#[derive(Default)]
pub struct MockTransport {
    replies: VecDeque<Result<Vec<u8>, Error>>,
    pub sent: Vec<Vec<u8>>,
    pub closed: bool,
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport::default()
    }

    /// Queue one bulk IN transfer.
    pub fn push_packet(&mut self, bytes: Vec<u8>) {
        self.replies.push_back(Ok(bytes));
    }

    /// Queue a framed container, split into bulk-sized transfers the way
    /// a device delivers it.
    pub fn push_framed(&mut self, frame: &[u8]) {
        for chunk in frame.chunks(MTP_PACKET_MAX_SIZE) {
            self.push_packet(chunk.to_vec());
        }
        if frame.len() % MTP_PACKET_MAX_SIZE == 0 {
            self.push_packet(Vec::new());
        }
    }

    /// Queue a read failure.
    pub fn push_error(&mut self, err: Error) {
        self.replies.push_back(Err(err));
    }
}

impl BulkTransport for MockTransport {
    fn send(&mut self, data: &[u8]) -> Result<(), Error> {
        self.sent.push(data.to_vec());
        Ok(())
    }

    fn recv(&mut self, _timeout: Duration) -> Result<Vec<u8>, Error> {
        self.replies.pop_front().unwrap_or(Err(Error::Timeout))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
