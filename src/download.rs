//! Streaming download of recordings.
//!
//! Recordings run to hundreds of megabytes, far beyond what should sit
//! in memory. The data phase is read packet by packet and flushed to a
//! durable chunk sink in fixed windows, so peak memory stays bounded by
//! one window regardless of object size.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::SystemTime;

use crate::consts::{
    CHUNK_WINDOW_PACKETS, DATA_TIMEOUT, MTP_PACKET_MAX_SIZE, OP_GET_OBJECT, RSP_OK,
};
use crate::container::{self, ContainerKind};
use crate::error::Error;
use crate::session::MtpSession;
use crate::transport::BulkTransport;

/// Durable append target for downloaded chunks. Indices are assigned
/// from zero and increase by one per flush; the final chunk may be
/// short.
pub trait ChunkSink {
    fn append(&mut self, serial: &str, chunk_index: u32, bytes: &[u8]) -> std::io::Result<()>;
}

/// Sink writing `<root>/<serial>/<index>.bin` files.
pub struct DirectoryChunkSink {
    root: PathBuf,
}

impl DirectoryChunkSink {
    pub fn new(root: PathBuf) -> DirectoryChunkSink {
        DirectoryChunkSink { root }
    }
}

impl ChunkSink for DirectoryChunkSink {
    fn append(&mut self, serial: &str, chunk_index: u32, bytes: &[u8]) -> std::io::Result<()> {
        let dir = self.root.join(serial);
        fs::create_dir_all(&dir)?;
        let mut file = fs::File::create(dir.join(format!("{chunk_index:06}.bin")))?;
        file.write_all(bytes)?;
        file.sync_all()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    Started,
    Running,
    Finished,
    Failed,
}

/// Progress snapshot published to observers while a transfer runs.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    pub bytes_transferred: u64,
    pub bytes_total: u64,
    pub percent: u8,
    pub phase: TransferPhase,
    pub started_at: SystemTime,
    pub finished_at: Option<SystemTime>,
}

pub trait ProgressObserver {
    fn update(&mut self, progress: &TransferProgress);
}

impl<F: FnMut(&TransferProgress)> ProgressObserver for F {
    fn update(&mut self, progress: &TransferProgress) {
        self(progress)
    }
}

struct ProgressTracker<'a> {
    observer: &'a mut dyn ProgressObserver,
    snapshot: TransferProgress,
}

impl<'a> ProgressTracker<'a> {
    fn start(observer: &'a mut dyn ProgressObserver) -> ProgressTracker<'a> {
        let snapshot = TransferProgress {
            bytes_transferred: 0,
            bytes_total: 0,
            percent: 0,
            phase: TransferPhase::Started,
            started_at: SystemTime::now(),
            finished_at: None,
        };
        observer.update(&snapshot);
        ProgressTracker { observer, snapshot }
    }

    fn running(&mut self, bytes_transferred: u64, bytes_total: u64, percent: u8) {
        self.snapshot.bytes_transferred = bytes_transferred;
        self.snapshot.bytes_total = bytes_total;
        self.snapshot.percent = percent.min(100);
        self.snapshot.phase = TransferPhase::Running;
        self.observer.update(&self.snapshot);
    }

    fn finish(&mut self, phase: TransferPhase) {
        self.snapshot.phase = phase;
        if phase == TransferPhase::Finished {
            self.snapshot.percent = 100;
        }
        self.snapshot.finished_at = Some(SystemTime::now());
        self.observer.update(&self.snapshot);
    }
}

impl<T: BulkTransport> MtpSession<T> {
    /// GetObject streamed into `sink` as numbered chunks.
    ///
    /// Returns the number of payload bytes transferred.
    pub fn download_object(
        &mut self,
        handle: u32,
        serial: &str,
        sink: &mut dyn ChunkSink,
        observer: &mut dyn ProgressObserver,
    ) -> Result<u64, Error> {
        let mut progress = ProgressTracker::start(observer);
        let result = self.run(|engine| {
            stream_object(engine, handle, serial, sink, &mut progress)
        });
        match &result {
            Ok(total) => {
                progress.finish(TransferPhase::Finished);
                log::info!("downloaded {total} bytes from object {handle:#010X}");
            }
            Err(e) => {
                progress.finish(TransferPhase::Failed);
                log::warn!("download of object {handle:#010X} failed: {e}");
            }
        }
        result
    }
}

fn stream_object<T: BulkTransport>(
    engine: &mut crate::transaction::TransactionEngine<T>,
    handle: u32,
    serial: &str,
    sink: &mut dyn ChunkSink,
    progress: &mut ProgressTracker<'_>,
) -> Result<u64, Error> {
    let tx_id = engine.issue(OP_GET_OBJECT, &[handle])?;

    // The first packet carries the container header declaring the total
    // payload length, followed by the first payload bytes.
    let first = engine.recv_packet(DATA_TIMEOUT)?;
    let first_len = first.len();
    let header = container::decode(&first)?;
    if header.kind != ContainerKind::Data || header.tx_id != tx_id {
        return Err(Error::Protocol(format!(
            "expected data phase for tx {tx_id}, got {:?} tx {}",
            header.kind, header.tx_id
        )));
    }
    let declared_total = header.declared_payload_len() as u64;

    let mut buffer: Vec<u8> = header.payload;
    let mut received = buffer.len() as u64;
    let mut packets: u64 = 1;
    let mut chunk_index: u32 = 0;
    let mut last_len = first_len;

    // Planned reads: everything past the first packet arrives in
    // full-size transfers, except possibly the last.
    let remaining = declared_total - received.min(declared_total);
    let expected_packets = remaining.div_ceil(MTP_PACKET_MAX_SIZE as u64);

    for i in 0..expected_packets {
        let pkt = engine.recv_packet(DATA_TIMEOUT)?;
        last_len = pkt.len();
        let take = (pkt.len() as u64).min(declared_total - received) as usize;
        buffer.extend_from_slice(&pkt[..take]);
        received += take as u64;
        packets += 1;

        if packets % CHUNK_WINDOW_PACKETS == 0 {
            flush_chunk(sink, serial, &mut chunk_index, &mut buffer)?;
        }
        let percent = ((i + 1) * 100 / expected_packets) as u8;
        progress.running(received, declared_total, percent);

        if last_len < MTP_PACKET_MAX_SIZE {
            break;
        }
    }
    if received < declared_total {
        return Err(Error::Protocol(format!(
            "data phase ended after {received} of {declared_total} bytes"
        )));
    }

    // A stream whose last packet was full-size is closed by a trailing
    // short packet; consume it before the response.
    if last_len == MTP_PACKET_MAX_SIZE {
        let trailer = engine.recv_packet(DATA_TIMEOUT)?;
        if !trailer.is_empty() {
            return Err(Error::Protocol(format!(
                "expected end-of-transfer packet, got {} bytes",
                trailer.len()
            )));
        }
    }

    if !buffer.is_empty() || chunk_index == 0 {
        flush_chunk(sink, serial, &mut chunk_index, &mut buffer)?;
    }
    progress.running(received, declared_total, 100);

    let (code, _params) = engine.read_response(tx_id)?;
    if code != RSP_OK {
        return Err(Error::MtpStatus(code));
    }
    Ok(received)
}

fn flush_chunk(
    sink: &mut dyn ChunkSink,
    serial: &str,
    chunk_index: &mut u32,
    buffer: &mut Vec<u8>,
) -> Result<(), Error> {
    sink.append(serial, *chunk_index, buffer).map_err(Error::Sink)?;
    log::debug!("flushed chunk {} ({} bytes)", *chunk_index, buffer.len());
    *chunk_index += 1;
    buffer.clear();
    Ok(())
}
