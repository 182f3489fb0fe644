//! Streaming download behavior: chunking, progress, terminator handling.

mod common;

use common::{data_frame, response};
use recorder_mtp::consts::{CHUNK_WINDOW_PACKETS, OP_GET_OBJECT, RSP_OK};
use recorder_mtp::transport::MockTransport;
use recorder_mtp::{ChunkSink, Error, MtpSession, TransferPhase, TransferProgress};

#[derive(Default)]
struct MemorySink {
    chunks: Vec<(u32, usize)>,
    bytes: Vec<u8>,
}

impl ChunkSink for MemorySink {
    fn append(&mut self, _serial: &str, chunk_index: u32, bytes: &[u8]) -> std::io::Result<()> {
        self.chunks.push((chunk_index, bytes.len()));
        self.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

fn open_session_script(mock: &mut MockTransport) {
    mock.push_packet(response(RSP_OK, 0, &[]));
}

fn payload_of(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
fn one_megabyte_download_streams_into_a_single_chunk() {
    let mut mock = MockTransport::new();
    open_session_script(&mut mock);
    let payload = payload_of(1_048_576);
    mock.push_framed(&data_frame(OP_GET_OBJECT, 1, &payload));
    mock.push_packet(response(RSP_OK, 1, &[]));

    let mut session = MtpSession::new(mock);
    session.open_session().unwrap();

    let mut sink = MemorySink::default();
    let mut snapshots: Vec<TransferProgress> = Vec::new();
    let mut observer = |p: &TransferProgress| snapshots.push(p.clone());
    let total = session
        .download_object(7, "ABC123", &mut sink, &mut observer)
        .unwrap();

    assert_eq!(total, 1_048_576);
    assert_eq!(sink.bytes, payload);
    assert_eq!(sink.chunks, vec![(0, 1_048_576)]);

    assert_eq!(snapshots.first().unwrap().phase, TransferPhase::Started);
    let last = snapshots.last().unwrap();
    assert_eq!(last.phase, TransferPhase::Finished);
    assert_eq!(last.percent, 100);
    assert_eq!(last.bytes_transferred, 1_048_576);
    assert_eq!(last.bytes_total, 1_048_576);
    assert!(last.finished_at.is_some());
    // percent never goes backwards
    assert!(snapshots.windows(2).all(|w| w[0].percent <= w[1].percent));
}

#[test]
fn chunk_window_flushes_every_fifty_thousand_packets() {
    let window = CHUNK_WINDOW_PACKETS as usize;
    // First packet carries 500 bytes; the window fills after another
    // window-1 full packets, then 100 bytes trail in a short packet.
    let in_window = 500 + (window - 1) * 512;
    let payload = payload_of(in_window + 100);

    let mut mock = MockTransport::new();
    open_session_script(&mut mock);
    mock.push_framed(&data_frame(OP_GET_OBJECT, 1, &payload));
    mock.push_packet(response(RSP_OK, 1, &[]));

    let mut session = MtpSession::new(mock);
    session.open_session().unwrap();

    let mut sink = MemorySink::default();
    let mut observer = |_: &TransferProgress| {};
    let total = session
        .download_object(7, "ABC123", &mut sink, &mut observer)
        .unwrap();

    assert_eq!(total, payload.len() as u64);
    assert_eq!(sink.chunks, vec![(0, in_window), (1, 100)]);
    assert_eq!(sink.bytes, payload);
}

#[test]
fn exact_packet_multiple_consumes_the_trailing_zero_length_packet() {
    // 500 + 2 * 512 payload bytes: the framed stream is exactly 1536,
    // so the device terminates with a zero-length packet.
    let payload = payload_of(1524);

    let mut mock = MockTransport::new();
    open_session_script(&mut mock);
    mock.push_framed(&data_frame(OP_GET_OBJECT, 1, &payload));
    mock.push_packet(response(RSP_OK, 1, &[]));

    let mut session = MtpSession::new(mock);
    session.open_session().unwrap();

    let mut sink = MemorySink::default();
    let mut observer = |_: &TransferProgress| {};
    let total = session
        .download_object(7, "ABC123", &mut sink, &mut observer)
        .unwrap();
    assert_eq!(total, 1524);
    assert_eq!(sink.bytes, payload);
}

#[test]
fn failed_download_reports_the_failed_phase() {
    let mut mock = MockTransport::new();
    open_session_script(&mut mock);
    // Data phase starts, then the device disappears.
    let frame = data_frame(OP_GET_OBJECT, 1, &payload_of(2000));
    mock.push_packet(frame[..512].to_vec());
    mock.push_error(Error::TransportLost(rusb::Error::NoDevice));

    let mut session = MtpSession::new(mock);
    session.open_session().unwrap();

    let mut sink = MemorySink::default();
    let mut phases: Vec<TransferPhase> = Vec::new();
    let mut observer = |p: &TransferProgress| phases.push(p.phase);
    let err = session
        .download_object(7, "ABC123", &mut sink, &mut observer)
        .unwrap_err();

    assert!(matches!(err, Error::TransportLost(_)));
    assert_eq!(phases.last(), Some(&TransferPhase::Failed));
    assert!(!session.is_open());
}

#[test]
fn non_ok_response_after_stream_is_surfaced() {
    let payload = payload_of(100);
    let mut mock = MockTransport::new();
    open_session_script(&mut mock);
    mock.push_framed(&data_frame(OP_GET_OBJECT, 1, &payload));
    mock.push_packet(response(0x2009, 1, &[]));

    let mut session = MtpSession::new(mock);
    session.open_session().unwrap();

    let mut sink = MemorySink::default();
    let mut observer = |_: &TransferProgress| {};
    let err = session
        .download_object(7, "ABC123", &mut sink, &mut observer)
        .unwrap_err();
    assert!(matches!(err, Error::MtpStatus(0x2009)));
}
