//! Transaction engine behavior over a scripted transport.

mod common;

use common::{data_frame, response};
use recorder_mtp::consts::{
    MTP_PACKET_MAX_SIZE, OP_GET_OBJECT, OP_GET_STORAGE_IDS, OP_OPEN_SESSION, OP_SEND_OBJECT,
    RSP_OK,
};
use recorder_mtp::container;
use recorder_mtp::transaction::TransactionEngine;
use recorder_mtp::transport::MockTransport;
use recorder_mtp::Error;

#[test]
fn command_without_data_phase() {
    let mut mock = MockTransport::new();
    mock.push_packet(response(RSP_OK, 0, &[]));

    let mut engine = TransactionEngine::new(mock);
    let completed = engine.command(OP_OPEN_SESSION, &[1]).unwrap();
    assert_eq!(completed.response_code, RSP_OK);
    assert!(completed.data.is_none());
}

#[test]
fn transaction_ids_increase_monotonically() {
    let mut mock = MockTransport::new();
    for tx in 0..3 {
        mock.push_packet(response(RSP_OK, tx, &[]));
    }

    let mut engine = TransactionEngine::new(mock);
    for _ in 0..3 {
        engine.command(OP_GET_STORAGE_IDS, &[]).unwrap();
    }

    let sent = engine.into_transport().sent;
    let ids: Vec<u32> = sent
        .iter()
        .map(|frame| container::decode(frame).unwrap().tx_id)
        .collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn data_then_response() {
    let mut mock = MockTransport::new();
    mock.push_framed(&data_frame(OP_GET_STORAGE_IDS, 0, &[1, 2, 3, 4]));
    mock.push_packet(response(RSP_OK, 0, &[]));

    let mut engine = TransactionEngine::new(mock);
    let completed = engine.command_with_data_in(OP_GET_STORAGE_IDS, &[]).unwrap();
    assert_eq!(completed.data.unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn response_then_data_is_reordered() {
    let mut mock = MockTransport::new();
    mock.push_packet(response(RSP_OK, 0, &[]));
    mock.push_framed(&data_frame(OP_GET_STORAGE_IDS, 0, &[9, 9]));

    let mut engine = TransactionEngine::new(mock);
    let completed = engine.command_with_data_in(OP_GET_STORAGE_IDS, &[]).unwrap();
    assert_eq!(completed.response_code, RSP_OK);
    assert_eq!(completed.data.unwrap(), vec![9, 9]);
}

#[test]
fn duplicate_data_phase_is_rejected() {
    let mut mock = MockTransport::new();
    mock.push_framed(&data_frame(OP_GET_STORAGE_IDS, 0, &[1]));
    mock.push_framed(&data_frame(OP_GET_STORAGE_IDS, 0, &[2]));

    let mut engine = TransactionEngine::new(mock);
    let err = engine
        .command_with_data_in(OP_GET_STORAGE_IDS, &[])
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[test]
fn duplicate_response_is_rejected() {
    let mut mock = MockTransport::new();
    mock.push_packet(response(RSP_OK, 0, &[]));
    mock.push_packet(response(RSP_OK, 0, &[]));

    let mut engine = TransactionEngine::new(mock);
    let err = engine
        .command_with_data_in(OP_GET_STORAGE_IDS, &[])
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[test]
fn mismatched_transaction_id_is_rejected() {
    let mut mock = MockTransport::new();
    mock.push_packet(response(RSP_OK, 7, &[]));

    let mut engine = TransactionEngine::new(mock);
    let err = engine.command(OP_OPEN_SESSION, &[1]).unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}

#[test]
fn empty_script_times_out() {
    let mut engine = TransactionEngine::new(MockTransport::new());
    assert!(matches!(
        engine.command(OP_OPEN_SESSION, &[1]),
        Err(Error::Timeout)
    ));
}

#[test]
fn data_out_splits_first_write_at_packet_size() {
    let mut mock = MockTransport::new();
    mock.push_packet(response(RSP_OK, 0, &[]));
    let payload = vec![0xAB; 1000];

    let mut engine = TransactionEngine::new(mock);
    engine
        .command_with_data_out(OP_SEND_OBJECT, &[], &payload)
        .unwrap();

    let sent = engine.into_transport().sent;
    // command, then the data phase in two writes
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[1].len(), MTP_PACKET_MAX_SIZE);
    // first write: 12-byte header then 500 payload bytes
    assert_eq!(&sent[1][12..], &payload[..500]);
    assert_eq!(sent[2].len(), 500);
    assert_eq!(&sent[2][..], &payload[500..]);
}

#[test]
fn data_out_on_packet_boundary_appends_zero_length_write() {
    let mut mock = MockTransport::new();
    mock.push_packet(response(RSP_OK, 0, &[]));
    // 500 + 512 payload bytes make the framed stream exactly 1024
    let payload = vec![0xCD; 1012];

    let mut engine = TransactionEngine::new(mock);
    engine
        .command_with_data_out(OP_SEND_OBJECT, &[], &payload)
        .unwrap();

    let sent = engine.into_transport().sent;
    assert_eq!(sent.len(), 4);
    assert_eq!(sent[1].len(), MTP_PACKET_MAX_SIZE);
    assert_eq!(sent[2].len(), MTP_PACKET_MAX_SIZE);
    assert!(sent[3].is_empty());
}

#[test]
fn data_in_on_packet_boundary_consumes_zero_length_terminator() {
    let mut mock = MockTransport::new();
    // 1012 payload bytes: framed stream is 1024, so the device appends
    // a zero-length packet before the response.
    let payload = vec![0xEF; 1012];
    mock.push_framed(&data_frame(OP_GET_OBJECT, 0, &payload));
    mock.push_packet(response(RSP_OK, 0, &[]));

    let mut engine = TransactionEngine::new(mock);
    let completed = engine.command_with_data_in(OP_GET_OBJECT, &[1]).unwrap();
    assert_eq!(completed.data.unwrap(), payload);
    assert_eq!(completed.response_code, RSP_OK);
}

#[test]
fn five_hundred_byte_data_phase_needs_no_continuation_read() {
    let mut mock = MockTransport::new();
    // 500 payload bytes fill the first packet exactly; the device then
    // terminates with a zero-length packet.
    let payload = vec![0x11; 500];
    mock.push_framed(&data_frame(OP_GET_OBJECT, 0, &payload));
    mock.push_packet(response(RSP_OK, 0, &[]));

    let mut engine = TransactionEngine::new(mock);
    let completed = engine.command_with_data_in(OP_GET_OBJECT, &[1]).unwrap();
    assert_eq!(completed.data.unwrap(), payload);
}

#[test]
fn short_changed_data_phase_is_a_protocol_error() {
    let mut mock = MockTransport::new();
    // Header declares 1000 payload bytes but the stream stops after 600.
    let frame = data_frame(OP_GET_OBJECT, 0, &vec![0x22; 1000]);
    mock.push_packet(frame[..512].to_vec());
    mock.push_packet(frame[512..712].to_vec());

    let mut engine = TransactionEngine::new(mock);
    let err = engine.command_with_data_in(OP_GET_OBJECT, &[1]).unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
}
