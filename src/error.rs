use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// No recorder found on the USB bus
    DeviceNotFound,
    /// USB transfer failed or the device disappeared
    TransportLost(rusb::Error),
    /// First interface exposes no bulk endpoint in one direction
    EndpointMissing,
    /// Bulk read exceeded its deadline
    Timeout,
    /// Malformed packet or unexpected container sequence
    Protocol(String),
    /// Device returned a non-OK response code
    MtpStatus(u16),
    /// Dataset or configuration file could not be parsed
    Parse(String),
    /// Chunk sink failed to persist a blob
    Sink(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DeviceNotFound => write!(f, "recorder not found (VID:1D3D)"),
            Error::TransportLost(e) => write!(f, "USB transport lost: {e}"),
            Error::EndpointMissing => write!(f, "bulk endpoint missing on first interface"),
            Error::Timeout => write!(f, "timed out waiting for device"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::MtpStatus(code) => write!(f, "device response {code:#06X}"),
            Error::Parse(msg) => write!(f, "parse error: {msg}"),
            Error::Sink(e) => write!(f, "chunk sink error: {e}"),
        }
    }
}

impl std::error::Error for Error {}
