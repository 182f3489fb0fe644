//! MTP client for USB voice recorders.
//!
//! Speaks the MTP container protocol over a single bulk IN/OUT endpoint
//! pair and exposes the small surface a host application needs: list
//! storages and files, pull configuration blobs, stream recordings into
//! a chunk sink, delete files, and push a command file.

pub mod consts;
pub mod container;
pub mod dataset;
pub mod device_config;
pub mod download;
pub mod error;
pub mod session;
pub mod supervisor;
pub mod transaction;
pub mod transport;

pub use device_config::DeviceConfig;
pub use download::{ChunkSink, DirectoryChunkSink, ProgressObserver, TransferPhase, TransferProgress};
pub use error::Error;
pub use session::MtpSession;
pub use supervisor::{DeviceEvent, DeviceRecord, DeviceState, Supervisor};
pub use transport::{BulkTransport, MockTransport, UsbTransport};
