//! MTP wire constants for the recorder profile.

use std::time::Duration;

/// Vendor id the recorders enumerate under.
pub const RECORDER_VENDOR_ID: u16 = 0x1D3D;

/// Maximum size of a single bulk transfer in either direction.
pub const MTP_PACKET_MAX_SIZE: usize = 512;

/// Size of the container header preceding params or payload.
pub const CONTAINER_HEADER_SIZE: usize = 12;

/// The recorders speak a single session, always id 1.
pub const SESSION_ID: u32 = 1;

/// Parent handle meaning "root of the storage".
pub const PARENT_ROOT: u32 = 0xFFFF_FFFF;

/// Object format code for opaque files.
pub const FORMAT_UNDEFINED: u16 = 0x3000;

/// Operation codes (the subset the recorders implement).
pub const OP_OPEN_SESSION: u16 = 0x1002;
pub const OP_CLOSE_SESSION: u16 = 0x1003;
pub const OP_GET_STORAGE_IDS: u16 = 0x1004;
pub const OP_GET_STORAGE_INFO: u16 = 0x1005;
pub const OP_GET_OBJECT_HANDLES: u16 = 0x1007;
pub const OP_GET_OBJECT_INFO: u16 = 0x1008;
pub const OP_GET_OBJECT: u16 = 0x1009;
pub const OP_DELETE_OBJECT: u16 = 0x100B;
pub const OP_SEND_OBJECT_INFO: u16 = 0x100C;
pub const OP_SEND_OBJECT: u16 = 0x100D;

/// Response codes the client interprets; everything else is opaque.
pub const RSP_OK: u16 = 0x2001;
pub const RSP_SESSION_ALREADY_OPEN: u16 = 0x201E;

/// Storage type field values. Shares raw values with `filesystem_type`
/// but the two fields are unrelated, so the constants stay separate.
pub mod storage_type {
    pub const UNDEFINED: u16 = 0x0000;
    pub const FIXED_RAM: u16 = 0x0003;
}

/// Filesystem type field values.
pub mod filesystem_type {
    pub const UNDEFINED: u16 = 0x0000;
    pub const GENERIC_FLAT: u16 = 0x0001;
}

/// Name of the device configuration file present on every recorder.
pub const CONFIG_FILE_NAME: &str = "config.txt";

/// Name of the command file the host uploads.
pub const COMMAND_FILE_NAME: &str = "command.txt";

/// Configuration key that identifies a recorder across reconnects.
pub const SERIAL_NUMBER_KEY: &str = "SerialNumber";

/// Streamed downloads flush to the chunk sink every this many bulk packets.
pub const CHUNK_WINDOW_PACKETS: u64 = 50_000;

/// Deadline for command and response phase reads.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Deadline for data phase reads; recordings stream for a long time.
pub const DATA_TIMEOUT: Duration = Duration::from_secs(30);

/// Return a human-readable name for an operation code.
pub fn op_name(op: u16) -> &'static str {
    match op {
        OP_OPEN_SESSION => "OpenSession",
        OP_CLOSE_SESSION => "CloseSession",
        OP_GET_STORAGE_IDS => "GetStorageIDs",
        OP_GET_STORAGE_INFO => "GetStorageInfo",
        OP_GET_OBJECT_HANDLES => "GetObjectHandles",
        OP_GET_OBJECT_INFO => "GetObjectInfo",
        OP_GET_OBJECT => "GetObject",
        OP_DELETE_OBJECT => "DeleteObject",
        OP_SEND_OBJECT_INFO => "SendObjectInfo",
        OP_SEND_OBJECT => "SendObject",
        _ => "UNKNOWN",
    }
}
