//! Per-device MTP session and its view of the device's storages and
//! file objects.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use crate::consts::*;
use crate::dataset::{ObjectInfo, StorageInfo};
use crate::error::Error;
use crate::transaction::{CompletedTransaction, TransactionEngine};
use crate::transport::BulkTransport;

/// A storage volume as last enumerated.
#[derive(Debug)]
pub struct Storage {
    pub id: u32,
    pub info: Option<StorageInfo>,
    pub objects: Vec<ObjectRecord>,
}

/// A file object within a storage.
#[derive(Debug)]
pub struct ObjectRecord {
    pub handle: u32,
    pub storage_id: u32,
    pub info: Option<ObjectInfo>,
}

/// One MTP session against one recorder.
///
/// Operations are strictly sequential; the session owns the transport
/// for its whole lifetime. Storage and object lists mirror the most
/// recent enumeration and are rebuilt wholesale by it.
pub struct MtpSession<T: BulkTransport> {
    engine: TransactionEngine<T>,
    open: bool,
    serial: Option<String>,
    storages: Vec<Storage>,
}

impl<T: BulkTransport> MtpSession<T> {
    pub fn new(transport: T) -> MtpSession<T> {
        MtpSession {
            engine: TransactionEngine::new(transport),
            open: false,
            serial: None,
            storages: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn storages(&self) -> &[Storage] {
        &self.storages
    }

    pub fn serial(&self) -> Option<&str> {
        self.serial.as_deref()
    }

    pub fn set_serial(&mut self, serial: String) {
        self.serial = Some(serial);
    }

    /// Release the underlying transport.
    pub fn close_transport(&mut self) {
        self.open = false;
        self.engine.transport_mut().close();
    }

    /// Consume the session and recover the transport.
    pub fn into_transport(self) -> T {
        self.engine.into_transport()
    }

    pub(crate) fn engine_mut(&mut self) -> &mut TransactionEngine<T> {
        &mut self.engine
    }

    /// Run an engine call, dropping the session to closed when the
    /// transport goes away mid-transaction.
    pub(crate) fn run<R>(
        &mut self,
        f: impl FnOnce(&mut TransactionEngine<T>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let result = f(&mut self.engine);
        if let Err(Error::TransportLost(_)) = result {
            self.open = false;
        }
        result
    }

    fn require_open(&self) -> Result<(), Error> {
        if self.open {
            Ok(())
        } else {
            Err(Error::Protocol("session not open".into()))
        }
    }

    fn expect_ok(completed: &CompletedTransaction) -> Result<(), Error> {
        if completed.response_code == RSP_OK {
            Ok(())
        } else {
            Err(Error::MtpStatus(completed.response_code))
        }
    }

    /// OpenSession with the fixed session id. A device that reports the
    /// session as already open is treated as success.
    pub fn open_session(&mut self) -> Result<(), Error> {
        let completed = self.run(|e| e.command(OP_OPEN_SESSION, &[SESSION_ID]))?;
        match completed.response_code {
            RSP_OK | RSP_SESSION_ALREADY_OPEN => {
                self.open = true;
                Ok(())
            }
            code => Err(Error::MtpStatus(code)),
        }
    }

    pub fn close_session(&mut self) -> Result<(), Error> {
        self.require_open()?;
        let completed = self.run(|e| e.command(OP_CLOSE_SESSION, &[]))?;
        Self::expect_ok(&completed)?;
        self.open = false;
        Ok(())
    }

    /// GetStorageIDs. Replaces the storage list; objects are refetched
    /// per storage afterwards.
    pub fn refresh_storage_ids(&mut self) -> Result<&[Storage], Error> {
        self.require_open()?;
        let completed = self.run(|e| e.command_with_data_in(OP_GET_STORAGE_IDS, &[]))?;
        Self::expect_ok(&completed)?;
        let data = completed
            .data
            .ok_or_else(|| Error::Protocol("GetStorageIDs returned no data".into()))?;

        let mut cur = Cursor::new(data.as_slice());
        let count = cur
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::Parse("truncated storage id array".into()))?;
        // capacity bounded by the payload, not the claimed count
        let mut storages = Vec::with_capacity((count as usize).min(data.len() / 4));
        for _ in 0..count {
            let id = cur
                .read_u32::<LittleEndian>()
                .map_err(|_| Error::Parse("truncated storage id array".into()))?;
            storages.push(Storage {
                id,
                info: None,
                objects: Vec::new(),
            });
        }
        self.storages = storages;
        log::debug!("device reports {count} storage(s)");
        Ok(&self.storages)
    }

    /// GetStorageInfo for one storage id.
    pub fn refresh_storage_info(&mut self, storage_id: u32) -> Result<&StorageInfo, Error> {
        self.require_open()?;
        let completed =
            self.run(|e| e.command_with_data_in(OP_GET_STORAGE_INFO, &[storage_id]))?;
        Self::expect_ok(&completed)?;
        let data = completed
            .data
            .ok_or_else(|| Error::Protocol("GetStorageInfo returned no data".into()))?;
        let info = StorageInfo::decode(&data)?;

        let storage = self
            .storage_mut(storage_id)
            .ok_or_else(|| Error::Protocol(format!("unknown storage {storage_id:#010X}")))?;
        Ok(storage.info.insert(info))
    }

    /// GetObjectHandles for every object in a storage, replacing that
    /// storage's object list.
    pub fn refresh_object_handles(&mut self, storage_id: u32) -> Result<Vec<u32>, Error> {
        self.require_open()?;
        let completed = self.run(|e| {
            e.command_with_data_in(OP_GET_OBJECT_HANDLES, &[storage_id, 0, PARENT_ROOT])
        })?;
        Self::expect_ok(&completed)?;
        let data = completed
            .data
            .ok_or_else(|| Error::Protocol("GetObjectHandles returned no data".into()))?;

        let mut cur = Cursor::new(data.as_slice());
        let count = cur
            .read_u32::<LittleEndian>()
            .map_err(|_| Error::Parse("truncated object handle array".into()))?;
        let mut handles = Vec::with_capacity((count as usize).min(data.len() / 4));
        for _ in 0..count {
            handles.push(
                cur.read_u32::<LittleEndian>()
                    .map_err(|_| Error::Parse("truncated object handle array".into()))?,
            );
        }

        let storage = self
            .storage_mut(storage_id)
            .ok_or_else(|| Error::Protocol(format!("unknown storage {storage_id:#010X}")))?;
        storage.objects = handles
            .iter()
            .map(|&handle| ObjectRecord {
                handle,
                storage_id,
                info: None,
            })
            .collect();
        log::debug!("storage {storage_id:#010X} holds {count} object(s)");
        Ok(handles)
    }

    /// GetObjectInfo for one handle.
    pub fn refresh_object_info(&mut self, handle: u32) -> Result<&ObjectInfo, Error> {
        self.require_open()?;
        let completed = self.run(|e| e.command_with_data_in(OP_GET_OBJECT_INFO, &[handle]))?;
        Self::expect_ok(&completed)?;
        let data = completed
            .data
            .ok_or_else(|| Error::Protocol("GetObjectInfo returned no data".into()))?;
        let info = ObjectInfo::decode(&data)?;

        let record = self
            .object_mut(handle)
            .ok_or_else(|| Error::Protocol(format!("unknown object handle {handle:#010X}")))?;
        Ok(record.info.insert(info))
    }

    /// GetObject fully buffered. Suitable for configuration blobs; use
    /// the streaming download for recordings.
    pub fn object_bytes(&mut self, handle: u32) -> Result<Vec<u8>, Error> {
        self.require_open()?;
        let completed = self.run(|e| e.command_with_data_in(OP_GET_OBJECT, &[handle]))?;
        Self::expect_ok(&completed)?;
        completed
            .data
            .ok_or_else(|| Error::Protocol("GetObject returned no data".into()))
    }

    /// DeleteObject. On success the handle disappears from the local
    /// object list as well.
    pub fn delete_object(&mut self, handle: u32) -> Result<(), Error> {
        self.require_open()?;
        let completed = self.run(|e| e.command(OP_DELETE_OBJECT, &[handle, 0]))?;
        Self::expect_ok(&completed)?;
        for storage in &mut self.storages {
            storage.objects.retain(|o| o.handle != handle);
        }
        Ok(())
    }

    /// SendObjectInfo announcing an upload into `storage_id` at the
    /// storage root. Returns the handle the device assigned.
    pub fn send_object_info(&mut self, storage_id: u32, info: &ObjectInfo) -> Result<u32, Error> {
        self.require_open()?;
        let payload = info.encode()?;
        let completed = self.run(|e| {
            e.command_with_data_out(OP_SEND_OBJECT_INFO, &[storage_id, PARENT_ROOT], &payload)
        })?;
        Self::expect_ok(&completed)?;
        let new_handle = completed
            .response_params
            .get(2)
            .copied()
            .ok_or_else(|| Error::Protocol("SendObjectInfo response lacks a handle".into()))?;
        Ok(new_handle)
    }

    /// SendObject with the raw file bytes. The device binds the data to
    /// the most recent SendObjectInfo of this session.
    pub fn send_object(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.require_open()?;
        let completed = self.run(|e| e.command_with_data_out(OP_SEND_OBJECT, &[], bytes))?;
        Self::expect_ok(&completed)
    }

    /// Record an uploaded object in the local list once the device has
    /// accepted both upload phases.
    pub fn note_uploaded(&mut self, storage_id: u32, handle: u32, info: ObjectInfo) {
        if let Some(storage) = self.storage_mut(storage_id) {
            storage.objects.push(ObjectRecord {
                handle,
                storage_id,
                info: Some(info),
            });
        }
    }

    /// Find a file object by name across all storages.
    pub fn find_object_by_name(&self, name: &str) -> Option<&ObjectRecord> {
        self.storages.iter().flat_map(|s| s.objects.iter()).find(|o| {
            o.info
                .as_ref()
                .map(|i| i.file_name == name)
                .unwrap_or(false)
        })
    }

    pub fn storage_mut(&mut self, storage_id: u32) -> Option<&mut Storage> {
        self.storages.iter_mut().find(|s| s.id == storage_id)
    }

    fn object_mut(&mut self, handle: u32) -> Option<&mut ObjectRecord> {
        self.storages
            .iter_mut()
            .flat_map(|s| s.objects.iter_mut())
            .find(|o| o.handle == handle)
    }
}
