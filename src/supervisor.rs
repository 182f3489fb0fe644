//! Device supervisor.
//!
//! Owns every attached recorder, keyed by serial number, and runs the
//! connect sequence when the host reports a new device: open a session,
//! enumerate storages and files, read the configuration file, then
//! publish the device record. State changes leave the supervisor as
//! events on a channel; the supervisor never touches the host's store
//! directly.

use std::collections::HashMap;
use std::sync::mpsc::Sender;

use crate::consts::{COMMAND_FILE_NAME, CONFIG_FILE_NAME, SERIAL_NUMBER_KEY};
use crate::dataset::ObjectInfo;
use crate::device_config::DeviceConfig;
use crate::download::{ChunkSink, ProgressObserver};
use crate::error::Error;
use crate::session::MtpSession;
use crate::transport::BulkTransport;

/// Connection lifecycle of one recorder. The transport constructor
/// covers open, configure and claim, so a session enters the machine
/// with its endpoints already known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Detected,
    Opening,
    EndpointsKnown,
    SessionOpen,
    Enumerated,
    Ready,
    Closing,
    Faulted,
}

/// A file as shown to the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub handle: u32,
    pub name: String,
    pub size: u32,
    pub date_created: String,
    pub date_modified: String,
}

/// A storage volume as shown to the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRecord {
    pub id: u32,
    pub description: String,
    pub volume_label: String,
    pub capacity: u64,
    pub free_space: u64,
    pub used: u64,
    pub files: Vec<FileRecord>,
}

/// Snapshot published for one connected recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub serial: String,
    pub config: DeviceConfig,
    pub storages: Vec<StorageRecord>,
}

/// Messages the supervisor publishes to the host's store.
#[derive(Debug, Clone)]
pub enum DeviceEvent {
    Added(DeviceRecord),
    Updated(DeviceRecord),
    Removed { serial: String },
}

struct DeviceEntry<T: BulkTransport> {
    session: MtpSession<T>,
    state: DeviceState,
    record: DeviceRecord,
}

fn advance(state: &mut DeviceState, next: DeviceState) {
    log::debug!("device state {:?} -> {next:?}", *state);
    *state = next;
}

pub struct Supervisor<T: BulkTransport> {
    devices: HashMap<String, DeviceEntry<T>>,
    events: Sender<DeviceEvent>,
}

impl<T: BulkTransport> Supervisor<T> {
    pub fn new(events: Sender<DeviceEvent>) -> Supervisor<T> {
        Supervisor {
            devices: HashMap::new(),
            events,
        }
    }

    pub fn serials(&self) -> Vec<String> {
        self.devices.keys().cloned().collect()
    }

    pub fn record(&self, serial: &str) -> Option<&DeviceRecord> {
        self.devices.get(serial).map(|e| &e.record)
    }

    pub fn device_state(&self, serial: &str) -> Option<DeviceState> {
        self.devices.get(serial).map(|e| e.state)
    }

    /// Run `f` against the transport behind one connected device.
    pub fn with_transport<R>(
        &mut self,
        serial: &str,
        f: impl FnOnce(&mut T) -> R,
    ) -> Result<R, Error> {
        let entry = self
            .devices
            .get_mut(serial)
            .ok_or(Error::DeviceNotFound)?;
        Ok(f(entry.session.engine_mut().transport_mut()))
    }

    /// Host reported a new recorder. Runs the connect sequence and
    /// publishes `Added`, or `Updated` when the serial is already known
    /// from an earlier connect.
    pub fn device_connected(&mut self, transport: T) -> Result<String, Error> {
        let mut state = DeviceState::Detected;
        advance(&mut state, DeviceState::Opening);
        let mut session = MtpSession::new(transport);
        // The transport arrives open with its interface claimed, which
        // completes the opening step through endpoint discovery.
        advance(&mut state, DeviceState::EndpointsKnown);

        let record = match Self::connect_sequence(&mut session, &mut state) {
            Ok(record) => record,
            Err(e) => {
                log::error!("connect sequence failed in {state:?}: {e}");
                session.close_transport();
                return Err(e);
            }
        };

        let serial = record.serial.clone();
        session.set_serial(serial.clone());
        let entry = DeviceEntry {
            session,
            state: DeviceState::Ready,
            record: record.clone(),
        };

        let event = if let Some(mut old) = self.devices.insert(serial.clone(), entry) {
            // Stale entry for the same serial: release its transport
            // before it is dropped.
            old.session.close_transport();
            log::info!("device updated: {serial}");
            DeviceEvent::Updated(record)
        } else {
            log::info!("device added: {serial}");
            DeviceEvent::Added(record)
        };
        self.publish(event);
        Ok(serial)
    }

    fn connect_sequence(
        session: &mut MtpSession<T>,
        state: &mut DeviceState,
    ) -> Result<DeviceRecord, Error> {
        session.open_session()?;
        advance(state, DeviceState::SessionOpen);

        Self::enumerate(session)?;
        advance(state, DeviceState::Enumerated);

        let config = Self::read_config(session)?;
        let serial = config
            .serial_number()
            .ok_or_else(|| Error::Parse(format!("{CONFIG_FILE_NAME} lacks {SERIAL_NUMBER_KEY}")))?
            .to_owned();

        Ok(Self::build_record(session, serial, config))
    }

    /// Storage list, then per storage the info and the object list,
    /// then per object its info.
    fn enumerate(session: &mut MtpSession<T>) -> Result<(), Error> {
        let storage_ids: Vec<u32> =
            session.refresh_storage_ids()?.iter().map(|s| s.id).collect();
        for id in &storage_ids {
            session.refresh_storage_info(*id)?;
        }
        for id in &storage_ids {
            let handles = session.refresh_object_handles(*id)?;
            for handle in handles {
                session.refresh_object_info(handle)?;
            }
        }
        Ok(())
    }

    fn read_config(session: &mut MtpSession<T>) -> Result<DeviceConfig, Error> {
        let handle = session
            .find_object_by_name(CONFIG_FILE_NAME)
            .map(|o| o.handle)
            .ok_or_else(|| Error::Parse(format!("device has no {CONFIG_FILE_NAME}")))?;
        let bytes = session.object_bytes(handle)?;
        Ok(DeviceConfig::parse(&bytes))
    }

    fn build_record(
        session: &MtpSession<T>,
        serial: String,
        config: DeviceConfig,
    ) -> DeviceRecord {
        let storages = session
            .storages()
            .iter()
            .map(|storage| {
                let info = storage.info.clone().unwrap_or_default();
                let files = storage
                    .objects
                    .iter()
                    .filter_map(|o| o.info.as_ref().map(|i| (o.handle, i)))
                    .map(|(handle, i)| FileRecord {
                        handle,
                        name: i.file_name.clone(),
                        size: i.compressed_size,
                        date_created: i.date_created.clone(),
                        date_modified: i.date_modified.clone(),
                    })
                    .collect();
                StorageRecord {
                    id: storage.id,
                    description: info.description.clone(),
                    volume_label: info.volume_label.clone(),
                    capacity: info.max_capacity,
                    free_space: info.free_space,
                    used: info.used(),
                    files,
                }
            })
            .collect();
        DeviceRecord {
            serial,
            config,
            storages,
        }
    }

    /// Host reported the recorder gone. The wire is already dead, so
    /// CloseSession is attempted only as a courtesy.
    pub fn device_disconnected(&mut self, serial: &str) {
        self.teardown(serial);
    }

    /// Soft-eject: close the session while the cable stays in.
    pub fn eject(&mut self, serial: &str) {
        self.teardown(serial);
    }

    fn teardown(&mut self, serial: &str) {
        let Some(mut entry) = self.devices.remove(serial) else {
            return;
        };
        entry.state = DeviceState::Closing;
        if entry.session.is_open() {
            if let Err(e) = entry.session.close_session() {
                log::debug!("CloseSession on teardown failed: {e}");
            }
        }
        entry.session.close_transport();
        log::info!("device removed: {serial}");
        self.publish(DeviceEvent::Removed {
            serial: serial.to_owned(),
        });
    }

    /// Stream one recording into the chunk sink.
    pub fn download_recording(
        &mut self,
        serial: &str,
        file_name: &str,
        sink: &mut dyn ChunkSink,
        observer: &mut dyn ProgressObserver,
    ) -> Result<u64, Error> {
        let entry = self
            .devices
            .get_mut(serial)
            .ok_or(Error::DeviceNotFound)?;
        let handle = entry
            .session
            .find_object_by_name(file_name)
            .map(|o| o.handle)
            .ok_or_else(|| Error::Parse(format!("no file named {file_name}")))?;
        let result = entry
            .session
            .download_object(handle, serial, sink, observer);
        self.fault_on_transport_loss(serial, &result);
        result
    }

    /// Delete one file from the recorder and republish the record.
    pub fn delete_file(&mut self, serial: &str, file_name: &str) -> Result<(), Error> {
        let entry = self
            .devices
            .get_mut(serial)
            .ok_or(Error::DeviceNotFound)?;
        let handle = entry
            .session
            .find_object_by_name(file_name)
            .map(|o| o.handle)
            .ok_or_else(|| Error::Parse(format!("no file named {file_name}")))?;
        let result = entry.session.delete_object(handle);
        if result.is_ok() {
            self.republish(serial);
        }
        self.fault_on_transport_loss(serial, &result);
        result
    }

    /// Upload a command file into the first storage, replacing any
    /// previous one: delete the old handle, announce the new object,
    /// send its bytes.
    pub fn upload_command(&mut self, serial: &str, commands: &DeviceConfig) -> Result<(), Error> {
        let result = self.upload_command_inner(serial, commands);
        self.fault_on_transport_loss(serial, &result);
        result
    }

    fn upload_command_inner(
        &mut self,
        serial: &str,
        commands: &DeviceConfig,
    ) -> Result<(), Error> {
        let entry = self
            .devices
            .get_mut(serial)
            .ok_or(Error::DeviceNotFound)?;
        let session = &mut entry.session;

        if let Some(old) = session.find_object_by_name(COMMAND_FILE_NAME).map(|o| o.handle) {
            session.delete_object(old)?;
        }

        let storage_id = session
            .storages()
            .first()
            .map(|s| s.id)
            .ok_or_else(|| Error::Protocol("device reports no storage".into()))?;
        let bytes = commands.render().into_bytes();
        let info = ObjectInfo::for_upload(COMMAND_FILE_NAME, bytes.len() as u32);
        let handle = session.send_object_info(storage_id, &info)?;
        session.send_object(&bytes)?;
        session.note_uploaded(storage_id, handle, info);
        log::info!("uploaded {COMMAND_FILE_NAME} ({} bytes) to {serial}", bytes.len());

        self.republish(serial);
        Ok(())
    }

    /// Rebuild and publish the record after a mutation.
    fn republish(&mut self, serial: &str) {
        if let Some(entry) = self.devices.get_mut(serial) {
            entry.record = Self::build_record(
                &entry.session,
                entry.record.serial.clone(),
                entry.record.config.clone(),
            );
            let record = entry.record.clone();
            self.publish(DeviceEvent::Updated(record));
        }
    }

    /// A lost transport means the device is gone: tear the entry down
    /// so the host sees a removal rather than a wedged device.
    fn fault_on_transport_loss<R>(&mut self, serial: &str, result: &Result<R, Error>) {
        if let Err(Error::TransportLost(_)) = result {
            if let Some(entry) = self.devices.get_mut(serial) {
                entry.state = DeviceState::Faulted;
            }
            self.teardown(serial);
        }
    }

    fn publish(&self, event: DeviceEvent) {
        if self.events.send(event).is_err() {
            log::warn!("device event dropped: store receiver is gone");
        }
    }
}
