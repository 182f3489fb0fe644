use std::path::PathBuf;
use std::process;
use std::sync::mpsc;

use rusb::Context;

use recorder_mtp::download::DirectoryChunkSink;
use recorder_mtp::{DeviceConfig, Supervisor, TransferPhase, TransferProgress, UsbTransport};

fn usage() -> ! {
    eprintln!("Usage: recorder-mtp <COMMAND> [ARGS]");
    eprintln!();
    eprintln!("Talk to attached voice recorders over MTP.");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  list                          Show every attached recorder");
    eprintln!("  files <SERIAL>                List files on one recorder");
    eprintln!("  pull <SERIAL> <FILE> <DIR>    Stream a recording into DIR as chunks");
    eprintln!("  delete <SERIAL> <FILE>        Delete a file from the recorder");
    eprintln!("  push-command <SERIAL> <PATH>  Upload PATH as command.txt");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG=debug   Show protocol activity");
    process::exit(1);
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("error: {msg}");
    process::exit(1);
}

/// Connect every recorder on the bus and hand back the supervisor
/// together with its event stream. The CLI only logs the events; a GUI
/// host would feed its store from the receiver instead.
fn connect_all() -> (Supervisor<UsbTransport>, mpsc::Receiver<recorder_mtp::DeviceEvent>) {
    let (events_tx, events_rx) = mpsc::channel();
    let mut supervisor = Supervisor::new(events_tx);

    let ctx = Context::new().unwrap_or_else(|e| fail(e));
    let devices = UsbTransport::scan(&ctx).unwrap_or_else(|e| fail(e));
    if devices.is_empty() {
        fail("no recorder on the bus (VID 1D3D)");
    }
    for device in &devices {
        match UsbTransport::open(device) {
            Ok(transport) => match supervisor.device_connected(transport) {
                Ok(serial) => eprintln!("==> Connected {serial}"),
                Err(e) => eprintln!("warning: device skipped: {e}"),
            },
            Err(e) => eprintln!("warning: device skipped: {e}"),
        }
    }
    (supervisor, events_rx)
}

fn cmd_list() {
    let (supervisor, _events) = connect_all();
    for serial in supervisor.serials() {
        let record = supervisor.record(&serial).unwrap_or_else(|| fail("lost device"));
        println!("{serial}");
        if let Some(duration) = record.config.recording_duration() {
            println!("  recording duration: {duration}");
        }
        println!(
            "  charging: {}",
            if record.config.battery_is_charging() { "yes" } else { "no" }
        );
        for storage in &record.storages {
            println!(
                "  storage {:#010X} {} ({} files, {} / {} bytes used)",
                storage.id,
                storage.description,
                storage.files.len(),
                storage.used,
                storage.capacity,
            );
        }
    }
}

fn cmd_files(serial: &str) {
    let (supervisor, _events) = connect_all();
    let record = supervisor
        .record(serial)
        .unwrap_or_else(|| fail(format!("no recorder with serial {serial}")));
    for storage in &record.storages {
        for file in &storage.files {
            println!("{:>10}  {:<17}  {}", file.size, file.date_modified, file.name);
        }
    }
}

fn cmd_pull(serial: &str, file: &str, dir: &str) {
    let (mut supervisor, _events) = connect_all();
    let mut sink = DirectoryChunkSink::new(PathBuf::from(dir));
    let mut last_percent = u8::MAX;
    let mut observer = |p: &TransferProgress| {
        if p.phase == TransferPhase::Running && p.percent != last_percent {
            last_percent = p.percent;
            eprint!("\r==> {} {}% ({} bytes)", file, p.percent, p.bytes_transferred);
        }
    };
    match supervisor.download_recording(serial, file, &mut sink, &mut observer) {
        Ok(total) => eprintln!("\n==> Done, {total} bytes"),
        Err(e) => {
            eprintln!();
            fail(e);
        }
    }
}

fn cmd_delete(serial: &str, file: &str) {
    let (mut supervisor, _events) = connect_all();
    supervisor
        .delete_file(serial, file)
        .unwrap_or_else(|e| fail(e));
    eprintln!("==> Deleted {file}");
}

fn cmd_push_command(serial: &str, path: &str) {
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| fail(e));
    let commands = DeviceConfig::parse_str(&text);
    if commands.is_empty() {
        fail(format!("{path} contains no KEY=VALUE lines"));
    }
    let (mut supervisor, _events) = connect_all();
    supervisor
        .upload_command(serial, &commands)
        .unwrap_or_else(|e| fail(e));
    eprintln!("==> Uploaded {path} as command.txt");
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let strs: Vec<&str> = args.iter().map(String::as_str).collect();
    match strs.as_slice() {
        ["list"] => cmd_list(),
        ["files", serial] => cmd_files(serial),
        ["pull", serial, file, dir] => cmd_pull(serial, file, dir),
        ["delete", serial, file] => cmd_delete(serial, file),
        ["push-command", serial, path] => cmd_push_command(serial, path),
        ["--help" | "-h"] | [] => usage(),
        _ => usage(),
    }
}
