//! Recorder configuration and command files.
//!
//! Both `config.txt` and `command.txt` are plain text, one `KEY=VALUE`
//! pair per line. The recorders emit CRLF but older firmware has been
//! seen using bare CR, so any newline convention is accepted.

use std::collections::{btree_map, BTreeMap};

use crate::consts::SERIAL_NUMBER_KEY;

/// Parsed key/value view of a device text file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    entries: BTreeMap<String, String>,
}

impl DeviceConfig {
    pub fn new() -> DeviceConfig {
        DeviceConfig::default()
    }

    /// Parse device bytes. Lines without `=` or with an empty value are
    /// dropped; non-UTF-8 bytes are replaced rather than rejected since
    /// the firmware occasionally pads with garbage.
    pub fn parse(bytes: &[u8]) -> DeviceConfig {
        Self::parse_str(&String::from_utf8_lossy(bytes))
    }

    pub fn parse_str(text: &str) -> DeviceConfig {
        let mut entries = BTreeMap::new();
        let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
        for line in normalized.split('\n') {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key.is_empty() || value.is_empty() {
                continue;
            }
            entries.insert(key.to_owned(), value.to_owned());
        }
        DeviceConfig { entries }
    }

    /// Render in the on-device format, CRLF terminated, keys ordered.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push_str("\r\n");
        }
        out
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_owned(), value.to_owned());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.entries.iter()
    }

    /// The key every recorder must carry; identifies it across
    /// reconnects.
    pub fn serial_number(&self) -> Option<&str> {
        self.get(SERIAL_NUMBER_KEY)
    }

    pub fn recording_duration(&self) -> Option<&str> {
        self.get("RecordingDurationConfig")
    }

    pub fn audio_length(&self) -> Option<&str> {
        self.get("AudioLength")
    }

    pub fn battery_is_charging(&self) -> bool {
        self.get("BatteryIsCharging")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_crlf_file() {
        let cfg = DeviceConfig::parse(b"SerialNumber=ABC123\r\nAudioLength=42\r\n");
        assert_eq!(cfg.serial_number(), Some("ABC123"));
        assert_eq!(cfg.audio_length(), Some("42"));
    }

    #[test]
    fn accepts_any_newline_convention() {
        let cr = DeviceConfig::parse_str("A=1\rB=2\r");
        let lf = DeviceConfig::parse_str("A=1\nB=2\n");
        let crlf = DeviceConfig::parse_str("A=1\r\nB=2\r\n");
        assert_eq!(cr, lf);
        assert_eq!(lf, crlf);
    }

    #[test]
    fn drops_empty_and_malformed_lines() {
        let cfg = DeviceConfig::parse_str("A=1\n\nNoEquals\nEmpty=\n=orphan\nB=2");
        assert_eq!(cfg.get("A"), Some("1"));
        assert_eq!(cfg.get("B"), Some("2"));
        assert_eq!(cfg.get("Empty"), None);
        assert_eq!(cfg.get("NoEquals"), None);
        assert_eq!(cfg.iter().count(), 2);
    }

    #[test]
    fn render_round_trips() {
        let mut cfg = DeviceConfig::new();
        cfg.set("SerialNumber", "XZ-99");
        cfg.set("RecordingDurationConfig", "3600");
        cfg.set("BatteryIsCharging", "1");
        assert_eq!(DeviceConfig::parse_str(&cfg.render()), cfg);
        assert!(cfg.battery_is_charging());
    }

    #[test]
    fn values_may_contain_equals() {
        let cfg = DeviceConfig::parse_str("Note=a=b\n");
        assert_eq!(cfg.get("Note"), Some("a=b"));
    }
}
