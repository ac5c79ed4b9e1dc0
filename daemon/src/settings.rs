use crate::cli::Cli;
use anyhow::{Context, Result};
use serde::Deserialize;
use serial_led_usb::session::{SentLogPolicy, SessionConfig};
use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

// Settings are read once at startup and never written back, anything not present falls back to
// the session defaults. Command line flags win over the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub port_index: Option<usize>,
    pub baud_rate: Option<u32>,
    pub write_timeout_ms: Option<u64>,
    pub log_capacity: Option<usize>,
    pub log_sent_on_success: Option<bool>,
}

impl Settings {
    pub fn read(path: &Path) -> Result<Settings> {
        match File::open(path) {
            Ok(reader) => serde_json::from_reader(reader).context(format!(
                "Could not parse settings file at {}",
                path.to_string_lossy()
            )),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Settings::default()),
            Err(error) => Err(error).context(format!(
                "Could not open settings file for reading at {}",
                path.to_string_lossy()
            )),
        }
    }

    pub fn session_config(&self, args: &Cli) -> SessionConfig {
        let mut config = SessionConfig::default();

        if let Some(port_index) = args.port_index.or(self.port_index) {
            config.port_index = port_index;
        }
        if let Some(baud_rate) = args.baud_rate.or(self.baud_rate) {
            config.parameters.baud_rate = baud_rate;
        }
        if let Some(timeout) = self.write_timeout_ms {
            config.write_timeout = Duration::from_millis(timeout);
        }
        config.log_capacity = args.log_capacity.or(self.log_capacity);

        if args.log_sent_on_success || self.log_sent_on_success == Some(true) {
            config.sent_log_policy = SentLogPolicy::OnSuccess;
        }

        config
    }
}
