use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(about, version, author)]
pub struct Cli {
    /// Minimum log level to print out
    #[clap(long, value_enum, default_value = "info")]
    pub log_level: LevelFilter,

    /// Location of a JSON settings file, only ever read
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Serial port on the device to use, most devices only have port 0
    #[clap(long)]
    pub port_index: Option<usize>,

    /// Baud rate to configure on the port
    #[clap(long)]
    pub baud_rate: Option<u32>,

    /// Keep at most this many lines in the event log, oldest are dropped first
    #[clap(long)]
    pub log_capacity: Option<usize>,

    /// Only log 'Sent data' lines for writes that succeeded
    #[clap(long)]
    pub log_sent_on_success: bool,
}

#[repr(usize)]
#[derive(ValueEnum, Copy, Clone, Eq, PartialEq, Debug)]
pub enum LevelFilter {
    /// A level lower than all log levels.
    Off,
    /// Corresponds to the `Error` log level.
    Error,
    /// Corresponds to the `Warn` log level.
    Warn,
    /// Corresponds to the `Info` log level.
    Info,
    /// Corresponds to the `Debug` log level.
    Debug,
    /// Corresponds to the `Trace` log level.
    Trace,
}

impl From<LevelFilter> for log::LevelFilter {
    fn from(level: LevelFilter) -> Self {
        match level {
            LevelFilter::Off => log::LevelFilter::Off,
            LevelFilter::Error => log::LevelFilter::Error,
            LevelFilter::Warn => log::LevelFilter::Warn,
            LevelFilter::Info => log::LevelFilter::Info,
            LevelFilter::Debug => log::LevelFilter::Debug,
            LevelFilter::Trace => log::LevelFilter::Trace,
        }
    }
}
