pub use rusb;
pub mod commands;
pub mod controller;
pub mod device;
pub mod error;
pub mod event_log;
pub mod permission;
pub mod session;
