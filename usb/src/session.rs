use crate::device::base::{LineParameters, SerialDevice, SerialPort, UsbHost};
use crate::error::{ConnectError, PortError};
use crate::event_log::EventLog;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;
use tokio::task::{self, JoinHandle};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Opening,
    Open,
    Closing,
}

/// When a "Sent data" line is written for a send.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SentLogPolicy {
    /// Every attempted send is logged, even ones that failed or timed out.
    #[default]
    Always,
    OnSuccess,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub parameters: LineParameters,

    // Only the first port of a device is ever used unless this says otherwise.
    pub port_index: usize,

    pub write_timeout: Duration,
    pub read_timeout: Duration,
    pub read_buffer_size: usize,
    pub sent_log_policy: SentLogPolicy,
    pub log_capacity: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            parameters: LineParameters::default(),
            port_index: 0,
            write_timeout: Duration::from_millis(1000),
            read_timeout: Duration::from_millis(200),
            read_buffer_size: 4096,
            sent_log_policy: SentLogPolicy::Always,
            log_capacity: None,
        }
    }
}

struct ActiveSession {
    device: SerialDevice,
    port: Arc<dyn SerialPort>,
    stopping: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

/// The single open serial connection, and the background task reading from it.
///
/// `open` and `close` are the only places the port changes hands. The reader shares the port
/// for reading, writes happen on the caller's thread.
pub struct PortSession {
    config: SessionConfig,
    log: EventLog,
    state: SessionState,
    active: Option<ActiveSession>,
}

impl PortSession {
    pub fn new(config: SessionConfig, log: EventLog) -> Self {
        Self {
            config,
            log,
            state: SessionState::Closed,
            active: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&mut self) -> SessionState {
        self.reap();
        self.state
    }

    pub fn device(&mut self) -> Option<&SerialDevice> {
        self.reap();
        self.active.as_ref().map(|active| &active.device)
    }

    /// Opens the configured port and starts reading from it. Must be called from inside a tokio
    /// runtime, the reader runs on the blocking pool.
    pub fn open(&mut self, host: &dyn UsbHost, device: &SerialDevice) -> Result<(), ConnectError> {
        self.reap();
        if self.state != SessionState::Closed {
            return Err(ConnectError::AlreadyOpen);
        }

        self.state = SessionState::Opening;
        let port = match self.open_port(host, device) {
            Ok(port) => port,
            Err(error) => {
                self.state = SessionState::Closed;
                return Err(error);
            }
        };

        let stopping = Arc::new(AtomicBool::new(false));
        let reader = task::spawn_blocking({
            let port = port.clone();
            let stopping = stopping.clone();
            let log = self.log.clone();
            let timeout = self.config.read_timeout;
            let buffer_size = self.config.read_buffer_size;
            move || read_loop(port, stopping, log, timeout, buffer_size)
        });

        info!(
            "Serial session open on {} ({})",
            device.id(),
            self.config.parameters
        );
        self.active = Some(ActiveSession {
            device: device.clone(),
            port,
            stopping,
            reader,
        });
        self.state = SessionState::Open;
        Ok(())
    }

    fn open_port(
        &self,
        host: &dyn UsbHost,
        device: &SerialDevice,
    ) -> Result<Arc<dyn SerialPort>, ConnectError> {
        if self.config.port_index >= device.port_count() {
            return Err(ConnectError::PortNotFound(self.config.port_index));
        }

        let port = host.open_port(device, self.config.port_index)?;
        if let Err(error) = port.set_parameters(&self.config.parameters) {
            if let Err(close_error) = port.close() {
                debug!("Error closing unconfigured port: {}", close_error);
            }
            return Err(error.into());
        }
        Ok(port)
    }

    /// Writes the text to the port. Failures land in the event log as well as being returned.
    pub fn write(&mut self, text: &str) -> Result<usize, PortError> {
        self.reap();
        let Some(active) = &self.active else {
            self.log.append(format!("Error: {}", PortError::NotOpen));
            return Err(PortError::NotOpen);
        };

        let result = active
            .port
            .write(text.as_bytes(), self.config.write_timeout);

        if let Err(error) = &result {
            warn!("Write to {} failed: {}", active.device.id(), error);
            self.log.append(format!("Error: {}", error));
        }

        // With the default policy this is logged even when the write failed.
        if self.config.sent_log_policy == SentLogPolicy::Always || result.is_ok() {
            self.log.append(format!("Sent data: {}", text));
        }

        result
    }

    pub async fn close(&mut self) {
        self.reap();
        let Some(active) = self.active.take() else {
            return;
        };

        self.state = SessionState::Closing;
        active.stopping.store(true, Ordering::Relaxed);
        if let Err(error) = active.reader.await {
            warn!("Serial read loop ended abnormally: {}", error);
        }

        if let Err(error) = active.port.close() {
            debug!("Error closing port on {}: {}", active.device.id(), error);
        }
        drop(active.port);

        self.state = SessionState::Closed;
        self.log.append("USB connection closed.");
    }

    // The reader only exits on its own after a terminal error, in which case the session is over.
    fn reap(&mut self) {
        let finished = self
            .active
            .as_ref()
            .is_some_and(|active| active.reader.is_finished());

        if finished {
            if let Some(active) = self.active.take() {
                warn!("Lost serial connection to {}", active.device.id());
                if let Err(error) = active.port.close() {
                    debug!("Error closing lost port on {}: {}", active.device.id(), error);
                }
                self.state = SessionState::Closed;
            }
        }
    }
}

fn read_loop(
    port: Arc<dyn SerialPort>,
    stopping: Arc<AtomicBool>,
    log: EventLog,
    timeout: Duration,
    buffer_size: usize,
) {
    debug!("Starting serial read loop");
    let mut buffer = vec![0; buffer_size.max(1)];

    while !stopping.load(Ordering::Relaxed) {
        match port.read(&mut buffer, timeout) {
            Ok(0) | Err(PortError::Timeout) => continue,
            Ok(read) => {
                let text = String::from_utf8_lossy(&buffer[..read]);
                log.append(format!("Received: {}", text));
            }
            Err(error) => {
                // Errors raised because we're shutting down aren't worth reporting.
                if stopping.load(Ordering::Relaxed) {
                    break;
                }

                log.append(format!("Error: {}", error));
                if error.is_terminal() {
                    break;
                }

                // Don't spin on a port that keeps failing.
                sleep(timeout);
            }
        }
    }
    debug!("Serial read loop stopped");
}
