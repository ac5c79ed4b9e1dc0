use crate::commands::LedCommand;
use crate::device::base::{PermissionState, SerialDevice, UsbHost};
use crate::error::{ConnectError, PortError};
use crate::event_log::EventLog;
use crate::permission::PermissionGate;
use crate::session::{PortSession, SessionConfig, SessionState};
use log::warn;
use std::sync::Arc;

// Finds the first serial device, gets permission for it, and keeps the session it opens. All
// outcomes are reported through the event log, the returned errors are for the caller's benefit.
pub struct Controller {
    host: Arc<dyn UsbHost>,
    gate: PermissionGate,
    session: PortSession,
    log: EventLog,
}

impl Controller {
    pub fn new(host: Arc<dyn UsbHost>, config: SessionConfig) -> Self {
        let log = EventLog::with_capacity(config.log_capacity);
        Self {
            gate: PermissionGate::new(host.clone()),
            session: PortSession::new(config, log.clone()),
            host,
            log,
        }
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn gate(&self) -> &PermissionGate {
        &self.gate
    }

    pub fn state(&mut self) -> SessionState {
        self.session.state()
    }

    pub async fn setup(&mut self) -> Result<(), ConnectError> {
        let Some(device) = self.host.list_devices().into_iter().next() else {
            self.log.append("No USB devices found.");
            return Err(ConnectError::DeviceNotFound);
        };

        if self.gate.check_existing(&device) {
            return self.open(&device);
        }

        self.log.append("Requesting USB permission.");
        match self.gate.request_access(&device).await {
            Ok(PermissionState::Granted) => {}
            Ok(_) => {
                self.log.append("USB permission denied.");
                return Err(ConnectError::PermissionDenied);
            }
            Err(error) => {
                self.log.append(format!("Error: {}", error));
                return Err(error);
            }
        }

        // The prompt may have taken a while, make sure the device is still attached.
        let found = self
            .host
            .list_devices()
            .into_iter()
            .find(|candidate| candidate.id() == device.id());

        match found {
            Some(device) => self.open(&device),
            None => {
                self.log.append("Failed to open USB device.");
                Err(ConnectError::DeviceNotFound)
            }
        }
    }

    fn open(&mut self, device: &SerialDevice) -> Result<(), ConnectError> {
        if let Err(error) = self.session.open(self.host.as_ref(), device) {
            warn!("Unable to open {}: {}", device.id(), error);
            self.log.append("Failed to open USB device.");
            return Err(error);
        }

        self.log
            .append(format!("USB device connected: {}", device.product_name()));
        Ok(())
    }

    pub fn send(&mut self, command: LedCommand) -> Result<(), PortError> {
        self.session.write(command.payload())?;
        Ok(())
    }

    pub async fn teardown(&mut self) {
        self.session.close().await;
    }
}
