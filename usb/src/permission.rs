use crate::device::base::{DeviceId, PermissionResponder, PermissionState, SerialDevice, UsbHost};
use crate::error::ConnectError;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Tracks consent per device, and turns the host's permission callback into something that can
/// be awaited.
pub struct PermissionGate {
    host: Arc<dyn UsbHost>,
    states: Mutex<HashMap<DeviceId, PermissionState>>,
}

impl PermissionGate {
    pub fn new(host: Arc<dyn UsbHost>) -> Self {
        Self {
            host,
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn state(&self, device: &SerialDevice) -> PermissionState {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&device.id())
            .copied()
            .unwrap_or(PermissionState::Unknown)
    }

    fn set_state(&self, device: &SerialDevice, state: PermissionState) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.id(), state);
    }

    /// Records a grant the host already holds, without asking for a new one.
    pub fn check_existing(&self, device: &SerialDevice) -> bool {
        if !self.host.has_permission(device) {
            return false;
        }

        debug!("Permission for {} already held", device.id());
        self.set_state(device, PermissionState::Granted);
        true
    }

    /// Resolves to either Granted or Denied. A device the host already trusts is granted without
    /// asking again, and only one request per device may be outstanding.
    pub async fn request_access(
        &self,
        device: &SerialDevice,
    ) -> Result<PermissionState, ConnectError> {
        if self.check_existing(device) {
            return Ok(PermissionState::Granted);
        }

        {
            let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
            if states.get(&device.id()) == Some(&PermissionState::Requested) {
                return Err(ConnectError::PermissionPending);
            }
            states.insert(device.id(), PermissionState::Requested);
        }

        // Covers the caller giving up on this future before the host answers.
        let mut pending = PendingRequest {
            gate: self,
            device: device.id(),
            resolved: false,
        };

        let (responder, receiver) = PermissionResponder::new();
        self.host.request_permission(device, responder);

        let state = match receiver.await {
            Ok(true) => PermissionState::Granted,
            Ok(false) => PermissionState::Denied,
            Err(_) => {
                warn!("Permission request for {} was dropped unanswered", device.id());
                PermissionState::Denied
            }
        };

        pending.resolved = true;
        self.set_state(device, state);
        Ok(state)
    }
}

struct PendingRequest<'a> {
    gate: &'a PermissionGate,
    device: DeviceId,
    resolved: bool,
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }

        debug!("Permission request for {} abandoned", self.device);
        self.gate
            .states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(self.device, PermissionState::Unknown);
    }
}
