use crate::error::{ConnectError, PortError};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

// The host side of the connection, enumeration, permissions, and handing out ports. The libusb
// implementation lives in the libusb module, tests provide their own.
pub trait UsbHost: Send + Sync {
    fn list_devices(&self) -> Vec<SerialDevice>;
    fn has_permission(&self, device: &SerialDevice) -> bool;

    /// Ask the host for access to the device. The host must answer through the responder, and
    /// dropping it unanswered counts as a denial.
    fn request_permission(&self, device: &SerialDevice, responder: PermissionResponder);

    fn open_port(
        &self,
        device: &SerialDevice,
        port_index: usize,
    ) -> Result<Arc<dyn SerialPort>, ConnectError>;
}

// Reads and writes may happen at the same time from different threads, so everything takes &self.
pub trait SerialPort: Send + Sync {
    fn set_parameters(&self, parameters: &LineParameters) -> Result<(), PortError>;
    fn read(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize, PortError>;
    fn write(&self, data: &[u8], timeout: Duration) -> Result<usize, PortError>;
    fn close(&self) -> Result<(), PortError>;
}

// Bus number and address are enough to find the device again after a permission prompt.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub bus_number: u8,
    pub address: u8,
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}:{:03}", self.bus_number, self.address)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialDevice {
    pub(crate) id: DeviceId,
    pub(crate) vendor_id: u16,
    pub(crate) product_id: u16,
    pub(crate) product_name: String,
    pub(crate) port_count: usize,
}

impl SerialDevice {
    pub fn new(
        id: DeviceId,
        vendor_id: u16,
        product_id: u16,
        product_name: impl Into<String>,
        port_count: usize,
    ) -> Self {
        Self {
            id,
            vendor_id,
            product_id,
            product_name: product_name.into(),
            port_count,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }
    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }
    pub fn product_id(&self) -> u16 {
        self.product_id
    }
    pub fn product_name(&self) -> &str {
        &self.product_name
    }
    pub fn port_count(&self) -> usize {
        self.port_count
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PermissionState {
    Unknown,
    Requested,
    Granted,
    Denied,
}

/// One-shot answer to a single permission request.
#[derive(Debug)]
pub struct PermissionResponder {
    sender: oneshot::Sender<bool>,
}

impl PermissionResponder {
    pub(crate) fn new() -> (Self, oneshot::Receiver<bool>) {
        let (sender, receiver) = oneshot::channel();
        (Self { sender }, receiver)
    }

    pub fn grant(self) {
        self.respond(true);
    }

    pub fn deny(self) {
        self.respond(false);
    }

    pub fn respond(self, granted: bool) {
        // The requester may have gone away, nothing to tell it then.
        let _ = self.sender.send(granted);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Parity {
    None,
    Odd,
    Even,
    Mark,
    Space,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LineParameters {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl Default for LineParameters {
    fn default() -> Self {
        Self {
            baud_rate: 115200,
            data_bits: 8,
            stop_bits: StopBits::One,
            parity: Parity::None,
        }
    }
}

impl Display for LineParameters {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Odd => 'O',
            Parity::Even => 'E',
            Parity::Mark => 'M',
            Parity::Space => 'S',
        };
        let stop_bits = match self.stop_bits {
            StopBits::One => "1",
            StopBits::OnePointFive => "1.5",
            StopBits::Two => "2",
        };
        write!(
            f,
            "{}-{}-{}-{}",
            self.baud_rate, self.data_bits, parity, stop_bits
        )
    }
}
