use crate::device::base::UsbHost;
use std::sync::Arc;

pub mod base;

// Linux and MacOS speak to CDC-ACM devices directly through libusb. Windows would need the
// interfaces bound to WinUSB first, which is left to the user.
mod libusb;
pub use crate::device::libusb::device::LibUsbHost;

pub fn default_host() -> Arc<dyn UsbHost> {
    Arc::new(LibUsbHost::new())
}
