#[derive(thiserror::Error, Debug)]
pub enum ConnectError {
    #[error("No USB devices found")]
    DeviceNotFound,

    #[error("USB permission denied")]
    PermissionDenied,

    #[error("A permission request is already pending for this device")]
    PermissionPending,

    #[error("A serial session is already open")]
    AlreadyOpen,

    #[error("Device has no serial port at index {0}")]
    PortNotFound(usize),

    #[error("Unable to Claim Interface")]
    DeviceNotClaimed,

    #[error("Unable to configure port: {0}")]
    Configure(#[from] PortError),

    #[error("USB error: {0}")]
    UsbError(#[from] rusb::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum PortError {
    #[error("Serial port is not open")]
    NotOpen,

    #[error("Operation timed out")]
    Timeout,

    #[error("Device has been disconnected")]
    Disconnected,

    #[error("USB error: {0}")]
    UsbError(rusb::Error),
}

impl PortError {
    /// Errors after which the port cannot be used again, and the session must close.
    pub fn is_terminal(&self) -> bool {
        match self {
            PortError::NotOpen | PortError::Disconnected => true,
            PortError::UsbError(error) => matches!(
                error,
                rusb::Error::NoDevice | rusb::Error::NotFound | rusb::Error::Io | rusb::Error::Pipe
            ),
            PortError::Timeout => false,
        }
    }
}

impl From<rusb::Error> for PortError {
    fn from(error: rusb::Error) -> Self {
        match error {
            rusb::Error::Timeout => PortError::Timeout,
            rusb::Error::NoDevice => PortError::Disconnected,
            error => PortError::UsbError(error),
        }
    }
}
