use crate::device::base::{
    DeviceId, LineParameters, PermissionResponder, SerialDevice, SerialPort, UsbHost,
};
use crate::device::libusb::cdc::{
    line_coding, union_interfaces, CLASS_CDC_DATA, CLASS_COMMUNICATIONS, CONTROL_LINE_DTR,
    CONTROL_LINE_RTS, SET_CONTROL_LINE_STATE, SET_LINE_CODING, SUBCLASS_ACM,
};
use crate::error::{ConnectError, PortError};
use log::{debug, info, warn};
use rusb::{
    ConfigDescriptor, Device, DeviceDescriptor, DeviceHandle, Direction, GlobalContext, Recipient,
    RequestType, TransferType,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// A CDC-ACM port is a pair of interfaces, the communications interface takes the class requests,
// and the data interface carries the bulk endpoints.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct PortLayout {
    control_interface: u8,
    data_interface: u8,
    data_setting: u8,
    read_endpoint: u8,
    write_endpoint: u8,
}

pub struct LibUsbHost {
    timeout: Duration,
}

impl LibUsbHost {
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(1),
        }
    }
}

impl Default for LibUsbHost {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbHost for LibUsbHost {
    fn list_devices(&self) -> Vec<SerialDevice> {
        find_devices()
    }

    fn has_permission(&self, device: &SerialDevice) -> bool {
        match find_device(device.id()) {
            Ok((usb_device, _)) => device_accessible(&usb_device),
            Err(_) => false,
        }
    }

    fn request_permission(&self, device: &SerialDevice, responder: PermissionResponder) {
        // There's no consent dialog with libusb, the answer is whether the OS lets us open it.
        let (usb_device, _) = match find_device(device.id()) {
            Ok(found) => found,
            Err(error) => {
                warn!("Unable to locate {} for permission check: {}", device.id(), error);
                responder.deny();
                return;
            }
        };

        match usb_device.open() {
            Ok(_) => responder.grant(),
            Err(rusb::Error::Access) => {
                info!(
                    "Access to {} refused, check the udev rules for {:04x}:{:04x}",
                    device.id(),
                    device.vendor_id(),
                    device.product_id()
                );
                responder.deny();
            }
            Err(error) => {
                warn!("Error opening {} for permission check: {}", device.id(), error);
                responder.deny();
            }
        }
    }

    fn open_port(
        &self,
        device: &SerialDevice,
        port_index: usize,
    ) -> Result<Arc<dyn SerialPort>, ConnectError> {
        let (usb_device, _) = find_device(device.id())?;
        let config = read_config(&usb_device)?;
        let layout = probe_ports(&config)
            .get(port_index)
            .copied()
            .ok_or(ConnectError::PortNotFound(port_index))?;

        let handle = usb_device.open()?;
        info!("Opened USB device at {:?}", usb_device);

        // Not every platform supports detaching (MacOS doesn't), carry on and let the claim decide.
        if let Err(error) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable: {}", error);
        }

        for interface in [layout.control_interface, layout.data_interface] {
            if let Err(error) = handle.claim_interface(interface) {
                warn!("Unable to claim interface {}: {}", interface, error);
                return Err(ConnectError::DeviceNotClaimed);
            }
        }

        // The bulk endpoints may only exist on a later alternate setting of the data interface.
        if layout.data_setting != 0 {
            handle.set_alternate_setting(layout.data_interface, layout.data_setting)?;
        }

        let port = CdcAcmPort {
            handle,
            layout,
            timeout: self.timeout,
        };

        // Plenty of firmware (Arduino included) won't transmit until the host raises DTR.
        port.write_class_control(SET_CONTROL_LINE_STATE, CONTROL_LINE_DTR | CONTROL_LINE_RTS, &[])?;

        let port: Arc<dyn SerialPort> = Arc::new(port);
        Ok(port)
    }
}

pub struct CdcAcmPort {
    handle: DeviceHandle<GlobalContext>,
    layout: PortLayout,
    timeout: Duration,
}

impl CdcAcmPort {
    fn write_class_control(&self, request: u8, value: u16, data: &[u8]) -> Result<(), rusb::Error> {
        self.handle.write_control(
            rusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface),
            request,
            value,
            self.layout.control_interface as u16,
            data,
            self.timeout,
        )?;

        Ok(())
    }
}

impl SerialPort for CdcAcmPort {
    fn set_parameters(&self, parameters: &LineParameters) -> Result<(), PortError> {
        debug!("Setting line parameters {}", parameters);
        self.write_class_control(SET_LINE_CODING, 0, &line_coding(parameters))?;
        Ok(())
    }

    fn read(&self, buffer: &mut [u8], timeout: Duration) -> Result<usize, PortError> {
        Ok(self
            .handle
            .read_bulk(self.layout.read_endpoint, buffer, timeout)?)
    }

    fn write(&self, data: &[u8], timeout: Duration) -> Result<usize, PortError> {
        Ok(self
            .handle
            .write_bulk(self.layout.write_endpoint, data, timeout)?)
    }

    fn close(&self) -> Result<(), PortError> {
        // Interfaces are released when the handle drops, all that's left is dropping DTR / RTS.
        self.write_class_control(SET_CONTROL_LINE_STATE, 0, &[])?;
        Ok(())
    }
}

fn find_device(id: DeviceId) -> Result<(Device<GlobalContext>, DeviceDescriptor), ConnectError> {
    for usb_device in rusb::devices()?.iter() {
        if usb_device.bus_number() == id.bus_number && usb_device.address() == id.address {
            let descriptor = usb_device.device_descriptor()?;
            return Ok((usb_device, descriptor));
        }
    }
    Err(ConnectError::DeviceNotFound)
}

fn read_config(device: &Device<GlobalContext>) -> Result<ConfigDescriptor, rusb::Error> {
    device
        .active_config_descriptor()
        .or_else(|_| device.config_descriptor(0))
}

fn probe_ports(config: &ConfigDescriptor) -> Vec<PortLayout> {
    let mut owners = HashMap::new();
    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            if descriptor.class_code() != CLASS_COMMUNICATIONS
                || descriptor.sub_class_code() != SUBCLASS_ACM
            {
                continue;
            }
            if let Some((control, subordinates)) = union_interfaces(descriptor.extra()) {
                for data in subordinates {
                    owners.insert(data, control);
                }
            }
        }
    }

    let mut ports = vec![];
    let mut previous_control = None;

    for interface in config.interfaces() {
        for descriptor in interface.descriptors() {
            match descriptor.class_code() {
                CLASS_COMMUNICATIONS if descriptor.sub_class_code() == SUBCLASS_ACM => {
                    previous_control = Some(descriptor.interface_number());
                    break;
                }
                CLASS_CDC_DATA => {
                    let mut read_endpoint = None;
                    let mut write_endpoint = None;
                    for endpoint in descriptor.endpoint_descriptors() {
                        if endpoint.transfer_type() != TransferType::Bulk {
                            continue;
                        }
                        match endpoint.direction() {
                            Direction::In => read_endpoint = Some(endpoint.address()),
                            Direction::Out => write_endpoint = Some(endpoint.address()),
                        }
                    }

                    // Data interfaces often have an empty alternate setting 0, keep looking.
                    if let (Some(read_endpoint), Some(write_endpoint)) =
                        (read_endpoint, write_endpoint)
                    {
                        let data_interface = descriptor.interface_number();
                        let preceding = previous_control.take();
                        ports.push(PortLayout {
                            control_interface: pair_control(data_interface, &owners, preceding),
                            data_interface,
                            data_setting: descriptor.setting_number(),
                            read_endpoint,
                            write_endpoint,
                        });
                        break;
                    }
                }
                _ => {}
            }
        }
    }

    ports
}

// The Union descriptor is authoritative, interface order is only a guess when it's missing.
fn pair_control(data_interface: u8, owners: &HashMap<u8, u8>, preceding: Option<u8>) -> u8 {
    if let Some(control) = owners.get(&data_interface) {
        return *control;
    }

    match preceding {
        Some(control) => {
            debug!(
                "No union descriptor for data interface {}, pairing with {}",
                data_interface, control
            );
            control
        }
        None => {
            warn!(
                "No communications interface for data interface {}, sending class requests to it",
                data_interface
            );
            data_interface
        }
    }
}

fn read_product_name(device: &Device<GlobalContext>, descriptor: &DeviceDescriptor) -> String {
    let fallback = format!(
        "{:04x}:{:04x}",
        descriptor.vendor_id(),
        descriptor.product_id()
    );

    // Without access we can't read strings, the IDs will have to do.
    let Ok(handle) = device.open() else {
        return fallback;
    };

    let timeout = Duration::from_millis(100);
    handle
        .read_languages(timeout)
        .ok()
        .and_then(|languages| languages.first().copied())
        .and_then(|language| {
            handle
                .read_product_string(language, descriptor, timeout)
                .ok()
        })
        .unwrap_or(fallback)
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        use nix::unistd::{access, AccessFlags};

        // usbfs nodes carry the permissions udev assigned, checking them avoids a trial open.
        fn device_accessible(device: &Device<GlobalContext>) -> bool {
            let path = format!("/dev/bus/usb/{:03}/{:03}", device.bus_number(), device.address());
            access(path.as_str(), AccessFlags::R_OK | AccessFlags::W_OK).is_ok()
        }
    } else {
        fn device_accessible(device: &Device<GlobalContext>) -> bool {
            device.open().is_ok()
        }
    }
}

pub fn find_devices() -> Vec<SerialDevice> {
    let mut found_devices: Vec<SerialDevice> = Vec::new();

    let devices = match rusb::devices() {
        Ok(devices) => devices,
        Err(error) => {
            warn!("Unable to list USB devices: {}", error);
            return found_devices;
        }
    };

    for device in devices.iter() {
        let Ok(descriptor) = device.device_descriptor() else {
            debug!("Unable to read descriptor for {:?}, skipping", device);
            continue;
        };

        let config = match read_config(&device) {
            Ok(config) => config,
            Err(error) => {
                debug!("Unable to read configuration for {:?}: {}", device, error);
                continue;
            }
        };

        let ports = probe_ports(&config);
        if ports.is_empty() {
            continue;
        }

        let id = DeviceId {
            bus_number: device.bus_number(),
            address: device.address(),
        };
        debug!("Found CDC-ACM device at {} with {} port(s)", id, ports.len());

        found_devices.push(SerialDevice::new(
            id,
            descriptor.vendor_id(),
            descriptor.product_id(),
            read_product_name(&device, &descriptor),
            ports.len(),
        ));
    }

    found_devices
}
