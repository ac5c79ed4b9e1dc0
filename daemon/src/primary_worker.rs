use crate::shutdown::Shutdown;
use log::{info, warn};
use serial_led_usb::commands::LedCommand;
use serial_led_usb::controller::Controller;
use serial_led_usb::session::SessionState;
use tokio::sync::mpsc;
use tokio::task;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Connect,
    Send(LedCommand),
}

pub type DeviceSender = mpsc::Sender<DeviceCommand>;
pub type DeviceReceiver = mpsc::Receiver<DeviceCommand>;

// Owns the controller for the life of the program, so open / write / close never overlap.
pub async fn handle_commands(
    mut controller: Controller,
    mut command_rx: DeviceReceiver,
    mut shutdown: Shutdown,
) {
    connect(&mut controller).await;

    loop {
        tokio::select! {
            () = shutdown.recv() => {
                info!("Shutting down device worker");
                break;
            },
            Some(command) = command_rx.recv() => {
                match command {
                    DeviceCommand::Connect => connect(&mut controller).await,
                    DeviceCommand::Send(command) => {
                        // Writes block for up to the write timeout.
                        if let Err(error) = task::block_in_place(|| controller.send(command)) {
                            warn!("Unable to send '{}': {}", command, error);
                        }
                    }
                }
            }
        }
    }

    controller.teardown().await;
}

async fn connect(controller: &mut Controller) {
    if controller.state() == SessionState::Open {
        warn!("Already connected, ignoring connect request");
        return;
    }

    if let Err(error) = controller.setup().await {
        warn!("Connection setup did not complete: {}", error);
    }
}
