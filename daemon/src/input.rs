use crate::primary_worker::{DeviceCommand, DeviceSender};
use crate::shutdown::Shutdown;
use log::{debug, warn};
use serial_led_usb::commands::LedCommand;
use std::io::BufRead;
use std::str::FromStr;
use std::thread;

#[derive(Debug, PartialEq, Eq)]
pub enum Input {
    Command(DeviceCommand),
    Quit,
    Empty,
    Unknown(String),
}

pub fn parse_input(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }

    if let Ok(command) = LedCommand::from_str(line) {
        return Input::Command(DeviceCommand::Send(command));
    }

    match line.to_lowercase().as_str() {
        "connect" => Input::Command(DeviceCommand::Connect),
        "quit" | "exit" => Input::Quit,
        _ => Input::Unknown(line.to_string()),
    }
}

// Reading stdin blocks, and tokio's own stdin would hold up runtime shutdown, so this gets a
// plain thread of its own. End of input is treated the same as 'quit'.
pub fn spawn_input_reader(sender: DeviceSender, shutdown: Shutdown) {
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(error) => {
                    warn!("Error reading input: {}", error);
                    break;
                }
            };

            match parse_input(&line) {
                Input::Command(command) => {
                    if sender.blocking_send(command).is_err() {
                        debug!("Device worker has stopped, ignoring further input");
                        return;
                    }
                }
                Input::Quit => break,
                Input::Empty => {}
                Input::Unknown(text) => {
                    warn!("Unknown command '{}', expected on, off, connect or quit", text)
                }
            }
        }
        shutdown.trigger();
    });
}
