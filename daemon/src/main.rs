use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinError;
use tokio::{join, signal};

use crate::cli::Cli;
use crate::input::spawn_input_reader;
use crate::primary_worker::handle_commands;
use crate::settings::Settings;
use crate::shutdown::Shutdown;
use serial_led_usb::controller::Controller;
use serial_led_usb::device::default_host;
use serial_led_usb::session::SentLogPolicy;

mod cli;
mod input;
mod primary_worker;
mod settings;
mod shutdown;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    // stdout belongs to the event log, diagnostics go to stderr.
    CombinedLogger::init(vec![TermLogger::new(
        args.log_level.into(),
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )])
    .context("Could not configure the logger")?;

    info!("Starting Serial LED Control v{}", VERSION);

    let settings = match &args.config {
        Some(path) => Settings::read(path)?,
        None => Settings::default(),
    };
    let config = settings.session_config(&args);
    info!(
        "Using port {} at {}",
        config.port_index, config.parameters
    );
    if config.sent_log_policy == SentLogPolicy::Always {
        info!("'Sent data' is logged for every attempted write, including failed ones");
    }

    let shutdown = Shutdown::new();
    let controller = Controller::new(default_host(), config);

    // Subscribe before anything can be logged, so the display sees every line.
    let display_handle = tokio::spawn(display_event_log(controller.log().subscribe()));

    let (command_tx, command_rx) = mpsc::channel(8);
    let device_handle = tokio::spawn(handle_commands(controller, command_rx, shutdown.clone()));

    spawn_input_reader(command_tx, shutdown.clone());
    tokio::spawn(await_ctrl_c(shutdown.clone()));

    println!("Commands: on, off, connect, quit");

    // The display ends once the controller, and with it the event log, has been dropped.
    let (device_result, display_result) = join!(device_handle, display_handle);
    report_task("Device worker", device_result);
    report_task("Event display", display_result);
    info!("Shutdown complete");
    Ok(())
}

// A panicking task should still show up in the logs, even though shutdown carries on.
fn report_task(name: &str, result: Result<(), JoinError>) -> bool {
    match result {
        Ok(()) => true,
        Err(error) if error.is_panic() => {
            error!("{} panicked: {}", name, error);
            false
        }
        Err(error) => {
            warn!("{} did not finish: {}", name, error);
            false
        }
    }
}

async fn display_event_log(mut receiver: broadcast::Receiver<String>) {
    loop {
        match receiver.recv().await {
            Ok(line) => println!("{}", line),
            Err(RecvError::Lagged(skipped)) => warn!("Display fell behind, {} lines not shown", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

async fn await_ctrl_c(shutdown: Shutdown) {
    if signal::ctrl_c().await.is_ok() {
        shutdown.trigger();
    }
}
