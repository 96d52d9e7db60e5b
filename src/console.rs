//! # Console Front End Module
//!
//! Minimal line-oriented stand-in for a real UI: turns typed lines into
//! `ScanCommand`s and prints whatever the session publishes.
//!
//! ## Commands
//! - `scan` / `stop`: start or stop a scan
//! - `select <address>`: hand a device forward
//! - `led <address> <blue|red|green>`: send an LED command
//! - `help`, `quit`

use crate::device::DeviceIdentity;
use crate::dispatcher::LedColor;
use crate::publish::{Notification, SessionUpdate};
use crate::scan_manager::ScanCommand;
use crate::session::{ScanStatus, SessionSnapshot};
use crossbeam_channel::Receiver;

pub const HELP: &str = "\
Commands:
  scan                          start a scan
  stop                          stop the running scan
  select <address>              select a discovered device
  led <address> <blue|red|green>  send an LED command
  help                          show this text
  quit                          exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(ScanCommand),
    Help,
    Quit,
    Empty,
}

pub fn parse_line(line: &str) -> Result<ConsoleInput, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(ConsoleInput::Empty);
    };

    let input = match verb.to_lowercase().as_str() {
        "scan" | "start" => ConsoleInput::Command(ScanCommand::StartScan),
        "stop" => ConsoleInput::Command(ScanCommand::StopScan),
        "select" => {
            let address = words.next().ok_or("usage: select <address>")?;
            ConsoleInput::Command(ScanCommand::SelectDevice(DeviceIdentity::new(address)))
        }
        "led" => {
            let address = words.next().ok_or("usage: led <address> <blue|red|green>")?;
            let color = words
                .next()
                .ok_or("usage: led <address> <blue|red|green>")?
                .parse::<LedColor>()?;
            ConsoleInput::Command(ScanCommand::SendCommand(DeviceIdentity::new(address), color))
        }
        "help" | "?" => ConsoleInput::Help,
        "quit" | "exit" | "q" => ConsoleInput::Quit,
        other => return Err(format!("unknown command `{}`, try `help`", other)),
    };

    if words.next().is_some() {
        return Err(format!("too many arguments for `{}`", verb));
    }
    Ok(input)
}

/// Prints session updates until the session goes away
pub fn render(updates: Receiver<SessionUpdate>, unknown_name_label: String) {
    let mut last = SessionSnapshot {
        status: ScanStatus::Idle,
        devices: Vec::new(),
    };

    for update in updates.iter() {
        match update {
            SessionUpdate::Snapshot(snapshot) => {
                // A shorter list means a new scan reset it
                let already_printed = if snapshot.device_count() < last.device_count() {
                    0
                } else {
                    last.device_count()
                };
                for device in &snapshot.devices[already_printed..] {
                    println!("  + {}  {}", device.identity, device.name_or(&unknown_name_label));
                }
                last = snapshot;
            }
            SessionUpdate::Notification(notification) => {
                println!("{}", notification);
                if let Notification::ScanStopped(_) = notification {
                    print_device_list(&last, &unknown_name_label);
                }
            }
            SessionUpdate::DeviceSelected(handoff) => {
                println!("Selected device");
                println!("  Name: {}", handoff.display_name);
                println!("  Address: {}", handoff.identity);
            }
        }
    }
}

fn print_device_list(snapshot: &SessionSnapshot, unknown_name_label: &str) {
    println!("Detected devices ({}):", snapshot.device_count());
    for device in &snapshot.devices {
        println!(
            "  Name: {}  Address: {}  First seen: {}",
            device.name_or(unknown_name_label),
            device.identity,
            device.first_seen_at.format("%H:%M:%S")
        );
    }
}
