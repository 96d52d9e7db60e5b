mod adapter;
mod config;
mod console;
mod device;
mod device_scanner;
mod dispatcher;
mod error;
mod ledger;
mod permissions;
mod publish;
mod scan_manager;
mod session;

use adapter::Radio;
use config::Config;
use console::ConsoleInput;
use device_scanner::BtleplugAdapter;
use dispatcher::NotifyingDispatcher;
use permissions::PermissionSet;
use scan_manager::{ScanCommand, ScanManager};
use session::ScanSession;
use std::io::BufRead;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{}. Falling back to defaults.", e);
            Config::default()
        }
    };

    let radio = Radio::from(BtleplugAdapter::new());
    let session = ScanSession::new(radio, PermissionSet::all(), &config);

    // Create the scan manager
    let (mut manager, command_sender) = ScanManager::new(session, NotifyingDispatcher);
    let updates = manager.subscribe();

    // The manager thread owns all session state; the renderer only sees
    // published updates
    let manager_thread = std::thread::spawn(move || {
        manager.run();
    });
    let label = config.unknown_name_label.clone();
    let render_thread = std::thread::spawn(move || {
        console::render(updates, label);
    });

    println!("{}", console::HELP);
    if command_sender.send(ScanCommand::StartScan).is_err() {
        log::error!("Scan manager exited before the first scan");
        return ExitCode::FAILURE;
    }

    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to read input: {}", e);
                break;
            }
        };

        match console::parse_line(&line) {
            Ok(ConsoleInput::Command(command)) => {
                if command_sender.send(command).is_err() {
                    log::error!("Scan manager is gone");
                    break;
                }
            }
            Ok(ConsoleInput::Help) => println!("{}", console::HELP),
            Ok(ConsoleInput::Quit) => break,
            Ok(ConsoleInput::Empty) => {}
            Err(e) => println!("{}", e),
        }
    }

    drop(command_sender);
    if manager_thread.join().is_err() || render_thread.join().is_err() {
        log::error!("Worker thread panicked");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
