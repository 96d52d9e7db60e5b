//! # Scan Management Module
//!
//! Runs the scan session on its own thread and feeds it everything that can
//! change it.
//!
//! ## Key Components
//! - `ScanManager`: owns the `ScanSession` and the `CommandDispatcher`
//! - `ScanCommand`: intents sent from the front end
//!
//! ## Event Loop
//! One `select!` over three sources, handled one at a time:
//! - front-end commands
//! - adapter events, in arrival order
//! - the auto-stop deadline (`never()` while idle)
//!
//! The loop exits when every command sender is dropped.

use crate::adapter::ScanAdapter;
use crate::device::DeviceIdentity;
use crate::dispatcher::{CommandDispatcher, LedColor};
use crate::publish::{SessionUpdate, StopReason};
use crate::session::ScanSession;
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanCommand {
    StartScan,
    StopScan,
    SelectDevice(DeviceIdentity),
    SendCommand(DeviceIdentity, LedColor),
}

pub struct ScanManager<A, D> {
    session: ScanSession<A>,
    dispatcher: D,
    command_receiver: Receiver<ScanCommand>,
}

impl<A: ScanAdapter, D: CommandDispatcher> ScanManager<A, D> {
    /// Creates a new ScanManager.
    ///
    /// Returns the manager and a sender for issuing commands from the UI thread.
    pub fn new(session: ScanSession<A>, dispatcher: D) -> (Self, Sender<ScanCommand>) {
        let (command_sender, command_receiver) = unbounded();

        let manager = ScanManager {
            session,
            dispatcher,
            command_receiver,
        };

        (manager, command_sender)
    }

    /// Register a front-end receiver for session updates
    pub fn subscribe(&mut self) -> Receiver<SessionUpdate> {
        self.session.publisher_mut().subscribe()
    }

    /// Runs the scan management loop.
    ///
    /// Call this from a dedicated thread. Blocks until the command channel is
    /// closed, then stops any active scan.
    pub fn run(mut self) {
        let commands = self.command_receiver.clone();
        let events = self.session.event_receiver();

        loop {
            let timer = match self.session.deadline() {
                Some(deadline) => crossbeam_channel::at(deadline),
                None => crossbeam_channel::never(),
            };

            select! {
                recv(commands) -> command => match command {
                    Ok(command) => self.handle_command(command),
                    Err(_) => break,
                },
                recv(events) -> event => {
                    if let Ok(event) = event {
                        self.session.handle_adapter_event(event);
                    }
                },
                recv(timer) -> _ => {
                    self.session.poll_timeout(Instant::now());
                },
            }
        }

        log::info!("Scan manager: Command channel closed, shutting down");
        self.session.stop_scan(StopReason::User);
    }

    fn handle_command(&mut self, command: ScanCommand) {
        log::debug!("Scan manager: {:?}", command);
        match command {
            ScanCommand::StartScan => {
                // Failures are already published as notifications
                let _ = self.session.start_scan(Instant::now());
            }
            ScanCommand::StopScan => {
                self.session.stop_scan(StopReason::User);
            }
            ScanCommand::SelectDevice(identity) => match self.session.select_device(&identity) {
                Some(handoff) => {
                    self.session
                        .publisher_mut()
                        .publish(SessionUpdate::DeviceSelected(handoff));
                }
                None => log::warn!("Scan manager: {} is not in the device list", identity),
            },
            ScanCommand::SendCommand(identity, action) => {
                let notification = self.dispatcher.dispatch(&identity, action);
                self.session.publisher_mut().notify(notification);
            }
        }
    }
}
