//! # Command Dispatcher Module
//!
//! Maps a user-chosen action on a selected device to its effect.
//!
//! Only `NotifyingDispatcher` exists today and it talks to nothing: the
//! resulting notification is the whole effect. Real device control (GATT
//! writes to an LED characteristic) belongs behind `CommandDispatcher`.

use crate::device::DeviceIdentity;
use crate::publish::Notification;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedColor {
    Blue,
    Red,
    Green,
}

impl fmt::Display for LedColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedColor::Blue => write!(f, "Blue"),
            LedColor::Red => write!(f, "Red"),
            LedColor::Green => write!(f, "Green"),
        }
    }
}

impl FromStr for LedColor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "blue" => Ok(LedColor::Blue),
            "red" => Ok(LedColor::Red),
            "green" => Ok(LedColor::Green),
            other => Err(format!("unknown LED color `{}`", other)),
        }
    }
}

pub trait CommandDispatcher {
    fn dispatch(&mut self, device: &DeviceIdentity, action: LedColor) -> Notification;
}

#[derive(Debug, Default)]
pub struct NotifyingDispatcher;

impl CommandDispatcher for NotifyingDispatcher {
    fn dispatch(&mut self, device: &DeviceIdentity, action: LedColor) -> Notification {
        log::debug!("Dispatching {:?} to {}", action, device);
        Notification::CommandSent {
            device: device.clone(),
            action,
        }
    }
}
