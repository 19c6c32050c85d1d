//! Exposed channels which connect the core to its transport and storage
//! collaborators.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::hid::Report;
pub use crate::storage::FLASH_CHANNEL;

pub const REPORT_CHANNEL_SIZE: usize = 16;

/// Channel for reports from the core to the HID transport task.
pub static KEYBOARD_REPORT_CHANNEL: Channel<CriticalSectionRawMutex, Report, REPORT_CHANNEL_SIZE> = Channel::new();
