//! Host configuration protocol.
//!
//! The configurator talks to the keyboard over a raw HID interface in
//! 64-byte packets: byte 0 is the command id, the rest is the command
//! payload, all multi-byte fields little-endian. Responses echo the command
//! id, or `0xFF` on failure. The transport itself (USB raw HID endpoints) is
//! an external collaborator; it hands request packets to
//! [`HostService::process`] and ships the response packets back.

mod process;
pub mod protocol;

pub use process::HostService;
