//! # hallmk types
//!
//! Fundamental type definitions shared between the hallmk firmware core and
//! host-side tooling.
//!
//! ## Modules
//!
//! - [`keycode`] - The 8-bit keycode space: HID keycodes, momentary layers,
//!   profile selection and special firmware keycodes
//! - [`config`] - Per-key actuation and advanced-key configuration
//! - [`gamepad`] - Gamepad button map and options
//! - [`keyboard_macro`] - Macro sequences
//! - [`profile`] - The per-profile configuration image

#![no_std]

pub mod config;
pub mod gamepad;
pub mod keyboard_macro;
pub mod keycode;
pub mod profile;

/// Firmware version word reported over the configuration protocol.
pub const FIRMWARE_VERSION: u16 = 0x0106;

/// Number of advanced-key slots per profile.
pub const ADVANCED_KEY_MAX_NUM: usize = 32;

/// Number of macro sequences shared by all profiles.
pub const NUM_MACROS: usize = 16;

/// Maximum number of events in a single macro sequence.
pub const MAX_MACRO_EVENTS: usize = 16;

/// Maximum number of trigger keys of a combo.
pub const COMBO_MAX_KEYS: usize = 4;
