//! HID report state and the reporting seam.
//!
//! Report descriptors and the USB/BLE transport are external collaborators.
//! The core tracks which keycodes are held, and a [`HidReporter`] turns that
//! state into reports for the transport whenever the layout engine signals
//! that something changed.

use core::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use bitfield_struct::bitfield;
use hallmk_types::keycode::KeyCode;
use usbd_hid::descriptor::{KeyboardReport, MouseReport};

use crate::channel::KEYBOARD_REPORT_CHANNEL;

/// The modifier byte of the keyboard HID report.
#[bitfield(u8, order = Lsb)]
#[derive(Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HidModifiers {
    #[bits(1)]
    pub left_ctrl: bool,
    #[bits(1)]
    pub left_shift: bool,
    #[bits(1)]
    pub left_alt: bool,
    #[bits(1)]
    pub left_gui: bool,
    #[bits(1)]
    pub right_ctrl: bool,
    #[bits(1)]
    pub right_shift: bool,
    #[bits(1)]
    pub right_alt: bool,
    #[bits(1)]
    pub right_gui: bool,
}

impl BitOr for HidModifiers {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self::from_bits(self.into_bits() | rhs.into_bits())
    }
}

impl BitAnd for HidModifiers {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self::from_bits(self.into_bits() & rhs.into_bits())
    }
}

impl Not for HidModifiers {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self::from_bits(!self.into_bits())
    }
}

impl BitOrAssign for HidModifiers {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = *self | rhs;
    }
}

impl BitAndAssign for HidModifiers {
    fn bitand_assign(&mut self, rhs: Self) {
        *self = *self & rhs;
    }
}

/// Reports produced by the core for the transport collaborator.
pub enum Report {
    /// Normal keyboard hid report
    Keyboard(KeyboardReport),
    /// Mouse hid report
    Mouse(MouseReport),
}

/// The reporting seam between the layout engine and the HID transport.
pub trait HidReporter {
    /// Add a keycode to the report state.
    fn keycode_add(&mut self, keycode: KeyCode);

    /// Remove a keycode from the report state.
    fn keycode_remove(&mut self, keycode: KeyCode);

    /// Emit reports for the current state.
    fn send_reports(&mut self);
}

/// Held keycodes of the keyboard report: the modifier byte plus six regular
/// key slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyboardReportState {
    held_modifiers: HidModifiers,
    held_keycodes: [KeyCode; 6],
}

impl Default for KeyboardReportState {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyboardReportState {
    pub const fn new() -> Self {
        Self {
            held_modifiers: HidModifiers::new(),
            held_keycodes: [KeyCode::No; 6],
        }
    }

    pub fn add(&mut self, keycode: KeyCode) {
        if keycode.is_modifier() {
            self.held_modifiers = HidModifiers::from_bits(self.held_modifiers.into_bits() | keycode.modifier_bit());
        } else if keycode.is_hid() && !self.held_keycodes.contains(&keycode) {
            if let Some(slot) = self.held_keycodes.iter_mut().find(|kc| **kc == KeyCode::No) {
                *slot = keycode;
            } else {
                warn!("Keyboard report full, dropping keycode");
            }
        }
    }

    pub fn remove(&mut self, keycode: KeyCode) {
        if keycode.is_modifier() {
            self.held_modifiers = HidModifiers::from_bits(self.held_modifiers.into_bits() & !keycode.modifier_bit());
        } else if let Some(slot) = self.held_keycodes.iter_mut().find(|kc| **kc == keycode) {
            *slot = KeyCode::No;
        }
    }

    pub fn modifiers(&self) -> HidModifiers {
        self.held_modifiers
    }

    pub fn keycodes(&self) -> [KeyCode; 6] {
        self.held_keycodes
    }

    pub fn as_report(&self) -> KeyboardReport {
        KeyboardReport {
            modifier: self.held_modifiers.into_bits(),
            reserved: 0,
            leds: 0,
            keycodes: self.held_keycodes.map(|kc| kc.into()),
        }
    }
}

/// Reporter that publishes reports to [`KEYBOARD_REPORT_CHANNEL`], from where
/// the transport task drains them.
#[derive(Default)]
pub struct ChannelReporter {
    state: KeyboardReportState,
}

impl ChannelReporter {
    pub const fn new() -> Self {
        Self {
            state: KeyboardReportState::new(),
        }
    }
}

impl HidReporter for ChannelReporter {
    fn keycode_add(&mut self, keycode: KeyCode) {
        self.state.add(keycode);
    }

    fn keycode_remove(&mut self, keycode: KeyCode) {
        self.state.remove(keycode);
    }

    fn send_reports(&mut self) {
        if KEYBOARD_REPORT_CHANNEL
            .try_send(Report::Keyboard(self.state.as_report()))
            .is_err()
        {
            // The transport stalled; the next changed report still reflects
            // the full current state, so dropping this one is lossless.
            warn!("Report channel full, dropping keyboard report");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_tracking() {
        let mut state = KeyboardReportState::new();
        state.add(KeyCode::LShift);
        state.add(KeyCode::RCtrl);
        assert_eq!(state.as_report().modifier, 0x12);
        state.remove(KeyCode::LShift);
        assert_eq!(state.as_report().modifier, 0x10);
    }

    #[test]
    fn test_keycode_slots() {
        let mut state = KeyboardReportState::new();
        state.add(KeyCode::A);
        state.add(KeyCode::B);
        state.add(KeyCode::A);
        let report = state.as_report();
        assert_eq!(report.keycodes[0], KeyCode::A as u8);
        assert_eq!(report.keycodes[1], KeyCode::B as u8);
        assert_eq!(report.keycodes[2], 0);

        state.remove(KeyCode::A);
        assert_eq!(state.as_report().keycodes[0], 0);
        assert_eq!(state.as_report().keycodes[1], KeyCode::B as u8);
    }

    #[test]
    fn test_register_unregister_round_trip() {
        let mut state = KeyboardReportState::new();
        let baseline = state.as_report().keycodes;
        state.add(KeyCode::C);
        state.remove(KeyCode::C);
        assert_eq!(state.as_report().keycodes, baseline);
    }
}
