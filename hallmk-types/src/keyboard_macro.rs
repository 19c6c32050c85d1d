//! Macro sequences.

use num_enum::FromPrimitive;
use serde::{Deserialize, Serialize};

use crate::keycode::KeyCode;
use crate::MAX_MACRO_EVENTS;

/// One step of a macro sequence.
///
/// On the wire each operation is 2 bytes, `[operand, action]`: the operand is
/// the keycode byte, or the delay in 10 ms units for `Delay`.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MacroOperation {
    /// End of sequence
    #[default]
    End,
    /// Press and release
    Tap(KeyCode),
    /// Press only
    Press(KeyCode),
    /// Release only
    Release(KeyCode),
    /// Suspend playback, in units of 10 ms
    Delay(u8),
}

impl MacroOperation {
    const TAG_END: u8 = 0;
    const TAG_TAP: u8 = 1;
    const TAG_PRESS: u8 = 2;
    const TAG_RELEASE: u8 = 3;
    const TAG_DELAY: u8 = 4;

    /// Wire pair of this operation.
    pub fn to_wire(self) -> [u8; 2] {
        match self {
            MacroOperation::End => [0, Self::TAG_END],
            MacroOperation::Tap(keycode) => [keycode.into(), Self::TAG_TAP],
            MacroOperation::Press(keycode) => [keycode.into(), Self::TAG_PRESS],
            MacroOperation::Release(keycode) => [keycode.into(), Self::TAG_RELEASE],
            MacroOperation::Delay(units) => [units, Self::TAG_DELAY],
        }
    }

    /// Decode a wire pair. An unknown action byte ends the sequence.
    pub fn from_wire(operand: u8, action: u8) -> Self {
        match action {
            Self::TAG_TAP => MacroOperation::Tap(KeyCode::from_primitive(operand)),
            Self::TAG_PRESS => MacroOperation::Press(KeyCode::from_primitive(operand)),
            Self::TAG_RELEASE => MacroOperation::Release(KeyCode::from_primitive(operand)),
            Self::TAG_DELAY => MacroOperation::Delay(operand),
            _ => MacroOperation::End,
        }
    }
}

/// A macro sequence of up to [`MAX_MACRO_EVENTS`] operations, terminated
/// early by [`MacroOperation::End`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacroSequence {
    pub events: [MacroOperation; MAX_MACRO_EVENTS],
}

impl MacroSequence {
    /// Packed size of one sequence: 2 bytes per operation.
    pub const PACKED_BYTES: usize = 2 * MAX_MACRO_EVENTS;

    pub const fn const_default() -> Self {
        Self {
            events: [MacroOperation::End; MAX_MACRO_EVENTS],
        }
    }

    /// Serialize into the packed storage layout.
    pub fn pack_into(&self, out: &mut [u8]) -> usize {
        for (i, event) in self.events.iter().enumerate() {
            let wire = event.to_wire();
            out[2 * i] = wire[0];
            out[2 * i + 1] = wire[1];
        }
        Self::PACKED_BYTES
    }

    /// Deserialize from the packed storage layout.
    pub fn unpack_from(buf: &[u8]) -> Self {
        let mut sequence = Self::const_default();
        for (i, event) in sequence.events.iter_mut().enumerate() {
            *event = MacroOperation::from_wire(buf[2 * i], buf[2 * i + 1]);
        }
        sequence
    }
}

impl Default for MacroSequence {
    fn default() -> Self {
        Self::const_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_round_trip() {
        let mut sequence = MacroSequence::const_default();
        sequence.events[0] = MacroOperation::Press(KeyCode::LShift);
        sequence.events[1] = MacroOperation::Tap(KeyCode::A);
        sequence.events[2] = MacroOperation::Delay(25);
        sequence.events[3] = MacroOperation::Release(KeyCode::LShift);

        let mut buf = [0u8; MacroSequence::PACKED_BYTES];
        assert_eq!(sequence.pack_into(&mut buf), MacroSequence::PACKED_BYTES);
        assert_eq!(MacroSequence::unpack_from(&buf), sequence);
    }

    #[test]
    fn test_unknown_action_ends_sequence() {
        assert_eq!(MacroOperation::from_wire(10, 0x7F), MacroOperation::End);
    }
}
