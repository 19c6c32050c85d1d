//! The per-profile configuration image.

use crate::config::{Actuation, AdvancedKey, ADVANCED_KEY_BYTES};
use crate::gamepad::{GamepadButton, GamepadFlags, GamepadOptions};
use crate::keycode::KeyCode;
use crate::ADVANCED_KEY_MAX_NUM;

use num_enum::FromPrimitive;

/// One keyboard profile: layered keymap, per-key actuation, advanced keys and
/// the gamepad map. Runtime code treats this as read-only; it is mutated only
/// through the configuration-update paths.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Profile<const NUM_KEYS: usize, const NUM_LAYERS: usize> {
    pub keymap: [[KeyCode; NUM_KEYS]; NUM_LAYERS],
    pub actuation_map: [Actuation; NUM_KEYS],
    pub advanced_keys: [AdvancedKey; ADVANCED_KEY_MAX_NUM],
    pub gamepad_buttons: [GamepadButton; NUM_KEYS],
    pub gamepad_options: GamepadOptions,
}

impl<const NUM_KEYS: usize, const NUM_LAYERS: usize> Profile<NUM_KEYS, NUM_LAYERS> {
    /// Packed size of one profile in persistent storage.
    pub const PACKED_BYTES: usize = NUM_LAYERS * NUM_KEYS
        + 4 * NUM_KEYS
        + ADVANCED_KEY_MAX_NUM * ADVANCED_KEY_BYTES
        + NUM_KEYS
        + 9;

    pub const fn const_default() -> Self {
        Self {
            keymap: [[KeyCode::No; NUM_KEYS]; NUM_LAYERS],
            actuation_map: [Actuation::const_default(); NUM_KEYS],
            advanced_keys: [AdvancedKey::const_default(); ADVANCED_KEY_MAX_NUM],
            gamepad_buttons: [GamepadButton::None; NUM_KEYS],
            gamepad_options: GamepadOptions::const_default(),
        }
    }

    /// Serialize into the packed storage layout. `out` must hold at least
    /// [`Self::PACKED_BYTES`] bytes; the number of bytes written is returned.
    pub fn pack_into(&self, out: &mut [u8]) -> usize {
        let mut at = 0;
        for layer in &self.keymap {
            for kc in layer {
                out[at] = (*kc).into();
                at += 1;
            }
        }
        for act in &self.actuation_map {
            out[at] = act.actuation_point;
            out[at + 1] = act.rt_down;
            out[at + 2] = act.rt_up;
            out[at + 3] = act.continuous as u8;
            at += 4;
        }
        for ak in &self.advanced_keys {
            let mut buf = [0u8; ADVANCED_KEY_BYTES];
            ak.pack_into(&mut buf);
            out[at..at + ADVANCED_KEY_BYTES].copy_from_slice(&buf);
            at += ADVANCED_KEY_BYTES;
        }
        for btn in &self.gamepad_buttons {
            out[at] = (*btn).into();
            at += 1;
        }
        for point in &self.gamepad_options.analog_curve {
            out[at] = point[0];
            out[at + 1] = point[1];
            at += 2;
        }
        out[at] = self.gamepad_options.flags.into_bits();
        at + 1
    }

    /// Deserialize from the packed storage layout.
    pub fn unpack_from(buf: &[u8]) -> Self {
        let mut profile = Self::const_default();
        let mut at = 0;
        for layer in profile.keymap.iter_mut() {
            for kc in layer.iter_mut() {
                *kc = KeyCode::from_primitive(buf[at]);
                at += 1;
            }
        }
        for act in profile.actuation_map.iter_mut() {
            *act = Actuation {
                actuation_point: buf[at],
                rt_down: buf[at + 1],
                rt_up: buf[at + 2],
                continuous: buf[at + 3] != 0,
            };
            at += 4;
        }
        for ak in profile.advanced_keys.iter_mut() {
            let mut entry = [0u8; ADVANCED_KEY_BYTES];
            entry.copy_from_slice(&buf[at..at + ADVANCED_KEY_BYTES]);
            *ak = AdvancedKey::unpack_from(&entry);
            at += ADVANCED_KEY_BYTES;
        }
        for btn in profile.gamepad_buttons.iter_mut() {
            *btn = GamepadButton::from_primitive(buf[at]);
            at += 1;
        }
        for point in profile.gamepad_options.analog_curve.iter_mut() {
            point[0] = buf[at];
            point[1] = buf[at + 1];
            at += 2;
        }
        profile.gamepad_options.flags = GamepadFlags::from_bits(buf[at]);
        profile
    }
}

impl<const NUM_KEYS: usize, const NUM_LAYERS: usize> Default for Profile<NUM_KEYS, NUM_LAYERS> {
    fn default() -> Self {
        Self::const_default()
    }
}
