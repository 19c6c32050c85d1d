//! Per-key actuation and advanced-key configuration.
//!
//! An advanced key binds extra behavior to one `(layer, key)` position of a
//! profile. The behavior payload is a sum type; the wire format used by the
//! host configuration protocol is the packed little-endian layout described
//! on each variant.

use bitfield_struct::bitfield;
use byteorder::{ByteOrder, LittleEndian};
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};

use crate::keycode::KeyCode;
use crate::COMBO_MAX_KEYS;

/// Size of one advanced key in the host protocol: layer, key, tag and the
/// largest payload (Tap-Hold, 10 bytes).
pub const ADVANCED_KEY_BYTES: usize = 13;

/// Combo key slot marker for "unused".
pub const COMBO_KEY_UNUSED: u8 = 255;

/// Actuation configuration for a single key.
///
/// If `rt_down` is non-zero, Rapid Trigger is enabled. If `rt_up` is zero,
/// `rt_down` is used for both directions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Actuation {
    /// Actuation point (0-255 normalized travel)
    pub actuation_point: u8,
    /// Rapid Trigger press sensitivity, 0 disables Rapid Trigger
    pub rt_down: u8,
    /// Rapid Trigger release sensitivity, 0 falls back to `rt_down`
    pub rt_up: u8,
    /// Continuous Rapid Trigger: reset point is 0 instead of the actuation point
    pub continuous: bool,
}

impl Actuation {
    pub const fn const_default() -> Self {
        Self {
            actuation_point: 128,
            rt_down: 0,
            rt_up: 0,
            continuous: false,
        }
    }
}

impl Default for Actuation {
    fn default() -> Self {
        Self::const_default()
    }
}

/// Null Bind resolution behavior when both keys of the pair are pressed.
#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, FromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NullBindBehavior {
    /// Prioritize the last pressed key
    #[default]
    Last = 0,
    /// Prioritize the primary key
    Primary = 1,
    /// Prioritize the secondary key
    Secondary = 2,
    /// Release both keys
    Neutral = 3,
    /// Prioritize the key that is pressed further
    Distance = 4,
}

/// Null Bind (SOCD) pair configuration. The primary key is the advanced key's
/// own position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NullBind {
    pub secondary_key: u8,
    pub behavior: NullBindBehavior,
    /// If non-zero, both keys register when both are pressed past this point,
    /// regardless of the behavior.
    pub bottom_out_point: u8,
}

/// Dynamic Keystroke action for one part of the keystroke.
#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DksAction {
    /// Keep the previous state
    #[default]
    Hold = 0,
    Press = 1,
    Release = 2,
    Tap = 3,
}

/// Dynamic Keystroke configuration: four sub-bindings, each with a 2-bit
/// action for each of the four keystroke parts.
///
/// Bitmap layout per sub-binding: bits 0-1 press, bits 2-3 bottom-out,
/// bits 4-5 release from bottom-out, bits 6-7 release.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DynamicKeystroke {
    pub keycodes: [KeyCode; 4],
    pub bitmap: [u8; 4],
    pub bottom_out_point: u8,
}

/// Tap-Hold interrupt flavor, deciding how an undecided key resolves to HOLD.
#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, FromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TapHoldFlavor {
    /// Hold once the tapping term expires, interrupts notwithstanding
    #[default]
    HoldPreferred = 0,
    /// Hold once the tapping term expires, or earlier when another key is
    /// pressed and released
    Balanced = 1,
    /// Hold only when the tapping term expires without any interrupt;
    /// an interrupted press resolves as tap at the term
    TapPreferred = 2,
    /// Hold only if another key is pressed before the tapping term expires;
    /// otherwise the press resolves as tap at the term
    TapUnlessInterrupted = 3,
}

/// Packed Tap-Hold option flags.
#[bitfield(u8, order = Lsb)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TapHoldFlags {
    #[bits(2)]
    pub flavor_bits: u8,
    #[bits(1)]
    pub retro_tapping: bool,
    #[bits(1)]
    pub hold_while_undecided: bool,
    /// Resolve as hold as soon as any other key is pressed
    #[bits(1)]
    pub hold_on_other_key_press: bool,
    /// Resolve as hold when another key is pressed and released
    #[bits(1)]
    pub permissive_hold: bool,
    #[bits(2)]
    __: u8,
}

impl TapHoldFlags {
    pub fn flavor(&self) -> TapHoldFlavor {
        TapHoldFlavor::from_primitive(self.flavor_bits())
    }

    pub fn with_flavor(self, flavor: TapHoldFlavor) -> Self {
        self.with_flavor_bits(flavor as u8)
    }
}

impl Serialize for TapHoldFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.into_bits())
    }
}

impl<'de> Deserialize<'de> for TapHoldFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(Self::from_bits)
    }
}

/// Tap-Hold configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TapHold {
    pub tap_keycode: KeyCode,
    pub hold_keycode: KeyCode,
    /// Tapping term in milliseconds
    pub tapping_term: u16,
    pub flags: TapHoldFlags,
    /// If re-pressed within this time of the last tap, always produce tap
    /// (0 = disabled)
    pub quick_tap_ms: u16,
    /// If pressed within this time of another non-modifier key, always produce
    /// tap (0 = disabled). Useful for home-row mods.
    pub require_prior_idle_ms: u16,
    /// Keycode to send on double tap (`No` = disabled; uses `quick_tap_ms` as
    /// the detection window if set, otherwise `tapping_term`)
    pub double_tap_keycode: KeyCode,
}

/// Toggle configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Toggle {
    pub keycode: KeyCode,
    /// Held longer than this, the key reverts to momentary behavior
    pub tapping_term: u16,
}

/// Combo configuration. Unused key slots hold [`COMBO_KEY_UNUSED`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Combo {
    /// Trigger key indices
    pub keys: [u8; COMBO_MAX_KEYS],
    pub output_keycode: KeyCode,
    /// Combo term in milliseconds (0 = default)
    pub term: u16,
}

impl Combo {
    /// Trigger keys actually configured for this combo.
    pub fn required_keys(&self) -> impl Iterator<Item = u8> + '_ {
        self.keys.iter().copied().filter(|&k| k != COMBO_KEY_UNUSED)
    }

    pub fn num_required(&self) -> usize {
        self.required_keys().count()
    }
}

/// Macro key configuration, referencing a macro sequence by index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacroKey {
    pub macro_index: u8,
}

/// The behavior payload of an advanced key.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvancedBehavior {
    #[default]
    None,
    NullBind(NullBind),
    DynamicKeystroke(DynamicKeystroke),
    TapHold(TapHold),
    Toggle(Toggle),
    Combo(Combo),
    Macro(MacroKey),
}

impl AdvancedBehavior {
    /// Protocol tag byte of this behavior.
    pub const fn tag(&self) -> u8 {
        match self {
            AdvancedBehavior::None => 0,
            AdvancedBehavior::NullBind(_) => 1,
            AdvancedBehavior::DynamicKeystroke(_) => 2,
            AdvancedBehavior::TapHold(_) => 3,
            AdvancedBehavior::Toggle(_) => 4,
            AdvancedBehavior::Combo(_) => 5,
            AdvancedBehavior::Macro(_) => 6,
        }
    }
}

/// One advanced-key slot of a profile.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdvancedKey {
    pub layer: u8,
    pub key: u8,
    pub behavior: AdvancedBehavior,
}

impl AdvancedKey {
    pub const fn const_default() -> Self {
        Self {
            layer: 0,
            key: 0,
            behavior: AdvancedBehavior::None,
        }
    }

    /// Pack into the protocol wire layout: `[layer, key, tag, payload...]`,
    /// padded with zeroes up to [`ADVANCED_KEY_BYTES`].
    pub fn pack_into(&self, out: &mut [u8; ADVANCED_KEY_BYTES]) {
        *out = [0; ADVANCED_KEY_BYTES];
        out[0] = self.layer;
        out[1] = self.key;
        out[2] = self.behavior.tag();
        let payload = &mut out[3..];
        match &self.behavior {
            AdvancedBehavior::None => {}
            AdvancedBehavior::NullBind(nb) => {
                payload[0] = nb.secondary_key;
                payload[1] = nb.behavior.into();
                payload[2] = nb.bottom_out_point;
            }
            AdvancedBehavior::DynamicKeystroke(dks) => {
                for i in 0..4 {
                    payload[i] = dks.keycodes[i].into();
                    payload[4 + i] = dks.bitmap[i];
                }
                payload[8] = dks.bottom_out_point;
            }
            AdvancedBehavior::TapHold(th) => {
                payload[0] = th.tap_keycode.into();
                payload[1] = th.hold_keycode.into();
                LittleEndian::write_u16(&mut payload[2..4], th.tapping_term);
                payload[4] = th.flags.into_bits();
                LittleEndian::write_u16(&mut payload[5..7], th.quick_tap_ms);
                LittleEndian::write_u16(&mut payload[7..9], th.require_prior_idle_ms);
                payload[9] = th.double_tap_keycode.into();
            }
            AdvancedBehavior::Toggle(t) => {
                payload[0] = t.keycode.into();
                LittleEndian::write_u16(&mut payload[1..3], t.tapping_term);
            }
            AdvancedBehavior::Combo(c) => {
                payload[..COMBO_MAX_KEYS].copy_from_slice(&c.keys);
                payload[4] = c.output_keycode.into();
                LittleEndian::write_u16(&mut payload[5..7], c.term);
            }
            AdvancedBehavior::Macro(m) => {
                payload[0] = m.macro_index;
            }
        }
    }

    /// Unpack from the protocol wire layout. An unknown tag byte decodes to
    /// `None` behavior.
    pub fn unpack_from(buf: &[u8; ADVANCED_KEY_BYTES]) -> Self {
        let payload = &buf[3..];
        let behavior = match buf[2] {
            1 => AdvancedBehavior::NullBind(NullBind {
                secondary_key: payload[0],
                behavior: NullBindBehavior::from_primitive(payload[1]),
                bottom_out_point: payload[2],
            }),
            2 => AdvancedBehavior::DynamicKeystroke(DynamicKeystroke {
                keycodes: [
                    KeyCode::from_primitive(payload[0]),
                    KeyCode::from_primitive(payload[1]),
                    KeyCode::from_primitive(payload[2]),
                    KeyCode::from_primitive(payload[3]),
                ],
                bitmap: [payload[4], payload[5], payload[6], payload[7]],
                bottom_out_point: payload[8],
            }),
            3 => AdvancedBehavior::TapHold(TapHold {
                tap_keycode: KeyCode::from_primitive(payload[0]),
                hold_keycode: KeyCode::from_primitive(payload[1]),
                tapping_term: LittleEndian::read_u16(&payload[2..4]),
                flags: TapHoldFlags::from_bits(payload[4]),
                quick_tap_ms: LittleEndian::read_u16(&payload[5..7]),
                require_prior_idle_ms: LittleEndian::read_u16(&payload[7..9]),
                double_tap_keycode: KeyCode::from_primitive(payload[9]),
            }),
            4 => AdvancedBehavior::Toggle(Toggle {
                keycode: KeyCode::from_primitive(payload[0]),
                tapping_term: LittleEndian::read_u16(&payload[1..3]),
            }),
            5 => AdvancedBehavior::Combo(Combo {
                keys: [payload[0], payload[1], payload[2], payload[3]],
                output_keycode: KeyCode::from_primitive(payload[4]),
                term: LittleEndian::read_u16(&payload[5..7]),
            }),
            6 => AdvancedBehavior::Macro(MacroKey {
                macro_index: payload[0],
            }),
            _ => AdvancedBehavior::None,
        };

        Self {
            layer: buf[0],
            key: buf[1],
            behavior,
        }
    }
}

impl Default for AdvancedKey {
    fn default() -> Self {
        Self::const_default()
    }
}
