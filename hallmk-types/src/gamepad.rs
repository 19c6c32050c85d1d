//! Gamepad button map and options.
//!
//! The XInput mapper itself lives behind a collaborator seam in the firmware
//! core; these types describe what the profile image stores for it.

use bitfield_struct::bitfield;
use num_enum::{FromPrimitive, IntoPrimitive};
use serde::{Deserialize, Serialize};

/// Gamepad buttons a key can be mapped to.
#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, FromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GamepadButton {
    #[default]
    None = 0,

    // Digital buttons
    A = 1,
    B = 2,
    X = 3,
    Y = 4,
    Up = 5,
    Down = 6,
    Left = 7,
    Right = 8,
    Start = 9,
    Back = 10,
    Home = 11,
    LeftStick = 12,
    RightStick = 13,
    LeftBumper = 14,
    RightBumper = 15,

    // Analog buttons
    LsUp = 16,
    LsDown = 17,
    LsLeft = 18,
    LsRight = 19,
    RsUp = 20,
    RsDown = 21,
    RsLeft = 22,
    RsRight = 23,
    LeftTrigger = 24,
    RightTrigger = 25,
}

/// Packed gamepad option flags.
#[bitfield(u8, order = Lsb)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GamepadFlags {
    /// Whether the layout processing is enabled for this profile
    #[bits(1)]
    pub keyboard_enabled: bool,
    /// Whether a key mapped to a gamepad button is withheld from the keyboard path
    #[bits(1)]
    pub gamepad_override: bool,
    /// Square-shaped joystick output instead of circular
    #[bits(1)]
    pub square_joystick: bool,
    /// Use the maximum of opposite axes instead of combining them
    #[bits(1)]
    pub snappy_joystick: bool,
    #[bits(4)]
    __: u8,
}

impl Serialize for GamepadFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.into_bits())
    }
}

impl<'de> Deserialize<'de> for GamepadFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(Self::from_bits)
    }
}

/// Gamepad options of a profile.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct GamepadOptions {
    /// Four points defining the key-position to analog-value curve
    pub analog_curve: [[u8; 2]; 4],
    pub flags: GamepadFlags,
}

impl GamepadOptions {
    pub const fn const_default() -> Self {
        Self {
            analog_curve: [[0, 0], [85, 85], [170, 170], [255, 255]],
            flags: GamepadFlags::new().with_keyboard_enabled(true),
        }
    }
}

impl Default for GamepadOptions {
    fn default() -> Self {
        Self::const_default()
    }
}
