//! Keycode definitions.
//!
//! The firmware uses a single-byte keycode space, partitioned by range:
//!
//! | Range | Meaning |
//! |---|---|
//! | `0x00` | No-op |
//! | `0x01` | Transparent (defer to the next lower active layer) |
//! | `0x04..=0xE7` | Standard HID usage ids, relayed to the HID report |
//! | `0xE8..=0xEF` | Momentary layer 0-7 |
//! | `0xF0..=0xF7` | Profile select 0-7 |
//! | `0xF8..=0xFC` | Special firmware keycodes |

use num_enum::{FromPrimitive, IntoPrimitive};
use postcard::experimental::max_size::MaxSize;
use serde::{Deserialize, Serialize};

/// First keycode relayed to the HID report.
pub const HID_KEYCODE_MIN: u8 = 0x04;
/// Last keycode relayed to the HID report (`RGui`).
pub const HID_KEYCODE_MAX: u8 = 0xE7;
/// First modifier keycode (`LCtrl`).
pub const MODIFIER_KEYCODE_MIN: u8 = 0xE0;
/// First momentary-layer keycode.
pub const MOMENTARY_LAYER_MIN: u8 = 0xE8;
/// Last momentary-layer keycode.
pub const MOMENTARY_LAYER_MAX: u8 = 0xEF;
/// First profile-select keycode.
pub const PROFILE_SELECT_MIN: u8 = 0xF0;
/// Last profile-select keycode.
pub const PROFILE_SELECT_MAX: u8 = 0xF7;

/// All keycodes understood by the layout engine.
///
/// Unknown bytes decode to [`KeyCode::No`], so a malformed keymap entry is a
/// dead key rather than an error.
#[repr(u8)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, MaxSize, FromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyCode {
    /// Reserved, no-key
    #[default]
    No = 0x00,
    /// Defer to the next lower active layer
    Transparent = 0x01,
    /// `a` and `A`
    A = 0x04,
    B = 0x05,
    C = 0x06,
    D = 0x07,
    E = 0x08,
    F = 0x09,
    G = 0x0A,
    H = 0x0B,
    I = 0x0C,
    J = 0x0D,
    K = 0x0E,
    L = 0x0F,
    M = 0x10,
    N = 0x11,
    O = 0x12,
    P = 0x13,
    Q = 0x14,
    R = 0x15,
    S = 0x16,
    T = 0x17,
    U = 0x18,
    V = 0x19,
    W = 0x1A,
    X = 0x1B,
    Y = 0x1C,
    Z = 0x1D,
    /// `1` and `!`
    Kc1 = 0x1E,
    Kc2 = 0x1F,
    Kc3 = 0x20,
    Kc4 = 0x21,
    Kc5 = 0x22,
    Kc6 = 0x23,
    Kc7 = 0x24,
    Kc8 = 0x25,
    Kc9 = 0x26,
    /// `0` and `)`
    Kc0 = 0x27,
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,
    /// `-` and `_`
    Minus = 0x2D,
    /// `=` and `+`
    Equal = 0x2E,
    LeftBracket = 0x2F,
    RightBracket = 0x30,
    Backslash = 0x31,
    /// Non-US `#` and `~`
    NonusHash = 0x32,
    Semicolon = 0x33,
    Quote = 0x34,
    Grave = 0x35,
    Comma = 0x36,
    Dot = 0x37,
    Slash = 0x38,
    CapsLock = 0x39,
    F1 = 0x3A,
    F2 = 0x3B,
    F3 = 0x3C,
    F4 = 0x3D,
    F5 = 0x3E,
    F6 = 0x3F,
    F7 = 0x40,
    F8 = 0x41,
    F9 = 0x42,
    F10 = 0x43,
    F11 = 0x44,
    F12 = 0x45,
    PrintScreen = 0x46,
    ScrollLock = 0x47,
    Pause = 0x48,
    Insert = 0x49,
    Home = 0x4A,
    PageUp = 0x4B,
    Delete = 0x4C,
    End = 0x4D,
    PageDown = 0x4E,
    Right = 0x4F,
    Left = 0x50,
    Down = 0x51,
    Up = 0x52,
    NumLock = 0x53,
    KpSlash = 0x54,
    KpAsterisk = 0x55,
    KpMinus = 0x56,
    KpPlus = 0x57,
    KpEnter = 0x58,
    Kp1 = 0x59,
    Kp2 = 0x5A,
    Kp3 = 0x5B,
    Kp4 = 0x5C,
    Kp5 = 0x5D,
    Kp6 = 0x5E,
    Kp7 = 0x5F,
    Kp8 = 0x60,
    Kp9 = 0x61,
    Kp0 = 0x62,
    KpDot = 0x63,
    /// Non-US `\` and `|`
    NonusBackslash = 0x64,
    Application = 0x65,
    Power = 0x66,
    KpEqual = 0x67,
    F13 = 0x68,
    F14 = 0x69,
    F15 = 0x6A,
    F16 = 0x6B,
    F17 = 0x6C,
    F18 = 0x6D,
    F19 = 0x6E,
    F20 = 0x6F,
    F21 = 0x70,
    F22 = 0x71,
    F23 = 0x72,
    F24 = 0x73,
    Execute = 0x74,
    Help = 0x75,
    Menu = 0x76,
    Select = 0x77,
    Stop = 0x78,
    Again = 0x79,
    Undo = 0x7A,
    Cut = 0x7B,
    Copy = 0x7C,
    Paste = 0x7D,
    Find = 0x7E,
    Mute = 0x7F,
    VolumeUp = 0x80,
    VolumeDown = 0x81,
    International1 = 0x87,
    International2 = 0x88,
    International3 = 0x89,
    International4 = 0x8A,
    International5 = 0x8B,
    International6 = 0x8C,
    International7 = 0x8D,
    International8 = 0x8E,
    International9 = 0x8F,
    Language1 = 0x90,
    Language2 = 0x91,
    Language3 = 0x92,
    Language4 = 0x93,
    Language5 = 0x94,
    Language6 = 0x95,
    Language7 = 0x96,
    Language8 = 0x97,
    Language9 = 0x98,
    LCtrl = 0xE0,
    LShift = 0xE1,
    LAlt = 0xE2,
    LGui = 0xE3,
    RCtrl = 0xE4,
    RShift = 0xE5,
    RAlt = 0xE6,
    RGui = 0xE7,
    /// Momentary layer 0 while held
    Mo0 = 0xE8,
    Mo1 = 0xE9,
    Mo2 = 0xEA,
    Mo3 = 0xEB,
    Mo4 = 0xEC,
    Mo5 = 0xED,
    Mo6 = 0xEE,
    Mo7 = 0xEF,
    /// Switch to profile 0
    Profile0 = 0xF0,
    Profile1 = 0xF1,
    Profile2 = 0xF2,
    Profile3 = 0xF3,
    Profile4 = 0xF4,
    Profile5 = 0xF5,
    Profile6 = 0xF6,
    Profile7 = 0xF7,
    /// Disable the key this keycode is pressed together with, until toggled again
    KeyLock = 0xF8,
    /// Lock the current layer as the default layer
    LayerLock = 0xF9,
    /// Swap between profile 0 and the last non-default profile
    ProfileSwap = 0xFA,
    /// Cycle to the next profile
    ProfileNext = 0xFB,
    /// Reboot into the bootloader
    Bootloader = 0xFC,
}

impl KeyCode {
    /// Whether this keycode is relayed to the HID keyboard report.
    pub const fn is_hid(self) -> bool {
        let v = self as u8;
        HID_KEYCODE_MIN <= v && v <= HID_KEYCODE_MAX
    }

    /// Whether this keycode is a HID modifier (`LCtrl..=RGui`).
    pub const fn is_modifier(self) -> bool {
        let v = self as u8;
        MODIFIER_KEYCODE_MIN <= v && v <= HID_KEYCODE_MAX
    }

    /// The modifier bit of this keycode in the HID report modifier byte.
    pub const fn modifier_bit(self) -> u8 {
        if self.is_modifier() {
            1 << (self as u8 - MODIFIER_KEYCODE_MIN)
        } else {
            0
        }
    }

    /// The layer activated by a momentary-layer keycode.
    pub const fn momentary_layer(self) -> Option<u8> {
        let v = self as u8;
        if MOMENTARY_LAYER_MIN <= v && v <= MOMENTARY_LAYER_MAX {
            Some(v - MOMENTARY_LAYER_MIN)
        } else {
            None
        }
    }

    /// The profile selected by a profile-select keycode.
    pub const fn profile_select(self) -> Option<u8> {
        let v = self as u8;
        if PROFILE_SELECT_MIN <= v && v <= PROFILE_SELECT_MAX {
            Some(v - PROFILE_SELECT_MIN)
        } else {
            None
        }
    }
}
