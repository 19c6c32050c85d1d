//! XInput mapper seam.
//!
//! On layer 0, with XInput enabled, every key mapped to a gamepad button is
//! offered to the mapper before (or instead of) the keyboard path. Button and
//! axis synthesis is outside the core; the mapper only receives the key's
//! travel and pressed state each tick.

pub use hallmk_types::gamepad::{GamepadButton, GamepadFlags, GamepadOptions};

/// Consumer of gamepad-mapped keys.
pub trait GamepadMapper {
    /// Feed one key's state for this tick.
    fn process(&mut self, key: u8, button: GamepadButton, distance: u8, pressed: bool);
}

/// Mapper for keyboards without gamepad support.
#[derive(Default)]
pub struct NoGamepad;

impl GamepadMapper for NoGamepad {
    fn process(&mut self, _key: u8, _button: GamepadButton, _distance: u8, _pressed: bool) {}
}
