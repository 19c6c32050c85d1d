//! In-memory model of the persistent configuration image.
//!
//! The image holds everything the keyboard remembers across power cycles:
//! global calibration, device options, the per-key bottom-out thresholds
//! learned by the matrix engine, the active profile index, all profiles and
//! the macro pool. The runtime reads it in place; every mutation goes through
//! the host configuration service or the matrix engine's calibration paths,
//! which schedule the matching flash writes on [`crate::storage::FLASH_CHANNEL`].

use bitfield_struct::bitfield;
use serde::{Deserialize, Serialize};

use hallmk_types::keyboard_macro::MacroSequence;
use hallmk_types::profile::Profile;
use hallmk_types::NUM_MACROS;

/// Default number of matrix scans per millisecond tick.
pub const DEFAULT_TICK_RATE: u8 = 1;

/// Global ADC calibration seed. Per-key envelopes start from these and are
/// refined online.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalibrationConfig {
    /// Rest-position ADC value every key starts from after a recalibration
    pub initial_rest_value: u16,
    /// Minimum distance between rest and bottom-out ADC values
    pub initial_bottom_out_threshold: u16,
}

impl CalibrationConfig {
    pub const fn const_default() -> Self {
        Self {
            initial_rest_value: 2200,
            initial_bottom_out_threshold: 650,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self::const_default()
    }
}

/// Global device option bits.
#[bitfield(u8, order = Lsb)]
#[derive(Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceOptions {
    /// Whether the XInput gamepad path is active on layer 0
    #[bits(1)]
    pub xinput_enabled: bool,
    /// Whether learned bottom-out thresholds are persisted after inactivity
    #[bits(1)]
    pub save_bottom_out_threshold: bool,
    #[bits(6)]
    __: u8,
}

impl Serialize for DeviceOptions {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.into_bits())
    }
}

impl<'de> Deserialize<'de> for DeviceOptions {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(Self::from_bits)
    }
}

/// The whole persistent image.
pub struct Eeconfig<const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize> {
    pub calibration: CalibrationConfig,
    pub options: DeviceOptions,
    /// Learned bottom-out ADC deltas relative to the rest value
    pub bottom_out_threshold: [u16; NUM_KEYS],
    pub current_profile: u8,
    /// Profile to swap back to from profile 0
    pub last_non_default_profile: u8,
    pub profiles: [Profile<NUM_KEYS, NUM_LAYERS>; NUM_PROFILES],
    pub macros: [MacroSequence; NUM_MACROS],
    /// Matrix scans per millisecond
    pub tick_rate: u8,
}

impl<const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize>
    Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>
{
    pub const fn const_default() -> Self {
        Self {
            calibration: CalibrationConfig::const_default(),
            options: DeviceOptions::new().with_save_bottom_out_threshold(true),
            bottom_out_threshold: [0; NUM_KEYS],
            current_profile: 0,
            last_non_default_profile: 0,
            profiles: [Profile::const_default(); NUM_PROFILES],
            macros: [MacroSequence::const_default(); NUM_MACROS],
            tick_rate: DEFAULT_TICK_RATE,
        }
    }

    /// The active profile.
    pub fn current_profile(&self) -> &Profile<NUM_KEYS, NUM_LAYERS> {
        &self.profiles[self.current_profile as usize % NUM_PROFILES]
    }

    pub fn current_profile_mut(&mut self) -> &mut Profile<NUM_KEYS, NUM_LAYERS> {
        &mut self.profiles[self.current_profile as usize % NUM_PROFILES]
    }

    /// Per-key bottom-out ADC value derived from a rest value: at least the
    /// configured initial threshold above rest, raised by the learned per-key
    /// delta, clamped to the ADC range.
    pub fn bottom_out_value(&self, key: usize, rest_value: u16, adc_max: u16) -> u16 {
        let threshold = self
            .calibration
            .initial_bottom_out_threshold
            .max(self.bottom_out_threshold[key]);
        rest_value.saturating_add(threshold).min(adc_max)
    }
}

impl<const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize> Default
    for Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>
{
    fn default() -> Self {
        Self::const_default()
    }
}
