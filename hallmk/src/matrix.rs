//! Analog matrix engine.
//!
//! Each scan turns raw per-key ADC samples into a filtered value, an
//! auto-calibrated rest/bottom-out envelope, a normalized travel distance and
//! finally a pressed state, either through a fixed actuation threshold or the
//! Rapid Trigger direction state machine. The layout engine consumes the
//! resulting [`KeyState`]s.

use core::cell::RefCell;

use heapless::Vec;

use crate::analog::AnalogReader;
use crate::clock::elapsed;
use crate::eeconfig::Eeconfig;
use crate::storage::{FlashOperationMessage, FLASH_CHANNEL};
use crate::{
    MATRIX_CALIBRATION_DURATION, MATRIX_CALIBRATION_EPSILON, MATRIX_EMA_ALPHA_EXPONENT, MATRIX_INACTIVITY_TIMEOUT,
};

/// Travel direction of the Rapid Trigger state machine.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyDir {
    /// Above the actuation point (or below the reset point)
    #[default]
    Inactive,
    /// Travelling down, pressed
    Down,
    /// Travelling up past the release sensitivity, released
    Up,
}

/// Per-key analog state.
#[derive(Debug, Default, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyState {
    /// EMA-filtered ADC value
    pub adc_filtered: u16,
    /// Auto-calibrated rest envelope
    pub adc_rest_value: u16,
    /// Auto-calibrated bottom-out envelope
    pub adc_bottom_out_value: u16,
    /// Normalized travel, 0 at rest, 255 at bottom-out
    pub distance: u8,
    /// Deepest or shallowest travel since the last direction change
    pub extremum: u8,
    pub dir: KeyDir,
    pub is_pressed: bool,
    /// Timestamp of the last rising or falling edge of `is_pressed`
    pub event_time: u32,
}

/// Matrix engine tuning. The defaults come from the crate-level constants;
/// tests shrink the EMA and calibration window to get deterministic edges.
#[derive(Debug, Copy, Clone)]
pub struct MatrixConfig {
    /// EMA smoothing constant exponent: `new = (raw + filtered * (2^a - 1)) >> a`
    pub ema_alpha_exponent: u8,
    /// Length of the rest-calibration window started by `recalibrate`
    pub calibration_duration: u32,
    /// Minimum delta before an envelope value moves
    pub calibration_epsilon: u16,
    /// Idle time before learned bottom-out thresholds are persisted
    pub inactivity_timeout: u32,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        Self {
            ema_alpha_exponent: MATRIX_EMA_ALPHA_EXPONENT,
            calibration_duration: MATRIX_CALIBRATION_DURATION,
            calibration_epsilon: MATRIX_CALIBRATION_EPSILON,
            inactivity_timeout: MATRIX_INACTIVITY_TIMEOUT,
        }
    }
}

/// One-pole IIR filter with a power-of-two smoothing constant, so no division
/// is needed.
#[inline]
fn ema(shift: u8, raw: u16, filtered: u16) -> u16 {
    ((raw as u32 + filtered as u32 * ((1u32 << shift) - 1)) >> shift) as u16
}

/// Normalized travel distance of a filtered ADC value inside its envelope.
/// A collapsed envelope reads as zero travel.
#[inline]
pub fn adc_to_distance(filtered: u16, rest: u16, bottom_out: u16) -> u8 {
    if bottom_out <= rest {
        return 0;
    }
    let clamped = filtered.clamp(rest, bottom_out);
    ((clamped - rest) as u32 * 255 / (bottom_out - rest) as u32) as u8
}

#[inline]
fn analog_read<A: AnalogReader>(adc: &mut A, key: usize) -> u16 {
    let raw = adc.read(key).min(A::MAX_VALUE);
    if A::INVERT {
        A::MAX_VALUE - raw
    } else {
        raw
    }
}

/// The analog key matrix.
pub struct Matrix<'a, A: AnalogReader, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize> {
    adc: A,
    eeconfig: &'a RefCell<Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>>,
    config: MatrixConfig,
    keys: [KeyState; NUM_KEYS],
    /// Keys with Rapid Trigger suspended, e.g. while a Dynamic Keystroke
    /// binding is active
    rapid_trigger_disabled: [bool; NUM_KEYS],
    /// Start of the running rest-calibration window, if any
    calibration_started: Option<u32>,
    last_bottom_out_change: u32,
    bottom_out_dirty: bool,
}

impl<'a, A: AnalogReader, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize>
    Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>
{
    pub fn new(adc: A, eeconfig: &'a RefCell<Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>>, config: MatrixConfig) -> Self {
        Self {
            adc,
            eeconfig,
            config,
            keys: [KeyState::default(); NUM_KEYS],
            rapid_trigger_disabled: [false; NUM_KEYS],
            calibration_started: None,
            last_bottom_out_change: 0,
            bottom_out_dirty: false,
        }
    }

    pub fn init(&mut self, now: u32) {
        self.recalibrate(now, false);
    }

    pub fn key(&self, key: usize) -> &KeyState {
        &self.keys[key]
    }

    pub fn keys(&self) -> &[KeyState; NUM_KEYS] {
        &self.keys
    }

    /// Whether the rest-calibration window is still running. Keys are inert
    /// until it closes.
    pub fn is_calibrating(&self) -> bool {
        self.calibration_started.is_some()
    }

    pub fn disable_rapid_trigger(&mut self, key: usize, disable: bool) {
        if key < NUM_KEYS {
            self.rapid_trigger_disabled[key] = disable;
        }
    }

    /// Reset every key's envelope to the stored calibration and open a new
    /// rest-calibration window. With `reset_bottom_out_threshold`, the learned
    /// per-key thresholds are zeroed and the zeroing is persisted.
    pub fn recalibrate(&mut self, now: u32, reset_bottom_out_threshold: bool) {
        if reset_bottom_out_threshold {
            self.eeconfig.borrow_mut().bottom_out_threshold = [0; NUM_KEYS];
            if FLASH_CHANNEL.try_send(FlashOperationMessage::BottomOutThresholds).is_err() {
                error!("Flash channel full, bottom-out reset not persisted");
            }
        }

        let eeconfig = self.eeconfig.borrow();
        let rest = eeconfig.calibration.initial_rest_value.min(A::MAX_VALUE);
        for (i, key) in self.keys.iter_mut().enumerate() {
            *key = KeyState {
                adc_filtered: rest,
                adc_rest_value: rest,
                adc_bottom_out_value: eeconfig.bottom_out_value(i, rest, A::MAX_VALUE),
                distance: 0,
                extremum: 0,
                dir: KeyDir::Inactive,
                is_pressed: false,
                event_time: now,
            };
        }
        drop(eeconfig);

        // Only the rest value is calibrated inside the window. The bottom-out
        // envelope keeps updating during normal scans.
        self.calibration_started = if self.config.calibration_duration > 0 {
            Some(now)
        } else {
            None
        };
        self.last_bottom_out_change = now;
        self.bottom_out_dirty = false;
        info!("Matrix recalibration started");
    }

    /// One matrix scan. Called every sample period, 1 kHz or faster.
    pub fn scan(&mut self, now: u32) {
        self.adc.task();

        if let Some(started) = self.calibration_started {
            if elapsed(now, started) < self.config.calibration_duration {
                self.calibration_scan();
                return;
            }
            self.calibration_started = None;
            self.last_bottom_out_change = now;
        }

        let shift = self.config.ema_alpha_exponent;
        let epsilon = self.config.calibration_epsilon;
        let eeconfig = self.eeconfig.borrow();

        // Keys that newly pressed this scan, with their overshoot past the
        // actuation point
        let mut pressed_keys: Vec<(usize, u8), NUM_KEYS> = Vec::new();

        for i in 0..NUM_KEYS {
            let actuation = eeconfig.current_profile().actuation_map[i];
            let key = &mut self.keys[i];

            let new_filtered = ema(shift, analog_read(&mut self.adc, i), key.adc_filtered);
            key.adc_filtered = new_filtered;

            if new_filtered >= key.adc_bottom_out_value.saturating_add(epsilon) {
                // The key travelled further than ever seen, raise the
                // bottom-out envelope
                key.adc_bottom_out_value = new_filtered;
                self.last_bottom_out_change = now;
                self.bottom_out_dirty = true;
            }

            key.distance = adc_to_distance(new_filtered, key.adc_rest_value, key.adc_bottom_out_value);

            let was_pressed = key.is_pressed;

            if self.rapid_trigger_disabled[i] || actuation.rt_down == 0 {
                // Fixed-threshold actuation. An actuation point of zero means
                // any nonzero travel presses, not that the key is always down.
                key.dir = KeyDir::Inactive;
                key.is_pressed = key.distance >= actuation.actuation_point.max(1);
            } else {
                let reset_point = if actuation.continuous { 0 } else { actuation.actuation_point };
                let rt_up = if actuation.rt_up == 0 { actuation.rt_down } else { actuation.rt_up };

                match key.dir {
                    KeyDir::Inactive => {
                        if key.distance > actuation.actuation_point {
                            // Pressed down past the actuation point
                            key.extremum = key.distance;
                            key.dir = KeyDir::Down;
                            key.is_pressed = true;
                        }
                    }
                    KeyDir::Down => {
                        if key.distance <= reset_point {
                            // Released past the reset point
                            key.extremum = key.distance;
                            key.dir = KeyDir::Inactive;
                            key.is_pressed = false;
                        } else if (key.distance as u16 + rt_up as u16) < key.extremum as u16 {
                            // Released by Rapid Trigger
                            key.extremum = key.distance;
                            key.dir = KeyDir::Up;
                            key.is_pressed = false;
                        } else if key.distance > key.extremum {
                            // Pressed down further
                            key.extremum = key.distance;
                        }
                    }
                    KeyDir::Up => {
                        if key.distance <= reset_point {
                            // Released past the reset point
                            key.extremum = key.distance;
                            key.dir = KeyDir::Inactive;
                            key.is_pressed = false;
                        } else if (key.extremum as u16 + actuation.rt_down as u16) < key.distance as u16 {
                            // Pressed by Rapid Trigger
                            key.extremum = key.distance;
                            key.dir = KeyDir::Down;
                            key.is_pressed = true;
                        } else if key.distance < key.extremum {
                            // Released further
                            key.extremum = key.distance;
                        }
                    }
                }
            }

            if was_pressed != key.is_pressed {
                key.event_time = now;

                if key.is_pressed {
                    let overshoot = key.distance.saturating_sub(actuation.actuation_point);
                    // The buffer has one slot per key, the push cannot fail
                    let _ = pressed_keys.push((i, overshoot));
                }
            }
        }
        drop(eeconfig);

        // Deterministic ordering of near-simultaneous presses: the deepest
        // overshoot was pressed earliest and stays pressed; shallower new
        // presses are deferred to the next scan.
        if pressed_keys.len() > 1 {
            pressed_keys.sort_unstable_by(|a, b| b.1.cmp(&a.1));
            for &(key, _) in pressed_keys.iter().skip(1) {
                self.keys[key].is_pressed = false;
                self.keys[key].dir = KeyDir::Inactive;
            }
        }

        let save_enabled = self.eeconfig.borrow().options.save_bottom_out_threshold();
        if save_enabled && self.bottom_out_dirty && elapsed(now, self.last_bottom_out_change) >= self.config.inactivity_timeout
        {
            self.save_bottom_out_threshold(now);
        }
    }

    /// A scan inside the calibration window: run the filter and let it pull
    /// the rest envelope down. Key states stay inert.
    fn calibration_scan(&mut self) {
        let shift = self.config.ema_alpha_exponent;
        let epsilon = self.config.calibration_epsilon;
        let eeconfig = self.eeconfig.borrow();

        for i in 0..NUM_KEYS {
            let key = &mut self.keys[i];
            let new_filtered = ema(shift, analog_read(&mut self.adc, i), key.adc_filtered);
            key.adc_filtered = new_filtered;

            if new_filtered.saturating_add(epsilon) <= key.adc_rest_value {
                // Only move the rest value down, and only by at least epsilon
                key.adc_rest_value = new_filtered;
            }

            // Keep the bottom-out envelope consistent with the updated rest
            key.adc_bottom_out_value = eeconfig.bottom_out_value(i, key.adc_rest_value, A::MAX_VALUE);
        }
    }

    /// Persist the learned bottom-out deltas.
    fn save_bottom_out_threshold(&mut self, now: u32) {
        {
            let mut eeconfig = self.eeconfig.borrow_mut();
            for (i, key) in self.keys.iter().enumerate() {
                eeconfig.bottom_out_threshold[i] = key.adc_bottom_out_value.saturating_sub(key.adc_rest_value);
            }
        }
        if FLASH_CHANNEL.try_send(FlashOperationMessage::BottomOutThresholds).is_err() {
            // Retry on the next inactivity window
            error!("Flash channel full, bottom-out threshold save deferred");
            return;
        }
        self.bottom_out_dirty = false;
        self.last_bottom_out_change = now;
    }
}
