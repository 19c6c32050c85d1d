//! Advanced-key engine: per-slot state machines for Tap-Hold, Toggle,
//! Dynamic Keystroke, Null Bind and Macro bindings.
//!
//! Combos are handled separately (see [`super::combo`]); they match against
//! the flat advanced-key list instead of a per-key binding.

use hallmk_types::config::{
    AdvancedBehavior, DksAction, DynamicKeystroke, NullBind, NullBindBehavior, TapHold, TapHoldFlavor, Toggle,
};
use hallmk_types::keyboard_macro::MacroOperation;
use hallmk_types::keycode::KeyCode;
use hallmk_types::{MAX_MACRO_EVENTS, NUM_MACROS};

use crate::analog::AnalogReader;
use crate::boot::BootHook;
use crate::clock::elapsed;
use crate::deferred::{DeferredAction, DeferredActionType};
use crate::gamepad::GamepadMapper;
use crate::hid::HidReporter;
use crate::matrix::Matrix;

use super::Layout;

/// Advanced-key event classes.
///
/// The discriminants are arranged so `PRESS..=RELEASE` doubles as the shift
/// index into the Dynamic Keystroke action bitmaps.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AkEventType {
    Hold = 0,
    Press = 1,
    BottomOut = 2,
    ReleaseFromBottomOut = 3,
    Release = 4,
}

/// Tap-Hold decision stage.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TapHoldStage {
    #[default]
    None,
    /// Pressed, decision outstanding
    Tap,
    /// Decided; `registered` holds whichever keycode went down
    Hold,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TapHoldState {
    /// Press timestamp
    pub since: u32,
    pub stage: TapHoldStage,
    /// Another key was pressed while this one was down
    pub interrupted: bool,
    /// Another key was pressed and then released while this one was down
    pub other_key_released: bool,
    /// Keycode currently registered on behalf of this slot
    pub registered: KeyCode,
    /// Completion time of the previous tap, for quick-tap and double-tap
    pub last_tap_time: u32,
    pub has_tapped: bool,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ToggleStage {
    #[default]
    None,
    /// Toggled on, waiting to see whether the key is held past the term
    Toggle,
    /// Held past the term, behaving as a momentary key
    Normal,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ToggleState {
    pub since: u32,
    pub stage: ToggleStage,
    pub is_toggled: bool,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DksState {
    /// Which of the four sub-bindings are registered
    pub is_pressed: [bool; 4],
    pub is_bottomed_out: bool,
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NullBindState {
    /// Active keycodes of the primary and secondary key
    pub keycodes: [KeyCode; 2],
    /// Whether the primary and secondary key are registered
    pub is_pressed: [bool; 2],
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacroState {
    pub event_index: u8,
    pub is_playing: bool,
    /// Set while suspended on a DELAY event
    pub waiting: bool,
    pub delay_start: u32,
    pub delay_ms: u32,
}

/// Per-slot runtime state, parallel to the profile's advanced-key list.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdvancedKeyState {
    #[default]
    None,
    NullBind(NullBindState),
    DynamicKeystroke(DksState),
    TapHold(TapHoldState),
    Toggle(ToggleState),
    Combo,
    Macro(MacroState),
}

impl AdvancedKeyState {
    /// Fresh state matching a configured behavior.
    pub fn initial(behavior: &AdvancedBehavior) -> Self {
        match behavior {
            AdvancedBehavior::None => AdvancedKeyState::None,
            AdvancedBehavior::NullBind(_) => AdvancedKeyState::NullBind(NullBindState::default()),
            AdvancedBehavior::DynamicKeystroke(_) => AdvancedKeyState::DynamicKeystroke(DksState::default()),
            AdvancedBehavior::TapHold(_) => AdvancedKeyState::TapHold(TapHoldState::default()),
            AdvancedBehavior::Toggle(_) => AdvancedKeyState::Toggle(ToggleState::default()),
            AdvancedBehavior::Combo(_) => AdvancedKeyState::Combo,
            AdvancedBehavior::Macro(_) => AdvancedKeyState::Macro(MacroState::default()),
        }
    }
}

impl<'a, H, G, B, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize>
    Layout<'a, H, G, B, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>
where
    H: HidReporter,
    G: GamepadMapper,
    B: BootHook,
{
    /// Whether any Tap-Hold slot has an outstanding decision. Gates the
    /// pending-event buffer.
    pub fn has_undecided(&self) -> bool {
        self.ak_states
            .iter()
            .any(|state| matches!(state, AdvancedKeyState::TapHold(th) if th.stage == TapHoldStage::Tap))
    }

    /// Record a plain non-modifier key press, for the Tap-Hold prior-idle
    /// bypass.
    pub fn update_last_key_time(&mut self, now: u32) {
        self.last_key_time = now;
    }

    /// Release everything the engine holds and reset all slot states. Must
    /// run before any configuration change that touches advanced keys.
    pub fn advanced_key_clear(&mut self) {
        let advanced_keys = {
            let eeconfig = self.eeconfig.borrow();
            eeconfig.current_profile().advanced_keys
        };

        for (i, ak) in advanced_keys.iter().enumerate() {
            match (self.ak_states[i], &ak.behavior) {
                (AdvancedKeyState::TapHold(state), AdvancedBehavior::TapHold(_)) => {
                    if state.registered != KeyCode::No {
                        self.unregister(ak.key, state.registered);
                    }
                }
                (AdvancedKeyState::Toggle(state), AdvancedBehavior::Toggle(toggle)) => {
                    if state.stage != ToggleStage::None || state.is_toggled {
                        self.unregister(ak.key, toggle.keycode);
                    }
                }
                (AdvancedKeyState::NullBind(state), AdvancedBehavior::NullBind(nb)) => {
                    let keys = [ak.key, nb.secondary_key];
                    for side in 0..2 {
                        if state.is_pressed[side] {
                            self.unregister(keys[side], state.keycodes[side]);
                        }
                    }
                }
                (AdvancedKeyState::DynamicKeystroke(state), AdvancedBehavior::DynamicKeystroke(dks)) => {
                    for (slot, pressed) in state.is_pressed.iter().enumerate() {
                        if *pressed {
                            self.unregister(ak.key, dks.keycodes[slot]);
                        }
                    }
                }
                _ => {}
            }
            self.ak_states[i] = AdvancedKeyState::initial(&ak.behavior);
        }
    }

    /// Dispatch one advanced-key event to the slot's state machine.
    pub(crate) fn advanced_key_process<A: AnalogReader>(
        &mut self,
        matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        now: u32,
        event_type: AkEventType,
        key: u8,
        keycode: KeyCode,
        ak_index: u8,
    ) {
        let Some(ak) = ({
            let eeconfig = self.eeconfig.borrow();
            eeconfig
                .current_profile()
                .advanced_keys
                .get(ak_index as usize)
                .copied()
        }) else {
            return;
        };

        match ak.behavior {
            AdvancedBehavior::NullBind(nb) => {
                self.ak_null_bind(matrix, event_type, key, keycode, ak_index, ak.key, &nb)
            }
            AdvancedBehavior::DynamicKeystroke(dks) => self.ak_dynamic_keystroke(matrix, event_type, key, ak_index, &dks),
            AdvancedBehavior::TapHold(th) => self.ak_tap_hold(now, event_type, key, ak_index, &th),
            AdvancedBehavior::Toggle(toggle) => self.ak_toggle(now, event_type, key, ak_index, &toggle),
            AdvancedBehavior::Macro(macro_key) => self.ak_macro(now, event_type, ak_index, macro_key.macro_index),
            _ => {}
        }
    }

    /// Time-based advanced-key work: Tap-Hold decisions, Toggle expiry and
    /// macro playback. `has_press`/`has_release` flag interrupting non-Tap-Hold
    /// activity seen this tick.
    pub(crate) fn advanced_key_tick<A: AnalogReader>(
        &mut self,
        _matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        now: u32,
        has_press: bool,
        has_release: bool,
    ) {
        let advanced_keys = {
            let eeconfig = self.eeconfig.borrow();
            eeconfig.current_profile().advanced_keys
        };

        for (i, ak) in advanced_keys.iter().enumerate() {
            match (self.ak_states[i], ak.behavior) {
                (AdvancedKeyState::TapHold(mut state), AdvancedBehavior::TapHold(th)) => {
                    if state.stage == TapHoldStage::None {
                        continue;
                    }
                    if has_press {
                        state.interrupted = true;
                    }
                    if has_release && state.interrupted {
                        state.other_key_released = true;
                    }
                    if state.stage != TapHoldStage::Tap {
                        self.ak_states[i] = AdvancedKeyState::TapHold(state);
                        continue;
                    }

                    let term_elapsed = elapsed(now, state.since) >= th.tapping_term as u32;
                    let resolve_hold = (th.flags.hold_on_other_key_press() && state.interrupted)
                        || (th.flags.permissive_hold() && state.interrupted && state.other_key_released)
                        || match th.flags.flavor() {
                            TapHoldFlavor::HoldPreferred => term_elapsed,
                            TapHoldFlavor::Balanced => term_elapsed || (state.interrupted && state.other_key_released),
                            TapHoldFlavor::TapPreferred => term_elapsed && !state.interrupted,
                            TapHoldFlavor::TapUnlessInterrupted => state.interrupted && !term_elapsed,
                        };
                    // The interrupt-sensitive flavors fall back to tap when
                    // the term runs out without the hold condition being met
                    let resolve_tap = !resolve_hold
                        && term_elapsed
                        && matches!(
                            th.flags.flavor(),
                            TapHoldFlavor::TapPreferred | TapHoldFlavor::TapUnlessInterrupted
                        );

                    if resolve_hold {
                        let already_held = state.registered == th.hold_keycode;
                        state.stage = TapHoldStage::Hold;
                        state.registered = th.hold_keycode;
                        self.ak_states[i] = AdvancedKeyState::TapHold(state);
                        if !already_held {
                            self.register(ak.key, th.hold_keycode);
                        }
                    } else if resolve_tap {
                        // The tap keycode goes down and stays down until the
                        // key is released
                        let held_hold = th.flags.hold_while_undecided() && state.registered == th.hold_keycode;
                        state.stage = TapHoldStage::Hold;
                        state.registered = th.tap_keycode;
                        self.ak_states[i] = AdvancedKeyState::TapHold(state);
                        if held_hold {
                            self.unregister(ak.key, th.hold_keycode);
                        }
                        self.register(ak.key, th.tap_keycode);
                    } else {
                        self.ak_states[i] = AdvancedKeyState::TapHold(state);
                    }
                }
                (AdvancedKeyState::Toggle(mut state), AdvancedBehavior::Toggle(toggle)) => {
                    if state.stage == ToggleStage::Toggle && elapsed(now, state.since) >= toggle.tapping_term as u32 {
                        // Held past the term: revert to momentary behavior
                        state.stage = ToggleStage::Normal;
                        state.is_toggled = false;
                        self.ak_states[i] = AdvancedKeyState::Toggle(state);
                    }
                }
                (AdvancedKeyState::Macro(state), AdvancedBehavior::Macro(macro_key)) => {
                    if state.is_playing {
                        self.macro_play(now, i, ak.key, macro_key.macro_index);
                    }
                }
                _ => {}
            }
        }
    }

    fn ak_tap_hold(&mut self, now: u32, event_type: AkEventType, key: u8, ak_index: u8, th: &TapHold) {
        let AdvancedKeyState::TapHold(mut state) = self.ak_states[ak_index as usize] else {
            return;
        };

        match event_type {
            AkEventType::Press => {
                state.since = now;
                state.stage = TapHoldStage::Tap;
                state.interrupted = false;
                state.other_key_released = false;
                state.registered = KeyCode::No;

                let double_tap_window = if th.quick_tap_ms > 0 { th.quick_tap_ms } else { th.tapping_term };
                if th.double_tap_keycode != KeyCode::No
                    && state.has_tapped
                    && elapsed(now, state.last_tap_time) < double_tap_window as u32
                {
                    // Double tap: decided immediately
                    state.stage = TapHoldStage::Hold;
                    state.registered = th.double_tap_keycode;
                    state.last_tap_time = now;
                    self.ak_states[ak_index as usize] = AdvancedKeyState::TapHold(state);
                    self.register(key, th.double_tap_keycode);
                    return;
                }
                if th.quick_tap_ms > 0 && state.has_tapped && elapsed(now, state.last_tap_time) < th.quick_tap_ms as u32 {
                    // Re-press inside the quick-tap window: always a tap
                    state.stage = TapHoldStage::Hold;
                    state.registered = th.tap_keycode;
                    state.last_tap_time = now;
                    self.ak_states[ak_index as usize] = AdvancedKeyState::TapHold(state);
                    self.register(key, th.tap_keycode);
                    return;
                }
                if th.require_prior_idle_ms > 0 && elapsed(now, self.last_key_time) < th.require_prior_idle_ms as u32 {
                    // Rolled onto during typing: always a tap
                    state.stage = TapHoldStage::Hold;
                    state.registered = th.tap_keycode;
                    self.ak_states[ak_index as usize] = AdvancedKeyState::TapHold(state);
                    self.register(key, th.tap_keycode);
                    return;
                }
                if th.flags.hold_while_undecided() {
                    // The hold keycode goes down right away and is swapped
                    // out if the decision lands on tap
                    state.registered = th.hold_keycode;
                    self.ak_states[ak_index as usize] = AdvancedKeyState::TapHold(state);
                    self.register(key, th.hold_keycode);
                    return;
                }
                self.ak_states[ak_index as usize] = AdvancedKeyState::TapHold(state);
            }
            AkEventType::Release => {
                match state.stage {
                    TapHoldStage::Tap => {
                        // Released undecided: this was a tap
                        let held_hold = th.flags.hold_while_undecided() && state.registered == th.hold_keycode;
                        if held_hold {
                            self.unregister(key, th.hold_keycode);
                        }
                        self.tap_now(key, th.tap_keycode, &mut state, now);
                    }
                    TapHoldStage::Hold => {
                        let registered = state.registered;
                        if registered != KeyCode::No {
                            self.unregister(key, registered);
                        }
                        if th.flags.retro_tapping() && !state.interrupted && registered == th.hold_keycode {
                            // Held past the term but never interrupted:
                            // still emit the tap
                            self.tap_now(key, th.tap_keycode, &mut state, now);
                        }
                    }
                    TapHoldStage::None => {}
                }
                state.stage = TapHoldStage::None;
                state.registered = KeyCode::No;
                self.ak_states[ak_index as usize] = AdvancedKeyState::TapHold(state);
            }
            _ => {
                self.ak_states[ak_index as usize] = AdvancedKeyState::TapHold(state);
            }
        }
    }

    /// Register a tap keycode now and stage its release for the next tick.
    /// Skipped entirely if the release cannot be staged.
    fn tap_now(&mut self, key: u8, keycode: KeyCode, state: &mut TapHoldState, now: u32) {
        let release = DeferredAction {
            action: DeferredActionType::Release,
            key,
            keycode,
        };
        if self.deferred.push(release).is_ok() {
            self.register(key, keycode);
            state.last_tap_time = now;
            state.has_tapped = true;
        }
    }

    fn ak_toggle(&mut self, now: u32, event_type: AkEventType, key: u8, ak_index: u8, toggle: &Toggle) {
        let AdvancedKeyState::Toggle(mut state) = self.ak_states[ak_index as usize] else {
            return;
        };

        match event_type {
            AkEventType::Press => {
                state.is_toggled = !state.is_toggled;
                if state.is_toggled {
                    state.since = now;
                    state.stage = ToggleStage::Toggle;
                } else {
                    // Toggled off: behave like a plain key for this press
                    state.stage = ToggleStage::Normal;
                }
                self.ak_states[ak_index as usize] = AdvancedKeyState::Toggle(state);
                self.register(key, toggle.keycode);
            }
            AkEventType::Release => {
                let unregister = !state.is_toggled;
                state.stage = ToggleStage::None;
                self.ak_states[ak_index as usize] = AdvancedKeyState::Toggle(state);
                if unregister {
                    self.unregister(key, toggle.keycode);
                }
            }
            _ => {}
        }
    }

    fn ak_dynamic_keystroke<A: AnalogReader>(
        &mut self,
        matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        event_type: AkEventType,
        key: u8,
        ak_index: u8,
        dks: &DynamicKeystroke,
    ) {
        let AdvancedKeyState::DynamicKeystroke(mut state) = self.ak_states[ak_index as usize] else {
            return;
        };

        let is_bottomed_out = matrix.key(key as usize).distance >= dks.bottom_out_point;
        let mut event_type = event_type;

        if is_bottomed_out && !state.is_bottomed_out {
            event_type = AkEventType::BottomOut;
        } else if event_type != AkEventType::Release && !is_bottomed_out && state.is_bottomed_out {
            // Key release wins over release-from-bottom-out
            event_type = AkEventType::ReleaseFromBottomOut;
        }
        state.is_bottomed_out = is_bottomed_out;

        if event_type == AkEventType::Hold {
            self.ak_states[ak_index as usize] = AdvancedKeyState::DynamicKeystroke(state);
            return;
        }

        // Rapid Trigger would fight the keystroke-part tracking
        matrix.disable_rapid_trigger(key as usize, event_type != AkEventType::Release);

        for slot in 0..4 {
            let keycode = dks.keycodes[slot];
            let action = DksAction::from((dks.bitmap[slot] >> ((event_type as u8 - AkEventType::Press as u8) * 2)) & 3);

            if keycode == KeyCode::No || action == DksAction::Hold {
                continue;
            }

            if state.is_pressed[slot] {
                // Everything except HOLD starts from a released key
                self.unregister(key, keycode);
                state.is_pressed[slot] = false;
            }

            if action == DksAction::Press || action == DksAction::Tap {
                // The report was possibly just modified, so the press lands
                // on the next scan through the deferred queue
                let deferred = DeferredAction {
                    action: if action == DksAction::Press {
                        DeferredActionType::Press
                    } else {
                        DeferredActionType::Tap
                    },
                    key,
                    keycode,
                };
                let pushed = self.deferred.push(deferred).is_ok();
                state.is_pressed[slot] = pushed && action == DksAction::Press;
            }
        }

        self.ak_states[ak_index as usize] = AdvancedKeyState::DynamicKeystroke(state);
    }

    #[allow(clippy::too_many_arguments)]
    fn ak_null_bind<A: AnalogReader>(
        &mut self,
        matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        event_type: AkEventType,
        key: u8,
        keycode: KeyCode,
        ak_index: u8,
        primary_key: u8,
        nb: &NullBind,
    ) {
        let AdvancedKeyState::NullBind(mut state) = self.ak_states[ak_index as usize] else {
            return;
        };

        let keys = [primary_key, nb.secondary_key];
        let side = if key == keys[0] { 0 } else { 1 };

        match event_type {
            AkEventType::Press => {
                state.keycodes[side] = keycode;
            }
            AkEventType::Release => {
                if state.is_pressed[side] {
                    self.unregister(keys[side], state.keycodes[side]);
                    state.is_pressed[side] = false;
                }
                state.keycodes[side] = KeyCode::No;
            }
            _ => {}
        }

        let mut desired = [state.keycodes[0] != KeyCode::No, state.keycodes[1] != KeyCode::No];
        if desired[0] && desired[1] {
            // Both keys are down, run the SOCD resolution
            let distances = [
                matrix.key(keys[0] as usize % NUM_KEYS).distance,
                matrix.key(keys[1] as usize % NUM_KEYS).distance,
            ];
            if nb.bottom_out_point > 0
                && distances[0] >= nb.bottom_out_point
                && distances[1] >= nb.bottom_out_point
            {
                // Both bottomed out, both register
            } else if nb.behavior == NullBindBehavior::Distance {
                // Deeper travel wins; ties favor the most recent event
                desired[side] = distances[side] >= distances[side ^ 1];
                desired[side ^ 1] = !desired[side];
            } else if event_type == AkEventType::Press {
                desired[side] = nb.behavior != NullBindBehavior::Neutral
                    && (nb.behavior == NullBindBehavior::Last
                        || (nb.behavior == NullBindBehavior::Primary && side == 0)
                        || (nb.behavior == NullBindBehavior::Secondary && side == 1));
                // Only one side registers at a time, except for Neutral which
                // releases both
                desired[side ^ 1] = nb.behavior != NullBindBehavior::Neutral && !desired[side];
            } else {
                desired = state.is_pressed;
            }
        }

        // Reconcile: only resolution outcomes change here
        for side in 0..2 {
            if desired[side] && !state.is_pressed[side] {
                self.register(keys[side], state.keycodes[side]);
                state.is_pressed[side] = true;
            } else if !desired[side] && state.is_pressed[side] {
                self.unregister(keys[side], state.keycodes[side]);
                state.is_pressed[side] = false;
            }
        }

        self.ak_states[ak_index as usize] = AdvancedKeyState::NullBind(state);
    }

    fn ak_macro(&mut self, now: u32, event_type: AkEventType, ak_index: u8, macro_index: u8) {
        let AdvancedKeyState::Macro(mut state) = self.ak_states[ak_index as usize] else {
            return;
        };

        // Macros trigger on press and run to completion; release is a no-op
        if event_type == AkEventType::Press && (macro_index as usize) < NUM_MACROS && !state.is_playing {
            state.event_index = 0;
            state.is_playing = true;
            state.waiting = false;
            state.delay_start = now;
            state.delay_ms = 0;
            self.ak_states[ak_index as usize] = AdvancedKeyState::Macro(state);
        }
    }

    /// Advance a playing macro: execute events until a DELAY suspends it, an
    /// END stops it, or the sequence runs out.
    fn macro_play(&mut self, now: u32, ak_index: usize, key: u8, macro_index: u8) {
        let AdvancedKeyState::Macro(mut state) = self.ak_states[ak_index] else {
            return;
        };

        if state.waiting {
            if elapsed(now, state.delay_start) < state.delay_ms {
                return;
            }
            state.waiting = false;
        }

        let sequence = {
            let eeconfig = self.eeconfig.borrow();
            eeconfig.macros[macro_index as usize % NUM_MACROS]
        };

        while state.is_playing {
            if state.event_index as usize >= MAX_MACRO_EVENTS {
                state.is_playing = false;
                break;
            }
            let event = sequence.events[state.event_index as usize];
            state.event_index += 1;

            match event {
                MacroOperation::End => {
                    state.is_playing = false;
                }
                MacroOperation::Press(keycode) => self.register(key, keycode),
                MacroOperation::Release(keycode) => self.unregister(key, keycode),
                MacroOperation::Tap(keycode) => {
                    let release = DeferredAction {
                        action: DeferredActionType::Release,
                        key,
                        keycode,
                    };
                    if self.deferred.push(release).is_ok() {
                        self.register(key, keycode);
                    }
                }
                MacroOperation::Delay(units) => {
                    state.waiting = true;
                    state.delay_start = now;
                    state.delay_ms = units as u32 * 10;
                    break;
                }
            }
        }

        self.ak_states[ak_index] = AdvancedKeyState::Macro(state);
    }
}
