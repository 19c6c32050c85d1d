//! Layout engine.
//!
//! Turns the matrix engine's per-key pressed states into keycode registrations:
//! transparent multi-layer lookup, chronological event dispatch, the
//! pending-event buffer that defers presses while a Tap-Hold decision is
//! outstanding, and the keycode class dispatch (HID, momentary layer, profile
//! select, specials).
//!
//! The layout engine owns the advanced-key engine ([`advanced_keys`]), the
//! combo engine ([`combo`]) and the deferred-action queue, and runs them to
//! quiescence each tick before a report is emitted.

pub mod advanced_keys;
pub mod combo;

use core::cell::RefCell;

use heapless::{Deque, Vec};

use hallmk_types::config::AdvancedBehavior;
use hallmk_types::gamepad::GamepadButton;
use hallmk_types::keycode::KeyCode;
use hallmk_types::ADVANCED_KEY_MAX_NUM;

use crate::analog::AnalogReader;
use crate::boot::BootHook;
use crate::clock::elapsed;
use crate::deferred::{DeferredAction, DeferredActionQueue, DeferredActionType};
use crate::eeconfig::Eeconfig;
use crate::gamepad::GamepadMapper;
use crate::hid::HidReporter;
use crate::matrix::Matrix;
use crate::storage::{FlashOperationMessage, FLASH_CHANNEL};

use self::advanced_keys::AdvancedKeyState;
use self::combo::{ComboEvent, COMBO_QUEUE_SIZE};

/// Capacity of the pending-event buffer.
pub const MAX_PENDING_EVENTS: usize = 8;

/// Virtual key index used by combo outputs.
pub const COMBO_VIRTUAL_KEY: u8 = 255;

/// A key event deferred while a Tap-Hold decision is outstanding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingEvent {
    pub key: u8,
    pub pressed: bool,
}

/// A key edge collected from the matrix, waiting to be dispatched in
/// chronological order.
#[derive(Debug, Copy, Clone)]
struct KeyEdge {
    key: u8,
    pressed: bool,
    event_time: u32,
}

/// The layout engine. Owns the HID, gamepad and bootloader collaborator
/// handles; the matrix is passed into each call so the two engines can share
/// the profile image.
pub struct Layout<'a, H, G, B, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize>
where
    H: HidReporter,
    G: GamepadMapper,
    B: BootHook,
{
    eeconfig: &'a RefCell<Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>>,
    pub(crate) hid: H,
    gamepad: G,
    boot: B,

    /// Each bit is one active layer
    layer_mask: u8,
    default_layer: u8,

    /// Last seen pressed state per key, for edge detection
    key_press_states: [bool; NUM_KEYS],
    /// Keys disabled by the key-lock keycode
    key_disabled: [bool; NUM_KEYS],
    /// Keycode registered per key. Layers and profiles may change while a key
    /// is held, so releases must use the remembered keycode.
    active_keycodes: [KeyCode; NUM_KEYS],

    /// Advanced-key slot (+1) bound to each position, 0 when none
    advanced_key_indices: [[u8; NUM_KEYS]; NUM_LAYERS],
    /// Advanced-key slot (+1) a held key was dispatched to
    active_advanced_keys: [u8; NUM_KEYS],
    /// Per-slot advanced key state
    pub(crate) ak_states: [AdvancedKeyState; ADVANCED_KEY_MAX_NUM],
    /// Last press time of a plain non-modifier key, for `require_prior_idle_ms`
    last_key_time: u32,
    last_ak_tick: u32,

    pending_events: Vec<PendingEvent, MAX_PENDING_EVENTS>,
    /// Keys whose press was dispatched this tick. A release arriving in the
    /// same tick is held back one tick so the press reaches a report.
    pressed_this_tick: [bool; NUM_KEYS],
    pub(crate) deferred: DeferredActionQueue,

    // Combo engine state
    pub(crate) combo_queue: Deque<ComboEvent, COMBO_QUEUE_SIZE>,
    combo_key_bitmap: [bool; NUM_KEYS],
    combo_bitmap_layer: u8,
    combo_bitmap_valid: bool,
    combo_flushing: bool,

    should_send_reports: bool,
}

impl<'a, H, G, B, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize>
    Layout<'a, H, G, B, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>
where
    H: HidReporter,
    G: GamepadMapper,
    B: BootHook,
{
    pub fn new(eeconfig: &'a RefCell<Eeconfig<NUM_KEYS, NUM_LAYERS, NUM_PROFILES>>, hid: H, gamepad: G, boot: B) -> Self {
        let mut layout = Self {
            eeconfig,
            hid,
            gamepad,
            boot,
            layer_mask: 0,
            default_layer: 0,
            key_press_states: [false; NUM_KEYS],
            key_disabled: [false; NUM_KEYS],
            active_keycodes: [KeyCode::No; NUM_KEYS],
            advanced_key_indices: [[0; NUM_KEYS]; NUM_LAYERS],
            active_advanced_keys: [0; NUM_KEYS],
            ak_states: [AdvancedKeyState::None; ADVANCED_KEY_MAX_NUM],
            last_key_time: 0,
            last_ak_tick: 0,
            pending_events: Vec::new(),
            pressed_this_tick: [false; NUM_KEYS],
            deferred: DeferredActionQueue::new(),
            combo_queue: Deque::new(),
            combo_key_bitmap: [false; NUM_KEYS],
            combo_bitmap_layer: 0,
            combo_bitmap_valid: false,
            combo_flushing: false,
            should_send_reports: false,
        };
        layout.load_advanced_keys();
        layout
    }

    pub fn hid(&self) -> &H {
        &self.hid
    }

    pub fn hid_mut(&mut self) -> &mut H {
        &mut self.hid
    }

    pub fn boot_mut(&mut self) -> &mut B {
        &mut self.boot
    }

    /// The current layer: the highest active bit of the layer mask, or the
    /// default layer when no layer is active.
    pub fn get_current_layer(&self) -> u8 {
        if self.layer_mask != 0 {
            (u8::BITS - 1 - self.layer_mask.leading_zeros()) as u8
        } else {
            self.default_layer
        }
    }

    fn layer_on(&mut self, layer: u8) {
        if (layer as usize) < NUM_LAYERS {
            self.layer_mask |= 1 << layer;
        } else {
            warn!("Not a valid layer, keyboard supports fewer layers");
        }
    }

    fn layer_off(&mut self, layer: u8) {
        if (layer as usize) < NUM_LAYERS {
            self.layer_mask &= !(1 << layer);
        }
    }

    /// Lock the current layer as the default layer, or unlock back to layer 0
    /// if it already is the default.
    fn layer_lock(&mut self) {
        let current_layer = self.get_current_layer();
        self.default_layer = if current_layer == self.default_layer { 0 } else { current_layer };
    }

    /// Keycode of a key in the given layer, resolving transparent entries
    /// downward through the active layers.
    pub fn get_keycode(&self, current_layer: u8, key: u8) -> KeyCode {
        let eeconfig = self.eeconfig.borrow();
        let profile = eeconfig.current_profile();

        for layer in (0..=current_layer as usize).rev() {
            if layer >= NUM_LAYERS || (self.layer_mask >> layer) & 1 == 0 {
                continue;
            }
            let keycode = profile.keymap[layer][key as usize];
            if keycode != KeyCode::Transparent {
                return keycode;
            }
        }

        profile.keymap[self.default_layer as usize % NUM_LAYERS][key as usize]
    }

    /// Rebuild the advanced-key index table from the current profile.
    ///
    /// Every code path that modifies the profile's advanced keys (profile
    /// switch, reset, duplicate, host configuration write) must call this
    /// before the next tick, after clearing the engine state.
    pub fn load_advanced_keys(&mut self) {
        self.advanced_key_indices = [[0; NUM_KEYS]; NUM_LAYERS];

        let eeconfig = self.eeconfig.borrow();
        let profile = eeconfig.current_profile();
        for (i, ak) in profile.advanced_keys.iter().enumerate() {
            self.ak_states[i] = AdvancedKeyState::initial(&ak.behavior);

            if ak.layer as usize >= NUM_LAYERS || ak.key as usize >= NUM_KEYS {
                continue;
            }
            match &ak.behavior {
                // Combos match against the flat advanced-key list, not the
                // per-key index table
                AdvancedBehavior::None | AdvancedBehavior::Combo(_) => continue,
                AdvancedBehavior::NullBind(nb) => {
                    self.advanced_key_indices[ak.layer as usize][ak.key as usize] = i as u8 + 1;
                    if (nb.secondary_key as usize) < NUM_KEYS {
                        self.advanced_key_indices[ak.layer as usize][nb.secondary_key as usize] = i as u8 + 1;
                    }
                }
                _ => {
                    self.advanced_key_indices[ak.layer as usize][ak.key as usize] = i as u8 + 1;
                }
            }
        }
        drop(eeconfig);

        self.combo_invalidate_cache();
    }

    /// Switch the active profile. Clears the advanced-key engine first and
    /// rebuilds the index table afterwards; remembers the last non-default
    /// profile for profile swapping.
    pub fn set_profile(&mut self, profile: u8) -> bool {
        if profile as usize >= NUM_PROFILES {
            return false;
        }

        self.advanced_key_clear();
        {
            let mut eeconfig = self.eeconfig.borrow_mut();
            eeconfig.current_profile = profile;
            if profile != 0 {
                eeconfig.last_non_default_profile = profile;
            }
        }
        let status = FLASH_CHANNEL.try_send(FlashOperationMessage::ProfileSelection).is_ok();
        if !status {
            error!("Flash channel full, profile selection not persisted");
        }
        self.load_advanced_keys();

        status
    }

    /// Process a single key event against the current layer: dispatch to the
    /// advanced-key engine or register/unregister the mapped keycode.
    ///
    /// Returns whether this produced a non-Tap-Hold press, which is what the
    /// Tap-Hold interrupt logic feeds on.
    pub fn process_key<A: AnalogReader>(
        &mut self,
        matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        now: u32,
        key: u8,
        pressed: bool,
    ) -> bool {
        if key as usize >= NUM_KEYS {
            return false;
        }
        let current_layer = self.get_current_layer();
        let mut has_non_tap_hold_press = false;

        if pressed {
            self.pressed_this_tick[key as usize] = true;
            let keycode = self.get_keycode(current_layer, key);
            let ak_index = self.advanced_key_indices[current_layer as usize % NUM_LAYERS][key as usize];

            if ak_index != 0 {
                self.active_advanced_keys[key as usize] = ak_index;
                self.advanced_key_process(
                    matrix,
                    now,
                    advanced_keys::AkEventType::Press,
                    key,
                    keycode,
                    ak_index - 1,
                );
                let behavior = {
                    let eeconfig = self.eeconfig.borrow();
                    eeconfig.current_profile().advanced_keys[(ak_index - 1) as usize].behavior
                };
                has_non_tap_hold_press |= !matches!(behavior, AdvancedBehavior::TapHold(_));
            } else {
                self.active_keycodes[key as usize] = keycode;
                self.register(key, keycode);
                if keycode != KeyCode::No {
                    has_non_tap_hold_press = true;
                    if !keycode.is_modifier() {
                        // Feeds the Tap-Hold prior-idle bypass
                        self.last_key_time = now;
                    }
                }
            }
        } else {
            let keycode = self.active_keycodes[key as usize];
            let ak_index = self.active_advanced_keys[key as usize];

            if ak_index != 0 {
                self.active_advanced_keys[key as usize] = 0;
                self.advanced_key_process(
                    matrix,
                    now,
                    advanced_keys::AkEventType::Release,
                    key,
                    keycode,
                    ak_index - 1,
                );
                let behavior = {
                    let eeconfig = self.eeconfig.borrow();
                    eeconfig.current_profile().advanced_keys[(ak_index - 1) as usize].behavior
                };
                has_non_tap_hold_press |= !matches!(behavior, AdvancedBehavior::TapHold(_));
            } else {
                self.active_keycodes[key as usize] = KeyCode::No;
                self.unregister(key, keycode);
                has_non_tap_hold_press |= keycode != KeyCode::No;
            }
        }

        has_non_tap_hold_press
    }

    /// One layout tick: collect key edges, dispatch them in chronological
    /// order through the combo and advanced-key engines, then drain the
    /// deferred-action queue and emit reports.
    pub fn task<A: AnalogReader>(&mut self, matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>, now: u32) {
        let current_layer = self.get_current_layer();
        let mut has_non_tap_hold_press = false;
        let mut has_non_tap_hold_release = false;
        self.pressed_this_tick = [false; NUM_KEYS];

        let mut edges: Vec<KeyEdge, NUM_KEYS> = Vec::new();

        // First pass: collect edges, feed the gamepad mapper, dispatch holds
        let (xinput_enabled, gamepad_override, keyboard_enabled) = {
            let eeconfig = self.eeconfig.borrow();
            let profile = eeconfig.current_profile();
            (
                eeconfig.options.xinput_enabled(),
                profile.gamepad_options.flags.gamepad_override(),
                profile.gamepad_options.flags.keyboard_enabled(),
            )
        };

        for i in 0..NUM_KEYS {
            let state = *matrix.key(i);
            let last_pressed = self.key_press_states[i];

            if current_layer == 0 && xinput_enabled {
                // The gamepad path runs before the keyboard path since the
                // keyboard path may be skipped entirely
                let button = self.eeconfig.borrow().current_profile().gamepad_buttons[i];
                if button != GamepadButton::None {
                    self.gamepad.process(i as u8, button, state.distance, state.is_pressed);

                    if gamepad_override {
                        self.key_press_states[i] = state.is_pressed;
                        continue;
                    }
                }

                if !keyboard_enabled {
                    self.key_press_states[i] = state.is_pressed;
                    continue;
                }
            }

            if current_layer == 0 && self.key_disabled[i] {
                // Only keys in layer 0 can be locked out
                self.key_press_states[i] = state.is_pressed;
                continue;
            }

            if state.is_pressed != last_pressed {
                // The push cannot fail, the buffer has one slot per key
                let _ = edges.push(KeyEdge {
                    key: i as u8,
                    pressed: state.is_pressed,
                    event_time: state.event_time,
                });
            } else if state.is_pressed {
                // Continuing hold: dispatch immediately, ordering is irrelevant
                let ak_index = self.active_advanced_keys[i];
                if ak_index != 0 {
                    let keycode = self.active_keycodes[i];
                    self.advanced_key_process(
                        matrix,
                        now,
                        advanced_keys::AkEventType::Hold,
                        i as u8,
                        keycode,
                        ak_index - 1,
                    );
                }
            }
        }

        // Chronological order; stable so same-timestamp edges keep key order
        insertion_sort_by_time(&mut edges);

        for edge in edges.iter() {
            if edge.pressed {
                if self.combo_process(matrix, edge.key, true, edge.event_time, now) {
                    self.key_press_states[edge.key as usize] = matrix.key(edge.key as usize).is_pressed;
                    continue;
                }

                // While a Tap-Hold is undecided, defer every non-Tap-Hold
                // press so nothing is registered before the hold resolves.
                // Releases are never deferred.
                let layer = self.get_current_layer();
                let ak_index = self.advanced_key_indices[layer as usize % NUM_LAYERS][edge.key as usize];
                let is_tap_hold = ak_index != 0 && {
                    let eeconfig = self.eeconfig.borrow();
                    matches!(
                        eeconfig.current_profile().advanced_keys[(ak_index - 1) as usize].behavior,
                        AdvancedBehavior::TapHold(_)
                    )
                };

                if !is_tap_hold && self.has_undecided() {
                    match self.pending_events.push(PendingEvent {
                        key: edge.key,
                        pressed: true,
                    }) {
                        Ok(()) => {
                            // The buffered press still counts as an interrupt
                            // for the Tap-Hold decision
                            has_non_tap_hold_press = true;
                            self.key_press_states[edge.key as usize] = matrix.key(edge.key as usize).is_pressed;
                            continue;
                        }
                        Err(_) => {
                            // Buffer full: process inline, correctness beats
                            // ordering purity
                            warn!("Pending event buffer full, processing inline");
                        }
                    }
                }

                if self.process_key(matrix, now, edge.key, true) {
                    has_non_tap_hold_press = true;
                }
            } else {
                if self.combo_process(matrix, edge.key, false, edge.event_time, now) {
                    self.key_press_states[edge.key as usize] = matrix.key(edge.key as usize).is_pressed;
                    continue;
                }

                let press_still_buffered = self.pending_events.iter().any(|e| e.pressed && e.key == edge.key);
                if press_still_buffered || self.pressed_this_tick[edge.key as usize] {
                    // The key's press is still buffered, or only reached the
                    // report state this very tick: the release must queue
                    // behind it. A buffered pair also completes a
                    // press-and-release inside the decision window.
                    if self.pending_events.push(PendingEvent {
                        key: edge.key,
                        pressed: false,
                    }).is_ok()
                    {
                        has_non_tap_hold_release = true;
                        self.key_press_states[edge.key as usize] = matrix.key(edge.key as usize).is_pressed;
                        continue;
                    }
                    warn!("Pending event buffer full, processing release inline");
                }

                if self.process_key(matrix, now, edge.key, false) {
                    has_non_tap_hold_release = true;
                }
            }

            self.key_press_states[edge.key as usize] = matrix.key(edge.key as usize).is_pressed;
        }

        if self.combo_task(matrix, now) {
            has_non_tap_hold_press = true;
        }

        if has_non_tap_hold_press || elapsed(now, self.last_ak_tick) > 0 {
            // Time-based advanced keys only need a tick every millisecond,
            // or when an interrupting press arrives
            self.advanced_key_tick(matrix, now, has_non_tap_hold_press, has_non_tap_hold_release);
            self.last_ak_tick = now;
        }

        // Replay deferred events once every Tap-Hold has resolved. A release
        // following a press replayed this very tick stays buffered one more
        // tick so the press makes it into a report.
        if !self.pending_events.is_empty() && !self.has_undecided() {
            let mut pending: Vec<PendingEvent, MAX_PENDING_EVENTS> = Vec::new();
            core::mem::swap(&mut pending, &mut self.pending_events);
            let mut remainder = pending.iter().copied().peekable();
            while let Some(&event) = remainder.peek() {
                if !event.pressed && self.pressed_this_tick[event.key as usize] {
                    break;
                }
                remainder.next();
                self.process_key(matrix, now, event.key, event.pressed);
            }
            for event in remainder {
                let _ = self.pending_events.push(event);
            }
        }

        if self.should_send_reports {
            self.hid.send_reports();
            self.should_send_reports = false;
        }

        self.process_deferred_actions(matrix, now);

        if self.should_send_reports {
            self.hid.send_reports();
            self.should_send_reports = false;
        }
    }

    /// Execute an action for a pressed keycode, dispatched by keycode class.
    pub fn register(&mut self, key: u8, keycode: KeyCode) {
        if keycode == KeyCode::No {
            return;
        }

        if keycode.is_hid() {
            self.hid.keycode_add(keycode);
            self.should_send_reports = true;
        } else if let Some(layer) = keycode.momentary_layer() {
            self.layer_on(layer);
        } else if let Some(profile) = keycode.profile_select() {
            self.set_profile(profile);
        } else {
            match keycode {
                KeyCode::KeyLock => {
                    if (key as usize) < NUM_KEYS {
                        self.key_disabled[key as usize] = !self.key_disabled[key as usize];
                    }
                }
                KeyCode::LayerLock => self.layer_lock(),
                KeyCode::ProfileSwap => {
                    let (current, last) = {
                        let eeconfig = self.eeconfig.borrow();
                        (eeconfig.current_profile, eeconfig.last_non_default_profile)
                    };
                    self.set_profile(if current != 0 { 0 } else { last });
                }
                KeyCode::ProfileNext => {
                    let current = self.eeconfig.borrow().current_profile;
                    self.set_profile((current + 1) % NUM_PROFILES as u8);
                }
                KeyCode::Bootloader => self.boot.enter_bootloader(),
                _ => {}
            }
        }
    }

    /// Undo a pressed keycode's action. Only HID keycodes and momentary
    /// layers have release semantics.
    pub fn unregister(&mut self, _key: u8, keycode: KeyCode) {
        if keycode == KeyCode::No {
            return;
        }

        if keycode.is_hid() {
            self.hid.keycode_remove(keycode);
            self.should_send_reports = true;
        } else if let Some(layer) = keycode.momentary_layer() {
            self.layer_off(layer);
        }
    }

    /// Drain the deferred-action queue. Entries pushed while draining (for
    /// example the release half of a TAP) run on the next tick.
    fn process_deferred_actions<A: AnalogReader>(
        &mut self,
        _matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        _now: u32,
    ) {
        let staged = self.deferred.len();
        for _ in 0..staged {
            let Some(action) = self.deferred.pop() else {
                break;
            };
            match action.action {
                DeferredActionType::Press => self.register(action.key, action.keycode),
                DeferredActionType::Release => self.unregister(action.key, action.keycode),
                DeferredActionType::Tap => {
                    let release = DeferredAction {
                        action: DeferredActionType::Release,
                        key: action.key,
                        keycode: action.keycode,
                    };
                    if self.deferred.push(release).is_ok() {
                        // Only press if the matching release could be staged,
                        // otherwise the key would stick
                        self.register(action.key, action.keycode);
                    }
                }
            }
        }
    }
}

/// Stable insertion sort by event time; N is tiny and mostly sorted.
fn insertion_sort_by_time<const N: usize>(edges: &mut Vec<KeyEdge, N>) {
    for i in 1..edges.len() {
        let tmp = edges[i];
        let mut j = i;
        while j > 0 && edges[j - 1].event_time > tmp.event_time {
            edges[j] = edges[j - 1];
            j -= 1;
        }
        edges[j] = tmp;
    }
}
