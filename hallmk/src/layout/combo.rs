//! Combo engine: a bounded queue of press events matched against the
//! profile's combo definitions with longest-match arbitration.
//!
//! Presses of combo-participating keys are held back in the queue until a
//! combo matches, a longer match is ruled out, or the events age past the
//! combo term and are replayed in order. Releases bypass the queue; a release
//! of a queued key cancels every pending candidate.

use hallmk_types::config::{AdvancedBehavior, Combo};
use heapless::Vec;

use crate::analog::AnalogReader;
use crate::boot::BootHook;
use crate::clock::elapsed;
use crate::deferred::{DeferredAction, DeferredActionType};
use crate::gamepad::GamepadMapper;
use crate::hid::HidReporter;
use crate::matrix::Matrix;

use super::{Layout, COMBO_VIRTUAL_KEY};
use hallmk_types::ADVANCED_KEY_MAX_NUM;

/// Capacity of the press-event queue.
pub const COMBO_QUEUE_SIZE: usize = 16;

/// Combo term used when a combo is configured with term 0.
pub const DEFAULT_COMBO_TERM: u32 = 50;

/// A queued press waiting for combo arbitration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ComboEvent {
    pub key: u8,
    pub pressed: bool,
    pub time: u32,
    /// Set once a committed combo claimed this press
    pub consumed: bool,
}

/// Match state of one combo against the queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum MatchStatus {
    None,
    /// Some required keys present, none foreign, term still open
    Candidate,
    /// Every required key present within the term
    Full,
}

impl<'a, H, G, B, const NUM_KEYS: usize, const NUM_LAYERS: usize, const NUM_PROFILES: usize>
    Layout<'a, H, G, B, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>
where
    H: HidReporter,
    G: GamepadMapper,
    B: BootHook,
{
    /// Invalidate the per-layer combo participation cache. The sole legal
    /// invalidation entry point; every configuration-mutation route ends up
    /// here via `load_advanced_keys`.
    pub fn combo_invalidate_cache(&mut self) {
        self.combo_bitmap_valid = false;
    }

    /// Lazily rebuild the participation bitmap when the layer or the
    /// configuration changed.
    fn combo_rebuild_bitmap(&mut self) {
        let current_layer = self.get_current_layer();
        if self.combo_bitmap_valid && self.combo_bitmap_layer == current_layer {
            return;
        }

        self.combo_key_bitmap = [false; NUM_KEYS];
        let eeconfig = self.eeconfig.borrow();
        for ak in eeconfig.current_profile().advanced_keys.iter() {
            if ak.layer != current_layer {
                continue;
            }
            if let AdvancedBehavior::Combo(combo) = &ak.behavior {
                for key in combo.required_keys() {
                    if (key as usize) < NUM_KEYS {
                        self.combo_key_bitmap[key as usize] = true;
                    }
                }
            }
        }
        drop(eeconfig);

        self.combo_bitmap_layer = current_layer;
        self.combo_bitmap_valid = true;
    }

    /// Offer a key event to the combo engine before normal dispatch. Returns
    /// whether the event was absorbed into the queue.
    pub(crate) fn combo_process<A: AnalogReader>(
        &mut self,
        matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        key: u8,
        pressed: bool,
        time: u32,
        now: u32,
    ) -> bool {
        self.combo_rebuild_bitmap();

        if !pressed {
            if self.combo_queue.iter().any(|e| !e.consumed && e.key == key) {
                // Releasing a queued key rules its combos out; replay
                // everything in order and let the release pass through after
                self.combo_flush_all(matrix, now);
            }
            return false;
        }

        if (key as usize) >= NUM_KEYS || !self.combo_key_bitmap[key as usize] {
            if !self.combo_queue.is_empty() {
                // A non-combo press must not overtake queued combo presses
                self.combo_flush_all(matrix, now);
            }
            return false;
        }

        if self.combo_queue.is_full() {
            // Make room by force-flushing the oldest event
            if let Some(event) = self.combo_queue.pop_front() {
                if !event.consumed {
                    self.process_key(matrix, now, event.key, event.pressed);
                }
            }
        }
        let _ = self.combo_queue.push_back(ComboEvent {
            key,
            pressed: true,
            time,
            consumed: false,
        });
        true
    }

    /// Progress time-based combo decisions. Returns whether any press reached
    /// normal dispatch (a combo output or a replayed event).
    pub(crate) fn combo_task<A: AnalogReader>(
        &mut self,
        matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        now: u32,
    ) -> bool {
        self.combo_rebuild_bitmap();
        if self.combo_queue.is_empty() {
            return false;
        }

        let current_layer = self.get_current_layer();
        let advanced_keys = {
            let eeconfig = self.eeconfig.borrow();
            eeconfig.current_profile().advanced_keys
        };

        // Score every combo on the current layer against the queue
        let mut scored: Vec<(usize, MatchStatus, usize, u32), ADVANCED_KEY_MAX_NUM> = Vec::new();
        for (slot, ak) in advanced_keys.iter().enumerate() {
            if ak.layer != current_layer {
                continue;
            }
            if let AdvancedBehavior::Combo(combo) = &ak.behavior {
                let status = self.combo_match_status(combo, now);
                if status != MatchStatus::None {
                    let _ = scored.push((slot, status, combo.num_required(), combo_term(combo)));
                }
            }
        }

        // Longest full match wins; ties break toward the lowest slot, which
        // comes first in iteration order
        let mut best_full: Option<(usize, usize)> = None;
        for &(slot, status, size, _) in scored.iter() {
            if status != MatchStatus::Full {
                continue;
            }
            match best_full {
                Some((_, best_size)) if best_size >= size => {}
                _ => best_full = Some((slot, size)),
            }
        }

        let oldest_time = self.combo_queue.iter().find(|e| !e.consumed).map(|e| e.time);
        let max_live_term = scored.iter().map(|&(_, _, _, term)| term).max().unwrap_or(DEFAULT_COMBO_TERM);
        let aged_out = oldest_time.is_some_and(|t| elapsed(now, t) > max_live_term);

        if let Some((slot, size)) = best_full {
            let longer_pending = scored
                .iter()
                .any(|&(_, status, candidate_size, _)| status == MatchStatus::Candidate && candidate_size > size);
            if longer_pending && !aged_out {
                // A longer combo may still arrive, keep waiting
                return false;
            }
            return self.combo_commit(matrix, now, &advanced_keys[slot]);
        }

        if scored.iter().any(|&(_, status, _, _)| status == MatchStatus::Candidate) {
            if aged_out {
                // Only the oldest event has expired; replay it alone
                if let Some(event) = self.combo_queue.pop_front() {
                    if !event.consumed {
                        return self.process_key(matrix, now, event.key, event.pressed);
                    }
                }
            }
            return false;
        }

        // No match and nothing live anymore
        self.combo_flush_all(matrix, now)
    }

    fn combo_match_status(&self, combo: &Combo, now: u32) -> MatchStatus {
        let required = combo.num_required();
        if required == 0 {
            // Malformed, never matches and never consumes
            return MatchStatus::None;
        }
        let term = combo_term(combo);

        let mut matched = 0usize;
        let mut first_time: Option<u32> = None;
        let mut last_time: Option<u32> = None;
        let mut foreign = false;

        for event in self.combo_queue.iter().filter(|e| !e.consumed) {
            if combo.required_keys().any(|k| k == event.key) {
                matched += 1;
                if first_time.is_none() {
                    first_time = Some(event.time);
                }
                last_time = Some(event.time);
            } else {
                foreign = true;
            }
        }

        if matched == required {
            // Queue order is chronological, so first/last bound the spread
            let spread = match (first_time, last_time) {
                (Some(first), Some(last)) => elapsed(last, first),
                _ => 0,
            };
            if spread <= term {
                return MatchStatus::Full;
            }
            return MatchStatus::None;
        }

        if matched > 0 && !foreign {
            if let Some(first) = first_time {
                if elapsed(now, first) <= term {
                    return MatchStatus::Candidate;
                }
            }
        }

        MatchStatus::None
    }

    /// Commit a matched combo: consume its presses, fire the output as a
    /// press plus deferred release on the virtual combo key, and replay the
    /// remaining queue.
    fn combo_commit<A: AnalogReader>(
        &mut self,
        matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        now: u32,
        ak: &hallmk_types::config::AdvancedKey,
    ) -> bool {
        let AdvancedBehavior::Combo(combo) = ak.behavior else {
            return false;
        };

        for key in combo.required_keys() {
            if let Some(event) = self.combo_queue.iter_mut().find(|e| !e.consumed && e.key == key) {
                event.consumed = true;
            }
        }

        let release = DeferredAction {
            action: DeferredActionType::Release,
            key: COMBO_VIRTUAL_KEY,
            keycode: combo.output_keycode,
        };
        if self.deferred.push(release).is_ok() {
            self.register(COMBO_VIRTUAL_KEY, combo.output_keycode);
        }

        self.combo_flush_all(matrix, now);
        true
    }

    /// Drain the queue in order: consumed presses are dropped, unconsumed
    /// ones replayed through normal dispatch. Guarded against re-entry; a
    /// nested flush leaves its events queued for the next tick.
    fn combo_flush_all<A: AnalogReader>(
        &mut self,
        matrix: &mut Matrix<'a, A, NUM_KEYS, NUM_LAYERS, NUM_PROFILES>,
        now: u32,
    ) -> bool {
        if self.combo_flushing {
            return false;
        }
        self.combo_flushing = true;

        let mut has_non_tap_hold_press = false;
        while let Some(event) = self.combo_queue.pop_front() {
            if event.consumed {
                continue;
            }
            if self.process_key(matrix, now, event.key, event.pressed) {
                has_non_tap_hold_press = true;
            }
        }

        self.combo_flushing = false;
        has_non_tap_hold_press
    }
}

fn combo_term(combo: &Combo) -> u32 {
    if combo.term == 0 {
        DEFAULT_COMBO_TERM
    } else {
        combo.term as u32
    }
}
