//! Deferred action queue.
//!
//! Advanced keys sometimes need a register or unregister to land on the next
//! scan cycle instead of the current one, e.g. a Tap-Hold tap whose release
//! must not share a report with its press. Such operations are staged here
//! and drained exactly once per tick, after all other layout work.

use heapless::Deque;

use hallmk_types::keycode::KeyCode;

pub const DEFERRED_ACTION_QUEUE_SIZE: usize = 8;

/// What a staged entry does when it executes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeferredActionType {
    /// Register the keycode
    Press,
    /// Unregister the keycode
    Release,
    /// Register now, unregister one tick later
    Tap,
}

/// One staged register/unregister operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeferredAction {
    pub action: DeferredActionType,
    pub key: u8,
    pub keycode: KeyCode,
}

/// Bounded FIFO of staged operations.
///
/// A full queue rejects the push; the caller is expected to skip the matching
/// register so the report never ends up with a stuck key.
#[derive(Debug, Default)]
pub struct DeferredActionQueue {
    queue: Deque<DeferredAction, DEFERRED_ACTION_QUEUE_SIZE>,
}

impl DeferredActionQueue {
    pub const fn new() -> Self {
        Self { queue: Deque::new() }
    }

    pub fn push(&mut self, action: DeferredAction) -> Result<(), DeferredAction> {
        self.queue.push_back(action).inspect_err(|_| {
            error!("Deferred action queue full");
        })
    }

    pub fn pop(&mut self) -> Option<DeferredAction> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear()
    }
}
