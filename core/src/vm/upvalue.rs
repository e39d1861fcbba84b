//! Upvalue cells.
//!
//! A cell starts *open*, naming a register slot of the coroutine that owns
//! the frame, and is *closed* when that slot goes out of scope: the current
//! value is copied into the cell, which then owns it. Every closure that
//! captured the same slot holds the same `Arc`, so they observe each other's
//! writes before and after closing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::val::Val;

static NEXT_COROUTINE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the call stack that owns a set of registers.
pub type CoroutineId = u64;

pub(crate) fn next_coroutine_id() -> CoroutineId {
    NEXT_COROUTINE_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Clone)]
pub enum UpvalueState {
    Open { owner: CoroutineId, slot: usize },
    Closed(Val),
}

#[derive(Debug)]
pub struct UpvalueCell {
    state: Mutex<UpvalueState>,
}

impl UpvalueCell {
    pub fn open(owner: CoroutineId, slot: usize) -> Self {
        Self {
            state: Mutex::new(UpvalueState::Open { owner, slot }),
        }
    }

    pub fn closed(value: Val) -> Self {
        Self {
            state: Mutex::new(UpvalueState::Closed(value)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, UpvalueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> UpvalueState {
        self.lock().clone()
    }

    /// Register slot, if the cell is still open in `owner`'s stack.
    pub fn open_slot(&self, owner: CoroutineId) -> Option<usize> {
        match *self.lock() {
            UpvalueState::Open { owner: o, slot } if o == owner => Some(slot),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.lock(), UpvalueState::Open { .. })
    }

    /// Moves the slot's value into the cell. Closing twice is a no-op.
    pub fn close(&self, value: Val) {
        let mut state = self.lock();
        if matches!(*state, UpvalueState::Open { .. }) {
            *state = UpvalueState::Closed(value);
        }
    }

    /// Writes through a closed cell; returns false when the cell is open.
    pub fn set_closed(&self, value: Val) -> bool {
        let mut state = self.lock();
        match &mut *state {
            UpvalueState::Closed(slot) => {
                *slot = value;
                true
            }
            UpvalueState::Open { .. } => false,
        }
    }
}
