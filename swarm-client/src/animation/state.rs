//! Session phase and its lock-free shared cell.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Phase of the animation session.
///
/// ```text
/// Idle → Scheduled → TakingOff → Seeking → Playing → Landing → Idle
///                                             └────→ Stopped ─→ Idle
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AnimationState {
    Idle = 0,
    Scheduled = 1,
    TakingOff = 2,
    Seeking = 3,
    Playing = 4,
    Landing = 5,
    Stopped = 6,
}

impl AnimationState {
    /// Whether a session exists in this phase.
    pub fn is_active(self) -> bool {
        self != AnimationState::Idle
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AnimationState::Idle => "idle",
            AnimationState::Scheduled => "scheduled",
            AnimationState::TakingOff => "taking off",
            AnimationState::Seeking => "seeking",
            AnimationState::Playing => "playing",
            AnimationState::Landing => "landing",
            AnimationState::Stopped => "stopped",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => AnimationState::Scheduled,
            2 => AnimationState::TakingOff,
            3 => AnimationState::Seeking,
            4 => AnimationState::Playing,
            5 => AnimationState::Landing,
            6 => AnimationState::Stopped,
            _ => AnimationState::Idle,
        }
    }
}

impl fmt::Display for AnimationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic cell holding an [`AnimationState`].
#[derive(Debug)]
pub struct SharedPhase(AtomicU8);

impl SharedPhase {
    pub fn new(state: AnimationState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> AnimationState {
        AnimationState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: AnimationState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `from → to` atomically. On failure returns the actual phase.
    pub fn transition(&self, from: AnimationState, to: AnimationState) -> Result<(), AnimationState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(AnimationState::from_u8)
    }
}

impl Default for SharedPhase {
    fn default() -> Self {
        Self::new(AnimationState::Idle)
    }
}
