//! Time-synchronized animation playback.
//!
//! A `starttime` command schedules one session through a cancellable one-shot
//! timer. When it fires, a dedicated `animation` thread runs the takeoff, seek,
//! play and land sequence with absolute-deadline waits. The control loop only
//! flips the pause gate and stop flag and never blocks on that thread.

mod controller;
mod player;
mod signals;
mod state;
mod timer;

pub use controller::AnimationController;
pub use player::{Outcome, Session};
pub use signals::{Checkpoint, PlaybackSignals};
pub use state::{AnimationState, SharedPhase};
pub use timer::{TimerHandle, schedule_once};
