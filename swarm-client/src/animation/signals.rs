//! Pause gate and stop flag shared between the control loop and the player.
//!
//! Both are level-triggered and carry no payload. The player samples them once
//! per frame at [`PlaybackSignals::checkpoint`]; nothing is preempted mid-frame.

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct SignalState {
    paused: bool,
    stopped: bool,
    /// A checkpoint is currently blocked on the pause gate
    held: bool,
}

/// Result of a per-frame checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// Not paused, carry on
    Proceed,
    /// Was held by the pause gate and has now been released
    Resumed,
    Stop,
}

#[derive(Debug, Default)]
pub struct PlaybackSignals {
    state: Mutex<SignalState>,
    changed: Condvar,
}

impl PlaybackSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear both signals for a new session.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.paused = false;
        state.stopped = false;
    }

    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
        self.changed.notify_all();
    }

    /// Raise the stop flag. Also releases a checkpoint held by the pause gate.
    pub fn stop(&self) {
        self.state.lock().stopped = true;
        self.changed.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    /// Whether the player is currently waiting on the pause gate.
    pub fn is_held(&self) -> bool {
        self.state.lock().held
    }

    /// Wait out the pause gate, then sample the stop flag.
    pub fn checkpoint(&self) -> Checkpoint {
        let mut state = self.state.lock();
        let mut waited = false;
        while state.paused && !state.stopped {
            state.held = true;
            waited = true;
            self.changed.wait(&mut state);
        }
        state.held = false;
        if state.stopped {
            Checkpoint::Stop
        } else if waited {
            Checkpoint::Resumed
        } else {
            Checkpoint::Proceed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn wait_held(signals: &PlaybackSignals) {
        for _ in 0..200 {
            if signals.is_held() {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("checkpoint never blocked");
    }

    #[test]
    fn test_checkpoint_without_signals() {
        let signals = PlaybackSignals::new();
        assert_eq!(signals.checkpoint(), Checkpoint::Proceed);
        signals.stop();
        assert_eq!(signals.checkpoint(), Checkpoint::Stop);
        signals.reset();
        assert_eq!(signals.checkpoint(), Checkpoint::Proceed);
    }

    #[test]
    fn test_pause_holds_until_resume() {
        let signals = Arc::new(PlaybackSignals::new());
        signals.pause();
        let worker = {
            let signals = Arc::clone(&signals);
            thread::spawn(move || signals.checkpoint())
        };
        wait_held(&signals);
        signals.resume();
        assert_eq!(worker.join().unwrap(), Checkpoint::Resumed);
        assert!(!signals.is_held());
    }

    #[test]
    fn test_stop_releases_paused_checkpoint() {
        let signals = Arc::new(PlaybackSignals::new());
        signals.pause();
        let worker = {
            let signals = Arc::clone(&signals);
            thread::spawn(move || signals.checkpoint())
        };
        wait_held(&signals);
        signals.stop();
        assert_eq!(worker.join().unwrap(), Checkpoint::Stop);
        assert!(signals.is_paused());
    }
}
