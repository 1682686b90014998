//! Session playback: takeoff, seek to the first point, play frames, land.
//!
//! Every wait is an absolute deadline derived from the session start:
//!
//! ```text
//! takeoff      at T
//! first point  at T + A                 (A = takeoff_time)
//! frame i      at T + A + B + i·C       (B = reach_first_point_time, C = frame_delay)
//! ```
//!
//! Time spent held by the pause gate shifts every later deadline by the same
//! amount.

use super::signals::{Checkpoint, PlaybackSignals};
use super::state::{AnimationState, SharedPhase};
use crate::clock::Clock;
use crate::config::RuntimeConfig;
use crate::devices::{FlightControl, Frame, LedStrip, Origin};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything fixed when the session was scheduled.
#[derive(Debug, Clone)]
pub struct Session {
    pub frames: Arc<[Frame]>,
    /// Corrected local start time, Unix seconds
    pub start: f64,
    pub config: Arc<RuntimeConfig>,
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Stopped,
}

pub(crate) struct Player<'a> {
    pub flight: &'a dyn FlightControl,
    pub leds: &'a dyn LedStrip,
    pub clock: &'a dyn Clock,
    pub signals: &'a PlaybackSignals,
    pub phase: &'a SharedPhase,
}

impl Player<'_> {
    /// Run the session to completion or stop. Device errors end it immediately.
    pub fn play(&self, session: &Session) -> Result<Outcome> {
        let copter = &session.config.copter;
        let origin = Origin::from(session.config.origin());
        let use_leds = session.config.private.use_leds;
        let Some(first) = session.frames.first() else {
            return Ok(Outcome::Completed);
        };

        // The timer runs on the monotonic clock; realign to wall time
        self.clock.sleep_until(session.start);
        if self.signals.is_stopped() {
            return Ok(self.stopped());
        }
        self.phase.store(AnimationState::TakingOff);
        info!(
            "Takeoff to {:.2}m ({} frames)",
            copter.takeoff_height,
            session.frames.len()
        );
        self.flight.takeoff(copter.takeoff_height, copter.safe_takeoff)?;
        let takeoff_done = session.start + copter.takeoff_time;
        self.clock.sleep_until(takeoff_done);
        if self.signals.is_stopped() {
            return Ok(self.stopped());
        }

        self.phase.store(AnimationState::Seeking);
        info!("Reaching first point");
        self.flight.reach_frame(first, origin)?;
        let mut deadline = takeoff_done + copter.reach_first_point_time;
        self.clock.sleep_until(deadline);

        self.phase.store(AnimationState::Playing);
        info!("Animation started at {:.3}", self.clock.now());
        for (index, frame) in session.frames.iter().enumerate() {
            let before = self.clock.now();
            match self.signals.checkpoint() {
                Checkpoint::Stop => return Ok(self.stopped()),
                Checkpoint::Resumed => {
                    let held = (self.clock.now() - before).max(0.0);
                    deadline += held;
                    info!("Resumed at frame {} after {:.3}s", index, held);
                }
                Checkpoint::Proceed => {}
            }

            self.flight.animate_frame(frame, origin)?;
            if use_leds {
                self.leds.fill(frame.color)?;
            }
            deadline += copter.frame_delay;
            self.clock.sleep_until(deadline);
        }

        self.phase.store(AnimationState::Landing);
        info!("Animation finished, landing");
        self.flight.land()?;
        Ok(Outcome::Completed)
    }

    fn stopped(&self) -> Outcome {
        self.phase.store(AnimationState::Stopped);
        debug!("Stop flag observed, leaving without landing");
        Outcome::Stopped
    }
}
