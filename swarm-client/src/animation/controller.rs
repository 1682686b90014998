//! Scheduling, signaling and lifecycle of the single animation session.

use super::player::{Outcome, Player, Session};
use super::signals::PlaybackSignals;
use super::state::{AnimationState, SharedPhase};
use super::timer::{TimerHandle, schedule_once};
use crate::clock::Clock;
use crate::config::SharedConfig;
use crate::devices::{AnimationSource, FlightControl, LedStrip};
use crate::error::{ClientError, Result};
use crate::protocol::ProtocolError;
use crate::timesync::TimeSync;
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, error, info, warn};

/// Owns the animation session state machine.
///
/// Cheap to clone; all clones drive the same session.
#[derive(Clone)]
pub struct AnimationController {
    inner: Arc<Inner>,
}

struct Inner {
    flight: Arc<dyn FlightControl>,
    leds: Arc<dyn LedStrip>,
    source: Arc<dyn AnimationSource>,
    clock: Arc<dyn Clock>,
    config: SharedConfig,
    phase: SharedPhase,
    signals: PlaybackSignals,
    timer: Mutex<Option<TimerHandle>>,
    /// Error that ended the last session, kept until taken by the control loop
    fault: Mutex<Option<ClientError>>,
    /// Node-wide shutdown flag, raised when playback hits a device error
    shutdown: Arc<AtomicBool>,
}

impl AnimationController {
    pub fn new(
        flight: Arc<dyn FlightControl>,
        leds: Arc<dyn LedStrip>,
        source: Arc<dyn AnimationSource>,
        clock: Arc<dyn Clock>,
        config: SharedConfig,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                flight,
                leds,
                source,
                clock,
                config,
                phase: SharedPhase::default(),
                signals: PlaybackSignals::new(),
                timer: Mutex::new(None),
                fault: Mutex::new(None),
                shutdown,
            }),
        }
    }

    pub fn state(&self) -> AnimationState {
        self.inner.phase.load()
    }

    pub fn signals(&self) -> &PlaybackSignals {
        &self.inner.signals
    }

    /// Take the device error that aborted playback, if any.
    pub fn take_fault(&self) -> Option<ClientError> {
        self.inner.fault.lock().take()
    }

    /// Schedule a session starting at `server_time` (server clock, Unix seconds).
    ///
    /// Returns the corrected local start time. Rejected while another session
    /// is active, or when there are no frames to play.
    pub fn start_at(&self, server_time: f64) -> Result<f64> {
        let inner = &self.inner;
        let current = inner.phase.load();
        if current.is_active() {
            return Err(ClientError::SessionActive(current));
        }

        let config = inner.config.load_full();
        let frames = inner.source.load()?;
        if frames.is_empty() {
            warn!("No animation frames loaded, ignoring start");
            return Err(ClientError::EmptyAnimation);
        }

        let start = match TimeSync::from_config(&config.ntp)
            .and_then(|sync| sync.offset(&*inner.clock))
        {
            Some(offset) => {
                debug!("Clock offset to reference: {:+.3}s", offset);
                server_time - offset
            }
            None => server_time,
        };

        inner
            .phase
            .transition(AnimationState::Idle, AnimationState::Scheduled)
            .map_err(ClientError::SessionActive)?;
        inner.signals.reset();

        let session = Session {
            frames: frames.into(),
            start,
            config,
        };
        let launcher = Arc::clone(inner);
        let timer = match schedule_once(&*inner.clock, start, move || {
            Inner::launch(launcher, session)
        }) {
            Ok(timer) => timer,
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {
                inner.phase.store(AnimationState::Idle);
                return Err(ProtocolError::InvalidArgument {
                    command: "starttime".into(),
                    field: "time",
                    reason: e.to_string(),
                }
                .into());
            }
            Err(e) => {
                inner.phase.store(AnimationState::Idle);
                return Err(ClientError::Device(format!("failed to schedule start: {}", e)));
            }
        };
        *inner.timer.lock() = Some(timer);

        info!("Animation scheduled in {:.3}s", start - inner.clock.now());
        Ok(start)
    }

    /// Hold playback at the next frame checkpoint.
    pub fn pause(&self) {
        info!("Pausing animation ({})", self.state());
        self.inner.signals.pause();
    }

    pub fn resume(&self) {
        info!("Resuming animation");
        self.inner.signals.resume();
    }

    /// Stop the session and interrupt flight immediately.
    ///
    /// A session that has not started yet is cancelled; a running one ends at
    /// its next checkpoint without landing.
    pub fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        info!("Stopping animation ({})", inner.phase.load());
        inner.signals.stop();
        if let Some(timer) = inner.timer.lock().take() {
            timer.cancel();
        }
        if inner
            .phase
            .transition(AnimationState::Scheduled, AnimationState::Idle)
            .is_ok()
        {
            info!("Scheduled start cancelled");
        }
        inner.flight.interrupt()
    }
}

impl Inner {
    /// Timer callback: hand the session to a fresh `animation` thread.
    fn launch(inner: Arc<Inner>, session: Session) {
        if inner
            .phase
            .transition(AnimationState::Scheduled, AnimationState::TakingOff)
            .is_err()
        {
            debug!("Session no longer scheduled, not starting");
            return;
        }

        let worker = Arc::clone(&inner);
        let spawned = thread::Builder::new()
            .name("animation".into())
            .spawn(move || worker.run(&session));
        if let Err(e) = spawned {
            error!("Failed to spawn animation thread: {}", e);
            inner.phase.store(AnimationState::Idle);
            inner.fail(ClientError::Device(format!("failed to spawn animation thread: {}", e)));
        }
    }

    fn run(&self, session: &Session) {
        let player = Player {
            flight: &*self.flight,
            leds: &*self.leds,
            clock: &*self.clock,
            signals: &self.signals,
            phase: &self.phase,
        };
        match player.play(session) {
            Ok(Outcome::Completed) => info!("Animation completed"),
            Ok(Outcome::Stopped) => info!("Animation stopped"),
            Err(e) => {
                error!("Animation aborted: {}", e);
                self.fail(e);
            }
        }
        self.phase.store(AnimationState::Idle);
    }

    /// Record the fault, then raise shutdown so the control loop picks it up.
    fn fail(&self, error: ClientError) {
        *self.fault.lock() = Some(error);
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
