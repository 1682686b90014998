//! One-shot scheduler entry with a cancellation handle.

use crate::clock::Clock;
use crossbeam_channel::{Sender, at, bounded, select};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::debug;

/// Handle to a pending one-shot action.
///
/// Dropping the handle cancels the action as well.
#[derive(Debug)]
pub struct TimerHandle {
    cancel: Sender<()>,
    thread: JoinHandle<()>,
}

impl TimerHandle {
    /// Cancel the action if it has not fired yet.
    pub fn cancel(self) {
        // The timer thread may already be gone; nothing to do then
        let _ = self.cancel.try_send(());
    }

    /// Whether the action has fired (and returned) or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

/// Run `action` on a `start-timer` thread once the clock reaches `deadline`.
pub fn schedule_once<F>(clock: &dyn Clock, deadline: f64, action: F) -> io::Result<TimerHandle>
where
    F: FnOnce() + Send + 'static,
{
    let fire_at = Instant::now()
        .checked_add(clock.until(deadline))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("deadline {} is out of range", deadline),
            )
        })?;
    let (cancel, cancelled) = bounded::<()>(1);
    let thread = thread::Builder::new()
        .name("start-timer".into())
        .spawn(move || {
            select! {
                recv(cancelled) -> _ => debug!("Scheduled action cancelled"),
                recv(at(fire_at)) -> _ => action(),
            }
        })?;
    Ok(TimerHandle { cancel, thread })
}
