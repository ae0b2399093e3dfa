//! Event Channel
//!
//! Unbounded FIFO conduit between a transport's reader thread (producer) and
//! the thread blocked in a facade call (consumer).
//!
//! - `push` never blocks
//! - `pop` blocks until an event is available, optionally bounded by a
//!   deadline and a cancellation token
//! - events come out in the order they were pushed

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;

use crate::domain::events::Event;

/// How often a blocked consumer re-checks its cancellation token.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why `pop` returned without an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PopError {
    /// The deadline passed.
    #[error("timed out waiting for an event")]
    Timeout,
    /// The cancellation token fired.
    #[error("cancelled while waiting for an event")]
    Cancelled,
    /// The producer side closed the stream.
    #[error("event stream disconnected")]
    Disconnected,
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<Event>,
    disconnected: bool,
    receiver_dropped: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    ready: Condvar,
}

/// Create a connected sender/receiver pair.
#[must_use]
pub fn event_channel() -> (EventSender, EventReceiver) {
    let shared = Arc::new(Shared::default());
    (
        EventSender {
            shared: Arc::clone(&shared),
        },
        EventReceiver { shared },
    )
}

/// Producer half. Cheap to clone; safe to use from any thread.
#[derive(Debug, Clone)]
pub struct EventSender {
    shared: Arc<Shared>,
}

impl EventSender {
    /// Append an event.
    ///
    /// Returns `false` if the receiver is gone and the event was discarded.
    pub fn push(&self, event: Event) -> bool {
        let mut state = self.shared.state.lock();
        if state.receiver_dropped {
            return false;
        }
        state.queue.push_back(event);
        drop(state);
        self.shared.ready.notify_one();
        true
    }

    /// Mark the stream as disconnected.
    ///
    /// Events already queued are still delivered; once drained, `pop`
    /// returns [`PopError::Disconnected`].
    pub fn close(&self) {
        self.shared.state.lock().disconnected = true;
        self.shared.ready.notify_all();
    }

    /// Whether the receiver has been dropped.
    #[must_use]
    pub fn is_receiver_dropped(&self) -> bool {
        self.shared.state.lock().receiver_dropped
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct EventReceiver {
    shared: Arc<Shared>,
}

impl EventReceiver {
    /// Block until an event is available.
    ///
    /// # Errors
    ///
    /// Returns [`PopError::Disconnected`] once the stream is closed and empty.
    pub fn pop(&self) -> Result<Event, PopError> {
        self.pop_until(None, None)
    }

    /// Block until an event is available, the deadline passes, or the token
    /// is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the reason no event was delivered.
    pub fn pop_until(
        &self,
        deadline: Option<Instant>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Event, PopError> {
        let mut state = self.shared.state.lock();

        loop {
            if let Some(event) = state.queue.pop_front() {
                return Ok(event);
            }
            if state.disconnected {
                return Err(PopError::Disconnected);
            }
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(PopError::Cancelled);
            }

            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                return Err(PopError::Timeout);
            }

            let poll = cancel.map(|_| now + CANCEL_POLL_INTERVAL);
            let wake_at = match (deadline, poll) {
                (Some(d), Some(p)) => Some(d.min(p)),
                (d, p) => d.or(p),
            };

            match wake_at {
                Some(at) => {
                    self.shared.ready.wait_until(&mut state, at);
                }
                None => self.shared.ready.wait(&mut state),
            }
        }
    }

    /// Take an event if one is queued.
    #[must_use]
    pub fn try_pop(&self) -> Option<Event> {
        self.shared.state.lock().queue.pop_front()
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    /// Whether no event is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for EventReceiver {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.receiver_dropped = true;
        state.queue.clear();
    }
}

// =============================================================================
// Tests
// =============================================================================
