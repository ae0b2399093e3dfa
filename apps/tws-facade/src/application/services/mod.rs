//! Application Services
//!
//! The request/response engine that turns one logical operation into a
//! synchronous result over the push-based event stream.
//!
//! Every operation follows the same template:
//!
//! ```text
//! subscribe ──► send request ──► pop until terminal ──► teardown ──► result
//! ```
//!
//! - `current_time`: Server time
//! - `positions`: Account positions (account-update toggle guarded)
//! - `market_data`: Snapshot quotes with option computations
//! - `historical_data`: Historical bar series
//!
//! Each call owns its channel and registration. Teardown runs from drop
//! guards, so it happens on success, error, timeout and cancellation alike.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::application::channel::{EventReceiver, event_channel};
use crate::application::ports::Transport;
use crate::application::subscription::SubscriptionManager;
use crate::domain::events::{ApiError, Event, Selector};
use crate::error::Error;
use crate::infrastructure::metrics;

/// Server time request.
pub mod current_time;

/// Historical bar request.
pub mod historical_data;

/// Market data snapshot request.
pub mod market_data;

/// Account positions request.
pub mod positions;

// =============================================================================
// Operation
// =============================================================================

/// Logical operation, used to label logs, errors and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Server time request.
    CurrentTime,
    /// Account positions request.
    Positions,
    /// Market data snapshot request.
    MarketData,
    /// Historical bars request.
    HistoricalData,
}

impl Operation {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CurrentTime => "current_time",
            Self::Positions => "positions",
            Self::MarketData => "market_data",
            Self::HistoricalData => "historical_data",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Correlation
// =============================================================================

/// Whether a drain loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Wait for more events.
    Continue,
    /// The terminal condition was observed.
    Done,
}

/// Per-call interpretation of the event stream.
///
/// A correlation names the selectors it needs, folds each event into its
/// local state, and produces the result once the terminal event arrived.
pub trait Correlation {
    /// Result of the operation.
    type Output;

    /// Operation label for logs, errors and metrics.
    const OPERATION: Operation;

    /// Event categories this operation subscribes to.
    fn selectors(&self) -> &'static [Selector];

    /// Fold one event into the call state.
    ///
    /// # Errors
    ///
    /// Returns an error to abort the call, e.g. on an unexpected event type.
    fn on_event(&mut self, event: Event) -> Result<Step, Error>;

    /// Produce the result after the terminal event.
    ///
    /// # Errors
    ///
    /// Returns an error if the collected state cannot be translated.
    fn finish(self) -> Result<Self::Output, Error>;
}

// =============================================================================
// Request Context
// =============================================================================

/// Bounds on how long a drain loop waits.
#[derive(Debug, Clone, Default)]
pub struct DrainOptions {
    /// Overall deadline per call; `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Aborts waiting calls when cancelled.
    pub cancel: Option<CancellationToken>,
}

/// Collaborators a single call runs against.
#[derive(Clone, Copy)]
pub struct RequestContext<'a> {
    /// Outbound request port.
    pub transport: &'a dyn Transport,
    /// Registration bookkeeping.
    pub subscriptions: &'a SubscriptionManager,
    /// Wait bounds.
    pub options: &'a DrainOptions,
}

impl std::fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("subscriptions", self.subscriptions)
            .field("options", self.options)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Run one logical request.
///
/// `send` issues the outbound request after the subscription is armed. The
/// value it returns is held until the drain loop ends and is dropped before
/// the subscription, so it can carry request-scoped teardown.
///
/// # Errors
///
/// Returns the first error raised by subscribing, sending, draining or
/// translating.
pub fn execute<C, G, F>(ctx: RequestContext<'_>, correlation: C, send: F) -> Result<C::Output, Error>
where
    C: Correlation,
    F: FnOnce() -> Result<G, Error>,
{
    let operation = C::OPERATION;
    let started = Instant::now();
    metrics::record_request(operation);
    tracing::debug!(%operation, "Request started");

    let result = run(ctx, correlation, send, started);

    let elapsed = started.elapsed();
    metrics::record_request_duration(operation, elapsed);
    match &result {
        Ok(_) => tracing::debug!(%operation, ?elapsed, "Request completed"),
        Err(e) => {
            metrics::record_request_failure(operation, e.kind());
            tracing::warn!(%operation, ?elapsed, error = %e, "Request failed");
        }
    }

    result
}

fn run<C, G, F>(ctx: RequestContext<'_>, mut correlation: C, send: F, started: Instant) -> Result<C::Output, Error>
where
    C: Correlation,
    F: FnOnce() -> Result<G, Error>,
{
    let (sink, events) = event_channel();
    let _subscription = ctx.subscriptions.subscribe(correlation.selectors(), sink)?;

    let request_guard = send()?;
    drain(&events, &mut correlation, ctx.options, started)?;
    drop(request_guard);

    correlation.finish()
}

fn drain<C: Correlation>(
    events: &EventReceiver,
    correlation: &mut C,
    options: &DrainOptions,
    started: Instant,
) -> Result<(), Error> {
    let deadline = options.timeout.map(|timeout| started + timeout);

    loop {
        let event = events
            .pop_until(deadline, options.cancel.as_ref())
            .map_err(|e| Error::from_pop(e, C::OPERATION.as_str(), started.elapsed()))?;
        metrics::record_event_received(event.selector());

        if correlation.on_event(event)? == Step::Done {
            return Ok(());
        }
    }
}

// =============================================================================
// Shared Event Handling
// =============================================================================

/// Error for an event type the operation does not handle.
#[must_use]
pub fn unexpected(operation: Operation, event: &Event) -> Error {
    Error::UnexpectedMessage {
        operation: operation.as_str(),
        received: event.type_name(),
    }
}

/// Whether a request-scoped event belongs to `request_id`.
///
/// Events for other requests are logged and counted, not treated as errors.
#[must_use]
pub fn belongs_to(operation: Operation, request_id: i32, event: &Event) -> bool {
    match event.request_id() {
        Some(id) if id != request_id => {
            tracing::debug!(
                %operation,
                request_id,
                event_request_id = id,
                event = event.type_name(),
                "Ignoring event for another request"
            );
            metrics::record_event_ignored(operation);
            false
        }
        _ => true,
    }
}

/// Handle a platform error seen by a call.
///
/// Errors addressed to `request_id` or to the whole connection concern the
/// call; errors for other requests are ignored. Calls without a request id
/// pass `None` and only react to connection-level errors.
///
/// # Errors
///
/// Returns [`Error::Api`] for a failure code addressed to the call.
pub fn api_error(operation: Operation, request_id: Option<i32>, error: ApiError) -> Result<Step, Error> {
    if !error.is_connection_level() && Some(error.id) != request_id {
        tracing::debug!(
            %operation,
            ?request_id,
            event_request_id = error.id,
            code = error.code,
            "Ignoring platform error for another request"
        );
        metrics::record_event_ignored(operation);
        return Ok(Step::Continue);
    }

    if error.is_informational() {
        tracing::info!(%operation, code = error.code, message = %error.message, "Platform notice");
        return Ok(Step::Continue);
    }

    Err(Error::Api {
        request_id: error.id,
        code: error.code,
        message: error.message,
    })
}

// =============================================================================
// Tests
// =============================================================================
