//! Metrics Module
//!
//! Records facade metrics through the `metrics` facade. Installing an
//! exporter is left to the embedding application; without one every call
//! here is a no-op.
//!
//! # Metrics Categories
//!
//! - **Requests**: Logical operations issued and failed, by operation
//! - **Events**: Events drained by selector, and events ignored as foreign
//! - **Subscriptions**: Active transport registrations
//! - **Latency**: End-to-end request duration

use std::sync::Once;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use crate::application::services::Operation;
use crate::domain::events::Selector;

static DESCRIBE: Once = Once::new();

// =============================================================================
// Metric Registration
// =============================================================================

/// Register metric descriptions with the installed recorder.
///
/// Safe to call more than once; only the first call registers.
pub fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(
            "tws_facade_requests_total",
            "Total logical requests issued, by operation"
        );
        describe_counter!(
            "tws_facade_request_failures_total",
            "Total failed requests, by operation and failure kind"
        );
        describe_counter!(
            "tws_facade_events_received_total",
            "Total events drained from call channels, by selector"
        );
        describe_counter!(
            "tws_facade_events_ignored_total",
            "Total events ignored because they belonged to another request"
        );
        describe_gauge!(
            "tws_facade_active_subscriptions",
            "Number of active transport registrations"
        );
        describe_histogram!(
            "tws_facade_request_duration_seconds",
            "Time from subscribe to teardown for one logical request"
        );
    });
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a request being issued.
pub fn record_request(operation: Operation) {
    counter!(
        "tws_facade_requests_total",
        "operation" => operation.as_str()
    )
    .increment(1);
}

/// Record a failed request.
pub fn record_request_failure(operation: Operation, kind: &'static str) {
    counter!(
        "tws_facade_request_failures_total",
        "operation" => operation.as_str(),
        "kind" => kind
    )
    .increment(1);
}

/// Record an event drained from a call channel.
pub fn record_event_received(selector: Selector) {
    counter!(
        "tws_facade_events_received_total",
        "selector" => selector.as_str()
    )
    .increment(1);
}

/// Record an event ignored because it carried another request's id.
pub fn record_event_ignored(operation: Operation) {
    counter!(
        "tws_facade_events_ignored_total",
        "operation" => operation.as_str()
    )
    .increment(1);
}

/// Update the active registration count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_subscriptions(count: usize) {
    gauge!("tws_facade_active_subscriptions").set(count as f64);
}

/// Record the duration of a request.
pub fn record_request_duration(operation: Operation, duration: Duration) {
    histogram!(
        "tws_facade_request_duration_seconds",
        "operation" => operation.as_str()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================
