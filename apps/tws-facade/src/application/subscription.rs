//! Subscription Management
//!
//! Registers interest in selector sets against a transport's dispatch
//! registry and guarantees the registration is removed again.
//!
//! # Design
//!
//! Every facade call owns exactly one registration, held by a
//! [`Subscription`] guard. The manager tracks:
//! - Which selectors each registration covers
//! - Reference counts per selector across live registrations
//!
//! Overlapping windows on the same selector are legal (each call has its own
//! channel) but are logged, since the transport then fans every matching
//! event out to all of them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::application::channel::EventSender;
use crate::application::ports::{RegistrationId, Transport, TransportError};
use crate::domain::events::Selector;
use crate::infrastructure::metrics;

// =============================================================================
// Registration State
// =============================================================================

#[derive(Debug, Default)]
struct RegistrationState {
    /// Selectors covered by each live registration.
    registrations: HashMap<RegistrationId, Vec<Selector>>,
    /// Number of live registrations per selector.
    selector_refcount: HashMap<Selector, usize>,
}

impl RegistrationState {
    /// Track a registration.
    ///
    /// Returns selectors that were already covered by another registration.
    fn add(&mut self, id: RegistrationId, selectors: &[Selector]) -> Vec<Selector> {
        let mut overlapping = Vec::new();

        for selector in selectors {
            let refcount = self.selector_refcount.entry(*selector).or_insert(0);
            if *refcount > 0 {
                overlapping.push(*selector);
            }
            *refcount += 1;
        }

        self.registrations.insert(id, selectors.to_vec());
        overlapping
    }

    /// Forget a registration.
    ///
    /// Returns selectors no longer covered by any registration.
    fn remove(&mut self, id: RegistrationId) -> Vec<Selector> {
        let Some(selectors) = self.registrations.remove(&id) else {
            return vec![];
        };

        let mut released = Vec::new();
        for selector in selectors {
            if let Some(refcount) = self.selector_refcount.get_mut(&selector) {
                *refcount = refcount.saturating_sub(1);

                if *refcount == 0 {
                    self.selector_refcount.remove(&selector);
                    released.push(selector);
                }
            }
        }

        released
    }
}

// =============================================================================
// Subscription Manager
// =============================================================================

/// Registers selector sets against a transport.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tws_facade::application::channel::event_channel;
/// use tws_facade::application::subscription::SubscriptionManager;
/// use tws_facade::domain::events::Selector;
/// use tws_facade::infrastructure::loopback::LoopbackTransport;
///
/// let transport = Arc::new(LoopbackTransport::new());
/// let manager = SubscriptionManager::new(transport.clone());
///
/// let (sink, _events) = event_channel();
/// let subscription = manager.subscribe(&[Selector::CurrentTime], sink).unwrap();
/// assert_eq!(manager.stats().registrations, 1);
///
/// drop(subscription);
/// assert_eq!(manager.stats().registrations, 0);
/// assert_eq!(transport.registration_count(), 0);
/// ```
pub struct SubscriptionManager {
    transport: Arc<dyn Transport>,
    state: RwLock<RegistrationState>,
}

impl std::fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

impl SubscriptionManager {
    /// Create a manager for a transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: RwLock::new(RegistrationState::default()),
        }
    }

    /// Forward every event whose selector is in `selectors` into `sink`
    /// until the returned guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the registration.
    pub fn subscribe(
        &self,
        selectors: &[Selector],
        sink: EventSender,
    ) -> Result<Subscription<'_>, TransportError> {
        let id = self.transport.register(selectors, sink)?;

        let (overlapping, active) = {
            let mut state = self.state.write();
            let overlapping = state.add(id, selectors);
            (overlapping, state.registrations.len())
        };

        if !overlapping.is_empty() {
            tracing::debug!(
                registration = id,
                ?overlapping,
                active,
                "Subscription overlaps live registrations"
            );
        }
        tracing::trace!(registration = id, ?selectors, "Subscribed");
        metrics::set_active_subscriptions(active);

        Ok(Subscription {
            manager: self,
            id,
            active: true,
        })
    }

    fn release(&self, id: RegistrationId) -> Result<(), TransportError> {
        let (released, active) = {
            let mut state = self.state.write();
            let released = state.remove(id);
            (released, state.registrations.len())
        };
        metrics::set_active_subscriptions(active);
        tracing::trace!(registration = id, ?released, "Unsubscribed");

        self.transport.unregister(id)
    }

    /// Registration statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        let state = self.state.read();
        SubscriptionStats {
            registrations: state.registrations.len(),
            selectors: state.selector_refcount.len(),
        }
    }

    /// Number of live registrations covering a selector.
    #[must_use]
    pub fn selector_refcount(&self, selector: Selector) -> usize {
        self.state
            .read()
            .selector_refcount
            .get(&selector)
            .copied()
            .unwrap_or_default()
    }
}

// =============================================================================
// Subscription Guard
// =============================================================================

/// A live registration. Dropping it removes the registration.
#[derive(Debug)]
#[must_use = "dropping a Subscription immediately unregisters it"]
pub struct Subscription<'a> {
    manager: &'a SubscriptionManager,
    id: RegistrationId,
    active: bool,
}

impl Subscription<'_> {
    /// Transport registration id.
    #[must_use]
    pub const fn id(&self) -> RegistrationId {
        self.id
    }

    /// Remove the registration now, surfacing transport errors.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to unregister.
    pub fn unsubscribe(mut self) -> Result<(), TransportError> {
        self.active = false;
        self.manager.release(self.id)
    }
}

impl Drop for Subscription<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Err(e) = self.manager.release(self.id) {
            tracing::warn!(registration = self.id, error = %e, "Failed to unregister subscription");
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registration statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriptionStats {
    /// Number of live registrations.
    pub registrations: usize,
    /// Number of distinct selectors covered.
    pub selectors: usize,
}

// =============================================================================
// Tests
// =============================================================================
