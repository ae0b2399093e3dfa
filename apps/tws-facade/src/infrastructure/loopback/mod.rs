//! Loopback Transport
//!
//! In-process [`Transport`] with a real dispatch registry and reader thread,
//! but no network. Every outbound request is logged and handed to a
//! responder that scripts the events the "platform" sends back; a background
//! reader thread dispatches them to the registered sinks in order.
//!
//! Used by tests and offline demos.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};

use crate::application::channel::EventSender;
use crate::application::ports::{
    Connector, HistoricalDataRequest, RegistrationId, Transport, TransportError,
};
use crate::domain::events::{Event, Selector};
use crate::domain::instrument::ContractDescriptor;
use crate::infrastructure::config::ConnectionSettings;

/// A request received by the loopback transport.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    /// `reqCurrentTime`.
    CurrentTime,
    /// `reqAccountUpdates`.
    AccountUpdates {
        /// Enable or disable.
        subscribe: bool,
        /// Account code (empty for all).
        account: String,
    },
    /// `reqMktData`.
    MarketData {
        /// Request id.
        request_id: i32,
        /// Contract.
        contract: ContractDescriptor,
        /// Generic tick list.
        generic_ticks: String,
        /// Snapshot flag.
        snapshot: bool,
    },
    /// `reqHistoricalData`.
    HistoricalData(HistoricalDataRequest),
}

/// Scripts the events sent back for a request.
pub type Responder = dyn Fn(&OutboundRequest) -> Vec<Event> + Send + Sync;

type Registry = RwLock<HashMap<RegistrationId, (Vec<Selector>, EventSender)>>;

/// Push a copy of `event` into every sink registered for its selector.
fn dispatch_to(registry: &Registry, event: &Event) -> usize {
    let selector = event.selector();
    let mut delivered = 0;
    for (selectors, sink) in registry.read().values() {
        if selectors.contains(&selector) && sink.push(event.clone()) {
            delivered += 1;
        }
    }
    delivered
}

/// In-process transport.
pub struct LoopbackTransport {
    registry: Arc<Registry>,
    next_id: AtomicU64,
    requests: RwLock<Vec<OutboundRequest>>,
    responder: Box<Responder>,
    connected: AtomicBool,
    outbox: Mutex<Option<mpsc::Sender<Event>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for LoopbackTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackTransport")
            .field("registrations", &self.registration_count())
            .field("requests", &self.requests.read().len())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackTransport {
    /// A transport that answers nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_responder(|_| Vec::new())
    }

    /// A transport that answers each request with the responder's events.
    #[must_use]
    pub fn with_responder(responder: impl Fn(&OutboundRequest) -> Vec<Event> + Send + Sync + 'static) -> Self {
        let registry: Arc<Registry> = Arc::new(RwLock::new(HashMap::new()));
        let (outbox, inbox) = mpsc::channel::<Event>();

        let reader_registry = Arc::clone(&registry);
        let reader = std::thread::Builder::new()
            .name("loopback-reader".to_string())
            .spawn(move || {
                for event in inbox {
                    let delivered = dispatch_to(&reader_registry, &event);
                    tracing::trace!(event = event.type_name(), delivered, "Dispatched");
                }
            })
            .map_err(|e| tracing::error!(error = %e, "Failed to spawn loopback reader"))
            .ok();

        Self {
            registry,
            next_id: AtomicU64::new(1),
            requests: RwLock::new(Vec::new()),
            responder: Box::new(responder),
            connected: AtomicBool::new(true),
            outbox: Mutex::new(reader.as_ref().map(|_| outbox)),
            reader: Mutex::new(reader),
        }
    }

    /// Dispatch an event synchronously on the calling thread.
    ///
    /// Returns the number of sinks that accepted it.
    pub fn dispatch(&self, event: &Event) -> usize {
        dispatch_to(&self.registry, event)
    }

    /// Queue an event for the reader thread.
    pub fn emit(&self, event: Event) {
        if let Some(outbox) = self.outbox.lock().as_ref() {
            // The reader only stops once the outbox is gone.
            let _ = outbox.send(event);
        }
    }

    /// Number of live registrations.
    #[must_use]
    pub fn registration_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Every request received so far, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<OutboundRequest> {
        self.requests.read().clone()
    }

    /// Whether the transport still accepts requests.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Drop the "connection": close every registered sink and refuse
    /// further requests.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        for (_, sink) in self.registry.read().values() {
            sink.close();
        }
    }

    fn submit(&self, request: OutboundRequest) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let events = (self.responder)(&request);
        tracing::trace!(?request, replies = events.len(), "Loopback request");
        self.requests.write().push(request);

        for event in events {
            self.emit(event);
        }
        Ok(())
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        self.outbox.lock().take();
        if let Some(reader) = self.reader.lock().take()
            && reader.join().is_err()
        {
            tracing::warn!("Loopback reader panicked");
        }
    }
}

impl Transport for LoopbackTransport {
    fn register(&self, selectors: &[Selector], sink: EventSender) -> Result<RegistrationId, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.write().insert(id, (selectors.to_vec(), sink));
        Ok(id)
    }

    fn unregister(&self, id: RegistrationId) -> Result<(), TransportError> {
        self.registry
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or(TransportError::UnknownRegistration(id))
    }

    fn request_current_time(&self) -> Result<(), TransportError> {
        self.submit(OutboundRequest::CurrentTime)
    }

    fn request_account_updates(&self, subscribe: bool, account: &str) -> Result<(), TransportError> {
        self.submit(OutboundRequest::AccountUpdates {
            subscribe,
            account: account.to_string(),
        })
    }

    fn request_market_data(
        &self,
        request_id: i32,
        contract: &ContractDescriptor,
        generic_ticks: &str,
        snapshot: bool,
    ) -> Result<(), TransportError> {
        self.submit(OutboundRequest::MarketData {
            request_id,
            contract: contract.clone(),
            generic_ticks: generic_ticks.to_string(),
            snapshot,
        })
    }

    fn request_historical_data(&self, request: &HistoricalDataRequest) -> Result<(), TransportError> {
        self.submit(OutboundRequest::HistoricalData(request.clone()))
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Hands out a shared [`LoopbackTransport`] and remembers the settings it
/// was asked to connect with.
#[derive(Debug)]
pub struct LoopbackConnector {
    transport: Arc<LoopbackTransport>,
    last_settings: Mutex<Option<ConnectionSettings>>,
}

impl LoopbackConnector {
    /// Connector for an existing transport.
    #[must_use]
    pub const fn new(transport: Arc<LoopbackTransport>) -> Self {
        Self {
            transport,
            last_settings: Mutex::new(None),
        }
    }

    /// The shared transport.
    #[must_use]
    pub fn transport(&self) -> Arc<LoopbackTransport> {
        Arc::clone(&self.transport)
    }

    /// Settings of the most recent `connect` call.
    #[must_use]
    pub fn last_settings(&self) -> Option<ConnectionSettings> {
        self.last_settings.lock().clone()
    }
}

impl Connector for LoopbackConnector {
    fn connect(&self, settings: &ConnectionSettings) -> Result<Arc<dyn Transport>, TransportError> {
        *self.last_settings.lock() = Some(settings.clone());

        if !self.transport.is_connected() {
            return Err(TransportError::ConnectFailed {
                host: settings.host.clone(),
                port: settings.port,
                reason: "loopback transport is disconnected".to_string(),
            });
        }

        tracing::info!(host = %settings.host, port = settings.port, client_id = settings.client_id, "Loopback connected");
        let transport: Arc<dyn Transport> = self.transport.clone();
        Ok(transport)
    }
}

// =============================================================================
// Tests
// =============================================================================
