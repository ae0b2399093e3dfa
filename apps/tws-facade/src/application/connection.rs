//! Connection
//!
//! The public, blocking surface of the facade. One `Connection` wraps one
//! transport for the life of the process; it is not reconnect-aware.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tws_facade::connect;
//! use tws_facade::infrastructure::loopback::{LoopbackConnector, LoopbackTransport};
//!
//! let connector = LoopbackConnector::new(Arc::new(LoopbackTransport::new()));
//! let connection = connect(&connector, None, None)?;
//! let ibm = connection.create_stock("IBM", None, None);
//! let quote = connection.get_market_data(&ibm)?;
//! println!("{:?}", quote.get("last"));
//! # Ok::<(), tws_facade::Error>(())
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{Connector, Transport};
use crate::application::services::historical_data::HistoricalQuery;
use crate::application::services::{
    DrainOptions, RequestContext, current_time, historical_data, market_data, positions,
};
use crate::application::subscription::{SubscriptionManager, SubscriptionStats};
use crate::domain::historical::{BarSize, DurationPolicy, HistoricalBar, WhatToShow};
use crate::domain::instrument::{ContractDescriptor, DEFAULT_CURRENCY, DEFAULT_EXCHANGE};
use crate::domain::position::Position;
use crate::domain::quote::InstrumentQuote;
use crate::error::Error;
use crate::infrastructure::config::ConnectionSettings;
use crate::infrastructure::metrics;

/// Connect to the platform.
///
/// `host` and `port` override `IB_HOSTNAME` / `IB_PORT`, which in turn
/// override `localhost:7496`.
///
/// # Errors
///
/// Returns an error if the settings are invalid or the connector fails.
pub fn connect<C>(connector: &C, host: Option<&str>, port: Option<u16>) -> Result<Connection, Error>
where
    C: Connector + ?Sized,
{
    let settings = ConnectionSettings::resolve(host, port)?;
    Connection::open(connector, settings)
}

/// A live connection to the platform.
pub struct Connection {
    transport: Arc<dyn Transport>,
    subscriptions: SubscriptionManager,
    next_request_id: AtomicI32,
    settings: ConnectionSettings,
    duration_policy: Arc<dyn DurationPolicy>,
    positions_lock: Mutex<()>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("settings", &self.settings)
            .field("subscriptions", &self.subscriptions)
            .field("duration_policy", &self.duration_policy)
            .field("shutdown", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connect with already resolved settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the connector fails.
    pub fn open<C>(connector: &C, settings: ConnectionSettings) -> Result<Self, Error>
    where
        C: Connector + ?Sized,
    {
        metrics::describe_metrics();
        let transport = connector.connect(&settings)?;
        tracing::info!(
            host = %settings.host,
            port = settings.port,
            client_id = settings.client_id,
            "Connected"
        );
        Ok(Self::new(transport, settings))
    }

    /// Wrap a connected transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, settings: ConnectionSettings) -> Self {
        Self {
            subscriptions: SubscriptionManager::new(Arc::clone(&transport)),
            transport,
            next_request_id: AtomicI32::new(1),
            duration_policy: settings.duration_policy(),
            settings,
            positions_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the historical duration policy.
    #[must_use]
    pub fn with_duration_policy(mut self, policy: Arc<dyn DurationPolicy>) -> Self {
        self.duration_policy = policy;
        self
    }

    /// Replace the per-call deadline.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.settings.request_timeout = timeout;
        self
    }

    /// Resolved settings.
    #[must_use]
    pub const fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Registration statistics.
    #[must_use]
    pub fn subscription_stats(&self) -> SubscriptionStats {
        self.subscriptions.stats()
    }

    /// Token that aborts blocked calls when cancelled.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Abort every blocked call with [`Error::Cancelled`]; later calls fail
    /// the same way.
    pub fn shutdown(&self) {
        tracing::info!("Connection shutting down");
        self.shutdown.cancel();
    }

    fn next_request_id(&self) -> i32 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn drain_options(&self) -> DrainOptions {
        DrainOptions {
            timeout: self.settings.request_timeout,
            cancel: Some(self.shutdown.clone()),
        }
    }

    fn context<'a>(&'a self, options: &'a DrainOptions) -> RequestContext<'a> {
        RequestContext {
            transport: self.transport.as_ref(),
            subscriptions: &self.subscriptions,
            options,
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Server time.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, times out, or the reply is not
    /// a server time.
    pub fn get_current_time(&self) -> Result<DateTime<Utc>, Error> {
        let options = self.drain_options();
        current_time::get_current_time(self.context(&options))
    }

    /// Every position of every account, in arrival order.
    ///
    /// Calls are serialized per connection.
    ///
    /// # Errors
    ///
    /// Returns an error if a request fails, times out, an unexpected event
    /// arrives, or a contract cannot be translated.
    pub fn get_positions(&self) -> Result<Vec<Position>, Error> {
        let _serialized = self.positions_lock.lock();
        let options = self.drain_options();
        positions::get_positions(self.context(&options))
    }

    /// Snapshot quote for a contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, times out, or the platform
    /// rejects the contract.
    pub fn get_market_data(&self, contract: &ContractDescriptor) -> Result<InstrumentQuote, Error> {
        let options = self.drain_options();
        market_data::get_market_data(self.context(&options), self.next_request_id(), contract)
    }

    /// Historical bars in `[from, to]`.
    ///
    /// `extended_hours` includes bars outside regular trading hours.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if `from` is not before `to`, or an
    /// error if the request fails, times out, or a bar cannot be translated.
    pub fn get_historical_data(
        &self,
        contract: &ContractDescriptor,
        from: NaiveDateTime,
        to: NaiveDateTime,
        bar_size: BarSize,
        what_to_show: WhatToShow,
        extended_hours: bool,
    ) -> Result<Vec<HistoricalBar>, Error> {
        let query = HistoricalQuery {
            from,
            to,
            bar_size,
            what_to_show,
            extended_hours,
        };
        let options = self.drain_options();
        historical_data::get_historical_data(
            self.context(&options),
            self.next_request_id(),
            contract,
            &query,
            self.duration_policy.as_ref(),
        )
    }

    // =========================================================================
    // Tickets
    // =========================================================================

    /// Stock ticket. Currency and exchange default to `USD` / `SMART`.
    #[must_use]
    pub fn create_stock(&self, ticker: &str, currency: Option<&str>, exchange: Option<&str>) -> ContractDescriptor {
        ContractDescriptor::stock(ticker)
            .with_currency(currency.unwrap_or(DEFAULT_CURRENCY))
            .with_exchange(exchange.unwrap_or(DEFAULT_EXCHANGE))
    }

    /// Option ticket by local symbol. Currency and exchange default to
    /// `USD` / `SMART`.
    #[must_use]
    pub fn create_option_ticker(
        &self,
        ticker: &str,
        currency: Option<&str>,
        exchange: Option<&str>,
    ) -> ContractDescriptor {
        ContractDescriptor::option(ticker)
            .with_currency(currency.unwrap_or(DEFAULT_CURRENCY))
            .with_exchange(exchange.unwrap_or(DEFAULT_EXCHANGE))
    }
}
