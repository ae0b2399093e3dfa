//! Request Engine Integration Tests
//!
//! Drives every public operation against a loopback platform that answers
//! from a background reader thread, and checks results, outbound requests
//! and teardown.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use tws_facade::application::ports::HistoricalDataRequest;
use tws_facade::domain::events::{
    AccountDownloadEnd, ApiError, CurrentTime, PortfolioUpdate, TickOptionComputation, TickPrice,
    TickSnapshotEnd,
};
use tws_facade::infrastructure::loopback::{LoopbackConnector, LoopbackTransport, OutboundRequest};
use tws_facade::{
    BarDate, BarSize, Connection, ConnectionSettings, ContractDescriptor, Error, Event, Instrument,
    OptionType, SecurityType, WhatToShow, connect,
};

const SERVER_TIME: i64 = 1_382_112_000;

// =============================================================================
// Scripted Platform
// =============================================================================

fn fixture(name: &str) -> Vec<Event> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

fn with_req_id(event: Event, req_id: i32) -> Event {
    match event {
        Event::HistoricalData(mut bar) => {
            bar.req_id = req_id;
            Event::HistoricalData(bar)
        }
        other => other,
    }
}

fn option_contract() -> ContractDescriptor {
    ContractDescriptor {
        con_id: 135_000_001,
        sec_type: SecurityType::Option,
        symbol: "IBM".to_string(),
        local_symbol: "IBM   131019C00190000".to_string(),
        currency: "USD".to_string(),
        exchange: "SMART".to_string(),
        primary_exchange: String::new(),
        multiplier: "100".to_string(),
        right: "C".to_string(),
        strike: 190.0,
        expiry: "20131019".to_string(),
    }
}

fn portfolio() -> Vec<Event> {
    let stock = ContractDescriptor {
        con_id: 8314,
        primary_exchange: "NYSE".to_string(),
        symbol: "IBM".to_string(),
        ..ContractDescriptor::stock("IBM")
    };

    vec![
        Event::PortfolioUpdate(PortfolioUpdate {
            contract: stock,
            position: Decimal::from(100),
            market_price: 174.83,
            market_value: 17_483.0,
            average_cost: 180.12,
            unrealized_pnl: -529.0,
            realized_pnl: 0.0,
            account_name: "DU123456".to_string(),
        }),
        Event::PortfolioUpdate(PortfolioUpdate {
            contract: option_contract(),
            position: Decimal::from(-2),
            market_price: 0.05,
            market_value: -10.0,
            average_cost: 85.0,
            unrealized_pnl: 160.0,
            realized_pnl: 0.0,
            account_name: "DU123456".to_string(),
        }),
        Event::AccountDownloadEnd(AccountDownloadEnd {
            account_name: "DU123456".to_string(),
        }),
    ]
}

fn base_price(symbol: &str) -> f64 {
    match symbol {
        "IBM" => 174.0,
        "AAPL" => 508.0,
        "MSFT" => 34.0,
        _ => 10.0,
    }
}

fn computation(req_id: i32, field: i32, opt_price: f64) -> Event {
    Event::TickOptionComputation(TickOptionComputation {
        ticker_id: req_id,
        field,
        implied_vol: 0.21,
        delta: 0.48,
        opt_price,
        pv_dividend: 0.95,
        gamma: 0.03,
        vega: 0.12,
        theta: -0.04,
        und_price: 174.0,
    })
}

fn snapshot(req_id: i32, contract: &ContractDescriptor) -> Vec<Event> {
    if contract.local_symbol == "NOSUCH" {
        return vec![Event::ApiError(ApiError {
            id: req_id,
            code: 200,
            message: "No security definition has been found for the request".to_string(),
        })];
    }

    let tick = |field, price| {
        Event::TickPrice(TickPrice {
            ticker_id: req_id,
            field,
            price,
        })
    };

    let mut events = vec![Event::ApiError(ApiError {
        id: req_id,
        code: 2104,
        message: "Market data farm connection is OK:usfarm".to_string(),
    })];
    if contract.local_symbol == "DELAYED" {
        events.push(Event::ApiError(ApiError {
            id: req_id,
            code: 10167,
            message: "Requested market data is not subscribed. Displaying delayed market data.".to_string(),
        }));
    }

    if contract.sec_type == SecurityType::Option {
        events.extend([
            computation(req_id, 10, 1.10),
            computation(req_id, 11, 1.20),
            computation(req_id, 13, 1.16),
            tick(1, 1.10),
            tick(2, 1.20),
        ]);
    } else {
        let base = base_price(&contract.local_symbol);
        events.extend([
            tick(1, base - 0.01),
            tick(2, base + 0.01),
            tick(4, base - 1.0),
            tick(45, 1_382_112_000.0),
            tick(4, base),
            tick(9, base - 2.0),
        ]);
    }

    events.push(Event::TickSnapshotEnd(TickSnapshotEnd { ticker_id: req_id }));
    events
}

fn platform() -> Arc<LoopbackTransport> {
    let daily = fixture("historical_bars.json");
    let intraday = fixture("intraday_bars.json");

    Arc::new(LoopbackTransport::with_responder(move |request| match request {
        OutboundRequest::CurrentTime => vec![Event::CurrentTime(CurrentTime { time: SERVER_TIME })],
        OutboundRequest::AccountUpdates { subscribe: true, .. } => portfolio(),
        OutboundRequest::AccountUpdates { subscribe: false, .. } => Vec::new(),
        OutboundRequest::MarketData {
            request_id, contract, ..
        } => snapshot(*request_id, contract),
        OutboundRequest::HistoricalData(req) => {
            let bars = if req.bar_size == "1 day" { &daily } else { &intraday };
            bars.iter().cloned().map(|e| with_req_id(e, req.request_id)).collect()
        }
    }))
}

fn settings(timeout: Option<Duration>) -> ConnectionSettings {
    ConnectionSettings {
        host: "localhost".to_string(),
        port: 7496,
        client_id: 4242,
        request_timeout: timeout,
        historical_window: None,
    }
}

fn connection_to(transport: &Arc<LoopbackTransport>) -> Connection {
    Connection::new(transport.clone(), settings(Some(Duration::from_secs(5))))
}

fn at(date: &str, time: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y%m%d %H:%M:%S").unwrap()
}

// =============================================================================
// Operations
// =============================================================================

#[test]
fn current_time_converts_epoch_seconds() {
    let transport = platform();
    let connection = connection_to(&transport);

    let time = connection.get_current_time().unwrap();

    assert_eq!(time.timestamp(), SERVER_TIME);
    assert_eq!(transport.requests(), vec![OutboundRequest::CurrentTime]);
    assert_eq!(transport.registration_count(), 0);
}

#[test]
fn positions_are_translated_in_arrival_order() {
    let transport = platform();
    let connection = connection_to(&transport);

    let positions = connection.get_positions().unwrap();

    assert_eq!(positions.len(), 2);

    let stock = &positions[0];
    assert_eq!(stock.account_name(), "DU123456");
    assert_eq!(stock.quantity(), Decimal::from(100));
    assert_eq!(stock.average_cost(), 180.12);
    match stock.instrument() {
        Instrument::Stock(s) => {
            assert_eq!(s.identity().ticker(), "IBM");
            assert_eq!(s.identity().contract_id(), 8314);
            assert_eq!(s.identity().exchange(), "NYSE");
        }
        other => panic!("expected stock, got {other:?}"),
    }

    let option = positions[1].instrument().as_option().unwrap();
    assert_eq!(option.underlying(), "IBM");
    assert_eq!(option.contract_size(), Some(100));
    assert_eq!(option.option_type(), OptionType::Call);
    assert_eq!(option.strike_price(), Decimal::from(190));
    assert_eq!(option.expiration_date(), NaiveDate::from_ymd_opt(2013, 10, 19).unwrap());
    assert_eq!(option.identity().exchange(), "SMART");
    assert_eq!(positions[1].quantity(), Decimal::from(-2));

    assert_eq!(
        transport.requests(),
        vec![
            OutboundRequest::AccountUpdates {
                subscribe: true,
                account: String::new()
            },
            OutboundRequest::AccountUpdates {
                subscribe: false,
                account: String::new()
            },
        ]
    );
    assert_eq!(transport.registration_count(), 0);
}

#[test]
fn stock_snapshot_aggregates_price_ticks() {
    let transport = platform();
    let connection = connection_to(&transport);
    let ibm = connection.create_stock("IBM", None, None);

    let quote = connection.get_market_data(&ibm).unwrap();

    assert_eq!(quote.get("bid"), Some(173.99));
    assert_eq!(quote.get("ask"), Some(174.01));
    assert_eq!(quote.get("last"), Some(174.0));
    assert_eq!(quote.get("close"), Some(172.0));
    assert!(!quote.has("high"));
    assert!(quote.field("high").is_err());
    assert_eq!(quote.available_fields(), ["ask", "bid", "close", "last"]);
    assert_eq!(quote.contract(), &ibm);

    assert_eq!(
        transport.requests(),
        vec![OutboundRequest::MarketData {
            request_id: 1,
            contract: ibm,
            generic_ticks: String::new(),
            snapshot: true,
        }]
    );
    assert_eq!(transport.registration_count(), 0);
}

#[test]
fn option_snapshot_embeds_option_quote() {
    let transport = platform();
    let connection = connection_to(&transport);

    let quote = connection.get_market_data(&option_contract()).unwrap();

    assert!(quote.has("option"));
    assert!(quote.available_fields().contains(&"option"));
    let option = quote.option().unwrap();
    assert_eq!(option.available_fields(), ["ask", "bid", "model"]);
    assert_eq!(option.model().unwrap().get("delta"), Some(0.48));

    let mid = option.mid().unwrap();
    assert!((mid.get("price").unwrap() - 1.15).abs() < 1e-9);
    assert_eq!(mid.get("underlying_price"), Some(174.0));
}

#[test]
fn daily_history_stops_at_finished_marker() {
    let transport = platform();
    let connection = connection_to(&transport);
    let ibm = connection.create_stock("IBM", None, None);

    let bars = connection
        .get_historical_data(
            &ibm,
            at("20130101", "00:00:00"),
            at("20130105", "16:00:00"),
            BarSize::Day1,
            WhatToShow::Trades,
            false,
        )
        .unwrap();

    let dates: Vec<_> = bars.iter().map(|bar| bar.date).collect();
    let expected: Vec<_> = (1..=5)
        .map(|day| BarDate::Date(NaiveDate::from_ymd_opt(2013, 1, day).unwrap()))
        .collect();
    assert_eq!(dates, expected);
    assert_eq!(bars[3].close, 193.99);
    assert_eq!(bars[2].volume, 28_152);

    let requests = transport.requests();
    let [OutboundRequest::HistoricalData(request)] = requests.as_slice() else {
        panic!("expected one historical request");
    };
    assert_eq!(
        request,
        &HistoricalDataRequest {
            request_id: 1,
            contract: ibm,
            end_datetime: "20130105 16:00:00".to_string(),
            duration: "5 D".to_string(),
            bar_size: "1 day".to_string(),
            what_to_show: "TRADES".to_string(),
            use_rth: 1,
            format_date: 1,
        }
    );
    assert_eq!(transport.registration_count(), 0);
}

#[test]
fn intraday_history_with_extended_hours() {
    let transport = platform();
    let connection = connection_to(&transport);
    let ibm = connection.create_stock("IBM", None, None);

    let bars = connection
        .get_historical_data(
            &ibm,
            at("20131018", "09:30:00"),
            at("20131018", "09:40:00"),
            BarSize::Min5,
            WhatToShow::Midpoint,
            true,
        )
        .unwrap();

    assert_eq!(bars.len(), 2);
    assert_eq!(bars[1].date, BarDate::DateTime(at("20131018", "09:35:00")));
    assert!(bars[1].has_gaps);

    let requests = transport.requests();
    let [OutboundRequest::HistoricalData(request)] = requests.as_slice() else {
        panic!("expected one historical request");
    };
    assert_eq!(request.duration, "600 S");
    assert_eq!(request.bar_size, "5 mins");
    assert_eq!(request.what_to_show, "MIDPOINT");
    assert_eq!(request.use_rth, 0);
}

#[test]
fn inverted_range_sends_nothing() {
    let transport = platform();
    let connection = connection_to(&transport);
    let ibm = connection.create_stock("IBM", None, None);

    let err = connection
        .get_historical_data(
            &ibm,
            at("20130105", "00:00:00"),
            at("20130101", "00:00:00"),
            BarSize::Day1,
            WhatToShow::Trades,
            false,
        )
        .unwrap_err();

    assert!(matches!(err, Error::InvalidRequest(_)));
    assert!(transport.requests().is_empty());
    assert_eq!(transport.registration_count(), 0);
}

// =============================================================================
// Failure Paths and Teardown
// =============================================================================

#[test]
fn platform_error_fails_the_request() {
    let transport = platform();
    let connection = connection_to(&transport);
    let missing = connection.create_stock("NOSUCH", None, None);

    let err = connection.get_market_data(&missing).unwrap_err();

    assert!(matches!(err, Error::Api { request_id: 1, code: 200, .. }));
    assert_eq!(transport.registration_count(), 0);
}

#[test]
fn delayed_data_warning_still_delivers_snapshot() {
    let transport = platform();
    let connection = connection_to(&transport);
    let delayed = connection.create_stock("DELAYED", None, None);

    let quote = connection.get_market_data(&delayed).unwrap();

    assert_eq!(quote.get("last"), Some(base_price("DELAYED")));
    assert_eq!(transport.registration_count(), 0);
}

#[test]
fn connection_level_error_fails_waiting_call() {
    let transport = Arc::new(LoopbackTransport::with_responder(|request| match request {
        OutboundRequest::MarketData { .. } => vec![Event::ApiError(ApiError {
            id: -1,
            code: 504,
            message: "Not connected".to_string(),
        })],
        _ => Vec::new(),
    }));
    let connection = Connection::new(transport.clone(), settings(None));
    let ibm = connection.create_stock("IBM", None, None);

    let err = connection.get_market_data(&ibm).unwrap_err();

    assert!(matches!(err, Error::Api { request_id: -1, code: 504, .. }));
    assert_eq!(transport.registration_count(), 0);
}

#[test]
fn concurrent_positions_calls_do_not_overlap() {
    let transport = Arc::new(LoopbackTransport::with_responder(|request| match request {
        OutboundRequest::AccountUpdates { subscribe: true, .. } => {
            thread::sleep(Duration::from_millis(20));
            portfolio()
        }
        _ => Vec::new(),
    }));
    let connection = connection_to(&transport);

    thread::scope(|s| {
        let first = s.spawn(|| connection.get_positions().unwrap());
        let second = s.spawn(|| connection.get_positions().unwrap());
        assert_eq!(first.join().unwrap().len(), 2);
        assert_eq!(second.join().unwrap().len(), 2);
    });

    let toggles: Vec<_> = transport
        .requests()
        .into_iter()
        .map(|request| match request {
            OutboundRequest::AccountUpdates { subscribe, .. } => subscribe,
            other => panic!("unexpected request {other:?}"),
        })
        .collect();
    assert_eq!(toggles, [true, false, true, false]);
    assert_eq!(transport.registration_count(), 0);
}

#[test]
fn silence_times_out_and_tears_down() {
    let transport = Arc::new(LoopbackTransport::new());
    let connection = Connection::new(transport.clone(), settings(Some(Duration::from_millis(50))));

    let err = connection.get_positions().unwrap_err();

    match err {
        Error::Timeout { operation, elapsed } => {
            assert_eq!(operation, "positions");
            assert!(elapsed >= Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(
        transport.requests().last(),
        Some(&OutboundRequest::AccountUpdates {
            subscribe: false,
            account: String::new()
        })
    );
    assert_eq!(transport.registration_count(), 0);
}

#[test]
fn disconnect_wakes_blocked_call() {
    let transport = Arc::new(LoopbackTransport::new());
    let connection = Connection::new(transport.clone(), settings(None));

    let err = thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            transport.disconnect();
        });
        connection.get_current_time().unwrap_err()
    });

    assert!(matches!(err, Error::Disconnected { operation: "current_time" }));
    assert_eq!(transport.registration_count(), 0);
}

#[test]
fn shutdown_cancels_blocked_call() {
    let transport = Arc::new(LoopbackTransport::new());
    let connection = Connection::new(transport.clone(), settings(None));

    let err = thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            connection.shutdown();
        });
        connection.get_current_time().unwrap_err()
    });

    assert!(matches!(err, Error::Cancelled { operation: "current_time" }));
    assert_eq!(transport.registration_count(), 0);
}

#[test]
fn concurrent_snapshots_are_isolated_by_request_id() {
    let transport = platform();
    let connection = connection_to(&transport);
    let symbols = ["IBM", "AAPL", "MSFT", "IBM"];

    for _ in 0..10 {
        thread::scope(|s| {
            let handles: Vec<_> = symbols
                .iter()
                .map(|symbol| {
                    let connection = &connection;
                    s.spawn(move || {
                        let contract = connection.create_stock(symbol, None, None);
                        (symbol, connection.get_market_data(&contract).unwrap())
                    })
                })
                .collect();

            for handle in handles {
                let (symbol, quote) = handle.join().unwrap();
                assert_eq!(quote.get("last"), Some(base_price(symbol)));
                assert_eq!(quote.contract().local_symbol, *symbol);
            }
        });
    }

    assert_eq!(transport.registration_count(), 0);
    assert_eq!(connection.subscription_stats().registrations, 0);
}

// =============================================================================
// Connect
// =============================================================================

#[test]
fn connect_resolves_explicit_arguments() {
    let connector = LoopbackConnector::new(platform());

    let connection = connect(&connector, Some("gateway.local"), Some(4002)).unwrap();

    let used = connector.last_settings().unwrap();
    assert_eq!(used.host, "gateway.local");
    assert_eq!(used.port, 4002);
    assert_eq!(connection.settings().host, "gateway.local");
    assert_eq!(connection.get_current_time().unwrap().timestamp(), SERVER_TIME);
}

#[test]
fn connect_surfaces_connector_failure() {
    let connector = LoopbackConnector::new(Arc::new(LoopbackTransport::new()));
    connector.transport().disconnect();

    let err = connect(&connector, Some("localhost"), Some(7496)).unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
}
