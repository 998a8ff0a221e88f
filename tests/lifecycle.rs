//! End-to-end tests of the connection lifecycle against a local WebSocket
//! server.
//!
//! Each test binds an ephemeral `ws://127.0.0.1` listener, scripts the
//! server side of the conversation, and drives the real client through it:
//! tick delivery, command ordering on the wire, reconnect-with-replay,
//! read-timeout detection, stop semantics, and order-update routing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use kiteticker_rs::{Mode, Order, Tick, Ticker, TickerState};

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// Build a packet from a token and raw big-endian u32 fields.
fn packet_of(token: u32, fields: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + fields.len() * 4);
    buf.extend_from_slice(&token.to_be_bytes());
    for &field in fields {
        buf.extend_from_slice(&field.to_be_bytes());
    }
    buf
}

/// Wrap packets into one wire frame.
fn frame_of(packets: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&(packets.len() as u16).to_be_bytes());
    for p in packets {
        buf.extend_from_slice(&(p.len() as u16).to_be_bytes());
        buf.extend_from_slice(p);
    }
    buf
}

fn quote_fields() -> Vec<u32> {
    vec![123456, 10, 123400, 5000, 700, 800, 123000, 123900, 122800, 123300]
}

// ---------------------------------------------------------------------------
// Test scaffolding
// ---------------------------------------------------------------------------

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

fn test_ticker(url: &str) -> Ticker {
    let mut ticker = Ticker::new("AB1234", "test-enctoken");
    ticker.set_root_url(url);
    ticker.set_reconnect_base_delay(Duration::from_millis(50));
    ticker.set_max_reconnect_delay(Duration::from_millis(400));
    ticker
}

/// Captures callback invocations for later assertions.
#[derive(Clone, Default)]
struct Recorder {
    ticks: Arc<Mutex<Vec<Tick>>>,
    closes: Arc<Mutex<Vec<(u16, String)>>>,
    reconnects: Arc<Mutex<Vec<(u32, Duration)>>>,
    no_reconnects: Arc<Mutex<Vec<u32>>>,
    orders: Arc<Mutex<Vec<Order>>>,
    errors: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn install(&self, ticker: &mut Ticker) {
        let ticks = Arc::clone(&self.ticks);
        ticker.on_tick(move |tick| ticks.lock().unwrap().push(tick));

        let closes = Arc::clone(&self.closes);
        ticker.on_close(move |code, reason| {
            closes.lock().unwrap().push((code, reason.to_owned()));
        });

        let reconnects = Arc::clone(&self.reconnects);
        ticker.on_reconnect(move |attempt, delay| {
            reconnects.lock().unwrap().push((attempt, delay));
        });

        let no_reconnects = Arc::clone(&self.no_reconnects);
        ticker.on_no_reconnect(move |attempt| no_reconnects.lock().unwrap().push(attempt));

        let orders = Arc::clone(&self.orders);
        ticker.on_order_update(move |order| orders.lock().unwrap().push(order));

        let errors = Arc::clone(&self.errors);
        ticker.on_error(move |err| errors.lock().unwrap().push(err.to_string()));
    }
}

/// Poll until `cond` holds, panicking after five seconds.
async fn wait_for(cond: impl Fn() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met within five seconds");
}

// ---------------------------------------------------------------------------
// Tick delivery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ltp_tick_reaches_on_tick() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let frame = frame_of(&[&packet_of(256265, &[123456])]);
        ws.send(Message::Binary(frame.into())).await.unwrap();
        // Drain until the close handshake completes.
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut ticker = test_ticker(&url);
    let recorder = Recorder::default();
    recorder.install(&mut ticker);

    let handle = ticker.handle();
    let ticks = Arc::clone(&recorder.ticks);
    ticker.on_tick(move |tick| {
        ticks.lock().unwrap().push(tick);
        handle.stop();
    });

    ticker.serve().await.unwrap();
    server.await.unwrap();

    let ticks = recorder.ticks.lock().unwrap();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].mode, Mode::Ltp);
    assert_eq!(ticks[0].instrument_token, 256265);
    assert_eq!(ticks[0].last_price, 1234.56);
    assert!(ticks[0].is_index);
    assert_eq!(ticker.state(), TickerState::Disconnected);
}

#[tokio::test]
async fn multi_packet_frame_dispatches_in_order() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let ltp = packet_of(408065, &[100]);
        let quote = packet_of(408065, &quote_fields());
        ws.send(Message::Binary(frame_of(&[&ltp, &quote]).into()))
            .await
            .unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut ticker = test_ticker(&url);
    let recorder = Recorder::default();
    recorder.install(&mut ticker);

    let handle = ticker.handle();
    let ticks = Arc::clone(&recorder.ticks);
    ticker.on_tick(move |tick| {
        let mut ticks = ticks.lock().unwrap();
        ticks.push(tick);
        if ticks.len() == 2 {
            handle.stop();
        }
    });

    ticker.serve().await.unwrap();
    server.await.unwrap();

    let ticks = recorder.ticks.lock().unwrap();
    assert_eq!(ticks.len(), 2);
    assert_eq!(ticks[0].mode, Mode::Ltp);
    assert_eq!(ticks[1].mode, Mode::Quote);
    assert_eq!(ticks[1].volume_traded, 5000);
}

// ---------------------------------------------------------------------------
// Command ordering on the wire
// ---------------------------------------------------------------------------

#[tokio::test]
async fn subscribe_then_set_mode_arrive_in_order() {
    let (listener, url) = bind().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                tx.send(text.to_string()).unwrap();
            }
        }
    });

    let mut ticker = test_ticker(&url);
    let recorder = Recorder::default();
    recorder.install(&mut ticker);

    let subscriber = ticker.handle();
    ticker.on_connect(move || {
        subscriber.subscribe(&[5633]).unwrap();
        subscriber.set_mode(Mode::Full, &[5633]).unwrap();
    });

    let handle = ticker.handle();
    let serve = tokio::spawn(async move { ticker.serve().await });

    let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
    assert_eq!(first, r#"{"a":"subscribe","v":[5633]}"#);
    assert_eq!(second, r#"{"a":"mode","v":["full",[5633]]}"#);

    handle.stop();
    serve.await.unwrap().unwrap();
    server.await.unwrap();
}

// ---------------------------------------------------------------------------
// Reconnect and replay
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropped_connection_reconnects_and_replays() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        // First connection: consume the buffered commands, then drop the
        // socket without a close handshake.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut seen = 0;
        while let Some(Ok(msg)) = ws.next().await {
            if matches!(msg, Message::Text(_)) {
                seen += 1;
                if seen == 2 {
                    break;
                }
            }
        }
        drop(ws);

        // Second connection: the replay must arrive before anything else.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let mut replayed = Vec::new();
        while replayed.len() < 2 {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => replayed.push(text.to_string()),
                Some(Ok(_)) => {}
                other => panic!("second connection ended early: {other:?}"),
            }
        }
        let frame = frame_of(&[&packet_of(5633, &[123456])]);
        ws.send(Message::Binary(frame.into())).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
        replayed
    });

    let mut ticker = test_ticker(&url);
    let recorder = Recorder::default();
    recorder.install(&mut ticker);

    // Subscriptions issued before serving are buffered for the first
    // connection and drive the replay on the second.
    ticker.subscribe(&[5633]).unwrap();
    ticker.set_mode(Mode::Full, &[5633]).unwrap();

    let handle = ticker.handle();
    let ticks = Arc::clone(&recorder.ticks);
    ticker.on_tick(move |tick| {
        ticks.lock().unwrap().push(tick);
        handle.stop();
    });

    ticker.serve().await.unwrap();
    let replayed = server.await.unwrap();

    assert_eq!(
        replayed,
        vec![
            r#"{"a":"subscribe","v":[5633]}"#.to_owned(),
            r#"{"a":"mode","v":["full",[5633]]}"#.to_owned(),
        ]
    );

    let closes = recorder.closes.lock().unwrap();
    assert_eq!(closes.len(), 1);
    assert_eq!(closes[0].0, 1006);

    let reconnects = recorder.reconnects.lock().unwrap();
    assert_eq!(reconnects.len(), 1);
    assert_eq!(reconnects[0], (1, Duration::from_millis(50)));

    assert_eq!(recorder.ticks.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn read_silence_closes_and_schedules_reconnect() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            // Accept but never send anything.
            let mut ws = accept_async(stream).await.unwrap();
            tokio::spawn(async move { while let Some(Ok(_)) = ws.next().await {} });
        }
    });

    let mut ticker = test_ticker(&url);
    ticker.set_read_timeout(Duration::from_millis(200));
    let recorder = Recorder::default();
    recorder.install(&mut ticker);

    let handle = ticker.handle();
    let serve = tokio::spawn(async move { ticker.serve().await });

    let closes = Arc::clone(&recorder.closes);
    let reconnects = Arc::clone(&recorder.reconnects);
    wait_for(move || {
        !closes.lock().unwrap().is_empty() && !reconnects.lock().unwrap().is_empty()
    })
    .await;

    handle.stop();
    serve.await.unwrap().unwrap();
    server.abort();

    let closes = recorder.closes.lock().unwrap();
    assert_eq!(closes[0], (1006, "read timed out".to_owned()));
    let reconnects = recorder.reconnects.lock().unwrap();
    assert_eq!(reconnects[0], (1, Duration::from_millis(50)));
}

#[tokio::test]
async fn reconnect_budget_exhaustion_ends_serve() {
    let (listener, url) = bind().await;
    drop(listener); // Nothing will ever answer.

    let mut ticker = test_ticker(&url);
    ticker.set_reconnect_base_delay(Duration::from_millis(20));
    ticker.set_max_reconnect_attempts(2);
    let recorder = Recorder::default();
    recorder.install(&mut ticker);

    ticker.serve().await.unwrap();

    let reconnects = recorder.reconnects.lock().unwrap();
    let delays: Vec<Duration> = reconnects.iter().map(|&(_, d)| d).collect();
    assert_eq!(
        delays,
        vec![Duration::from_millis(20), Duration::from_millis(40)]
    );
    assert_eq!(*recorder.no_reconnects.lock().unwrap(), vec![2]);
    // One failed connect per attempt, plus the initial one.
    assert_eq!(recorder.errors.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn stop_during_backoff_returns_promptly() {
    let (listener, url) = bind().await;
    drop(listener);

    let mut ticker = test_ticker(&url);
    ticker.set_reconnect_base_delay(Duration::from_secs(30));
    let recorder = Recorder::default();
    recorder.install(&mut ticker);

    let handle = ticker.handle();
    let serve = tokio::spawn(async move { ticker.serve().await });

    let reconnects = Arc::clone(&recorder.reconnects);
    wait_for(move || !reconnects.lock().unwrap().is_empty()).await;

    let stopped_at = Instant::now();
    handle.stop();
    timeout(Duration::from_secs(1), serve)
        .await
        .expect("serve did not notice the stop")
        .unwrap()
        .unwrap();
    assert!(stopped_at.elapsed() < Duration::from_secs(1));
    assert_eq!(handle.state(), TickerState::Disconnected);
}

#[tokio::test]
async fn initial_connect_failure_without_reconnect_is_an_error() {
    let (listener, url) = bind().await;
    drop(listener);

    let mut ticker = test_ticker(&url);
    ticker.set_auto_reconnect(false);
    assert!(ticker.serve().await.is_err());
    assert_eq!(ticker.state(), TickerState::Disconnected);
}

// ---------------------------------------------------------------------------
// Order updates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn order_update_routes_to_callback() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let text = r#"{"type":"order","data":{"order_id":"X1","status":"COMPLETE","tradingsymbol":"INFY","filled_quantity":10}}"#;
        ws.send(Message::Text(text.into())).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut ticker = test_ticker(&url);
    let recorder = Recorder::default();
    recorder.install(&mut ticker);

    let handle = ticker.handle();
    let orders = Arc::clone(&recorder.orders);
    ticker.on_order_update(move |order| {
        orders.lock().unwrap().push(order);
        handle.stop();
    });

    ticker.serve().await.unwrap();
    server.await.unwrap();

    let orders = recorder.orders.lock().unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].order_id, "X1");
    assert_eq!(orders[0].status, "COMPLETE");
    assert_eq!(orders[0].tradingsymbol, "INFY");
    // The text frame must not masquerade as a tick.
    assert!(recorder.ticks.lock().unwrap().is_empty());
}
