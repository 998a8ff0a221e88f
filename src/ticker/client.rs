//! The ticker client: public façade and connection lifecycle.
//!
//! [`Ticker`] owns the callback set and drives the connection state machine
//! from [`serve`](Ticker::serve). A cheap [`TickerHandle`] clone mutates
//! subscriptions and requests shutdown from any thread, including from
//! inside callbacks.
//!
//! # Example
//!
//! ```no_run
//! use kiteticker_rs::ticker::Ticker;
//! use kiteticker_rs::types::tick::Mode;
//!
//! # #[tokio::main]
//! # async fn main() -> kiteticker_rs::error::Result<()> {
//! let mut ticker = Ticker::new("AB1234", "your-enctoken");
//! let handle = ticker.handle();
//!
//! ticker.on_connect(move || {
//!     let _ = handle.subscribe(&[256265, 5633]);
//!     let _ = handle.set_mode(Mode::Full, &[5633]);
//! });
//! ticker.on_tick(|tick| println!("{tick:?}"));
//! ticker.on_error(|err| eprintln!("ticker error: {err}"));
//!
//! // Blocks until stopped or the reconnect budget is exhausted.
//! ticker.serve().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tokio_tungstenite::tungstenite::Message;

use crate::constants::{defaults, DEFAULT_API_KEY, WS_TICKER_URL};
use crate::error::{Result, TickerError};
use crate::ticker::callbacks::Callbacks;
use crate::ticker::codec::{self, TextMessage};
use crate::ticker::subscription::{CommandQueue, SubscriptionRegistry};
use crate::ticker::transport::{self, WsStream};
use crate::types::order::Order;
use crate::types::tick::{Mode, Tick};

type WriteHalf = SplitSink<WsStream, Message>;

/// Close code surfaced when the connection dies without a close handshake.
const ABNORMAL_CLOSE: u16 = 1006;
/// Close code surfaced when the server's close frame carried no code.
const NO_STATUS_CLOSE: u16 = 1005;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Connection and reconnection tuning, filled with the crate defaults.
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub root_url: String,
    pub api_key: String,
    pub user_id: String,
    pub enctoken: String,
    /// Overrides the `uid` query parameter; defaults to unix milliseconds.
    pub uid: Option<u64>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub auto_reconnect: bool,
    pub reconnect_base_delay: Duration,
    pub max_reconnect_delay: Duration,
    pub max_reconnect_attempts: u32,
}

impl Settings {
    pub(crate) fn new(user_id: impl Into<String>, enctoken: impl Into<String>) -> Self {
        Self {
            root_url: WS_TICKER_URL.to_owned(),
            api_key: DEFAULT_API_KEY.to_owned(),
            user_id: user_id.into(),
            enctoken: enctoken.into(),
            uid: None,
            connect_timeout: Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(defaults::READ_TIMEOUT_SECS),
            write_timeout: Duration::from_secs(defaults::WRITE_TIMEOUT_SECS),
            auto_reconnect: true,
            reconnect_base_delay: Duration::from_secs(defaults::RECONNECT_BASE_DELAY_SECS),
            max_reconnect_delay: Duration::from_secs(defaults::MAX_RECONNECT_DELAY_SECS),
            max_reconnect_attempts: defaults::MAX_RECONNECT_ATTEMPTS,
        }
    }
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Observable lifecycle state of the logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerState {
    /// Not serving, or serving has terminated.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Streaming; subscriptions are live.
    Connected,
    /// A stop was requested; the close handshake is in progress.
    Disconnecting,
    /// Between reconnect attempts.
    WaitingBackoff,
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// State shared between the façade, its handles, and the connection task.
#[derive(Debug)]
struct Shared {
    registry: Mutex<SubscriptionRegistry>,
    commands: CommandQueue,
    state: watch::Sender<TickerState>,
    stop: watch::Sender<bool>,
}

impl Shared {
    fn new() -> Self {
        Self {
            registry: Mutex::new(SubscriptionRegistry::default()),
            commands: CommandQueue::new(defaults::COMMAND_QUEUE_CAPACITY),
            state: watch::channel(TickerState::Disconnected).0,
            stop: watch::channel(false).0,
        }
    }

    fn set_state(&self, state: TickerState) {
        self.state.send_replace(state);
        tracing::debug!(?state, "ticker state");
    }

    fn state(&self) -> TickerState {
        *self.state.borrow()
    }

    fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    fn reset_stop(&self) {
        self.stop.send_replace(false);
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolves once a stop has been requested.
    async fn stopped(&self) {
        let mut rx = self.stop.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn subscribe(&self, tokens: &[u32]) -> Result<()> {
        if tokens.is_empty() {
            return Err(TickerError::InvalidArgument("empty token list".into()));
        }
        let commands = self
            .registry
            .lock()
            .expect("subscription registry poisoned")
            .subscribe(tokens);
        for command in commands {
            self.commands.push(command);
        }
        Ok(())
    }

    fn unsubscribe(&self, tokens: &[u32]) -> Result<()> {
        if tokens.is_empty() {
            return Err(TickerError::InvalidArgument("empty token list".into()));
        }
        let commands = self
            .registry
            .lock()
            .expect("subscription registry poisoned")
            .unsubscribe(tokens);
        for command in commands {
            self.commands.push(command);
        }
        Ok(())
    }

    fn set_mode(&self, mode: Mode, tokens: &[u32]) -> Result<()> {
        if tokens.is_empty() {
            return Err(TickerError::InvalidArgument("empty token list".into()));
        }
        let commands = self
            .registry
            .lock()
            .expect("subscription registry poisoned")
            .set_mode(mode, tokens);
        for command in commands {
            self.commands.push(command);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A cheap, cloneable handle onto a [`Ticker`].
///
/// Subscription methods never block and never touch the socket directly:
/// they update the registry and enqueue commands for the connection task,
/// so they are safe to call from any thread and from inside any callback.
/// While disconnected, commands are buffered and applied on the next
/// connection.
#[derive(Debug, Clone)]
pub struct TickerHandle {
    shared: Arc<Shared>,
}

impl TickerHandle {
    /// Subscribe to `tokens` in the default [`Mode::Quote`].
    pub fn subscribe(&self, tokens: &[u32]) -> Result<()> {
        self.shared.subscribe(tokens)
    }

    /// Unsubscribe from `tokens`.
    pub fn unsubscribe(&self, tokens: &[u32]) -> Result<()> {
        self.shared.unsubscribe(tokens)
    }

    /// Change the streaming mode for `tokens`, subscribing them if needed.
    pub fn set_mode(&self, mode: Mode, tokens: &[u32]) -> Result<()> {
        self.shared.set_mode(mode, tokens)
    }

    /// Request shutdown. Idempotent; pre-empts any backoff sleep.
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TickerState {
        self.shared.state()
    }
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Client for the real-time tick feed.
///
/// Construct with [`Ticker::new`], install callbacks, then call
/// [`serve`](Self::serve). The client keeps the WebSocket alive with
/// heartbeat monitoring and exponential-backoff reconnection, replaying
/// the subscription set on every new connection.
///
/// Callbacks run synchronously on the connection task in wire arrival
/// order; a slow callback delays heartbeat accounting and can trip the
/// read timeout.
pub struct Ticker {
    settings: Settings,
    shared: Arc<Shared>,
    callbacks: Callbacks,
}

impl Ticker {
    /// Create a client authenticating with `user_id` and `enctoken`.
    pub fn new(user_id: impl Into<String>, enctoken: impl Into<String>) -> Self {
        Self {
            settings: Settings::new(user_id, enctoken),
            shared: Arc::new(Shared::new()),
            callbacks: Callbacks::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Override the `api_key` query parameter.
    pub fn set_api_key(&mut self, api_key: impl Into<String>) {
        self.settings.api_key = api_key.into();
    }

    /// Override the `uid` query parameter (defaults to unix milliseconds).
    pub fn set_uid(&mut self, uid: u64) {
        self.settings.uid = Some(uid);
    }

    /// Point the client at a different feed endpoint. Useful for testing
    /// against a local server.
    pub fn set_root_url(&mut self, url: impl Into<String>) {
        self.settings.root_url = url.into();
    }

    /// Deadline for the WebSocket handshake. Default 10 s.
    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.settings.connect_timeout = timeout;
    }

    /// Wire silence tolerated before the connection is declared dead.
    /// Default 5 s; the server heartbeats roughly every 5 s.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.settings.read_timeout = timeout;
    }

    /// Deadline for writing one outbound frame. Default 5 s.
    pub fn set_write_timeout(&mut self, timeout: Duration) {
        self.settings.write_timeout = timeout;
    }

    /// Enable or disable automatic reconnection. Default enabled.
    pub fn set_auto_reconnect(&mut self, enable: bool) {
        self.settings.auto_reconnect = enable;
    }

    /// First reconnect delay; doubles per consecutive failure. Default 2 s.
    pub fn set_reconnect_base_delay(&mut self, delay: Duration) {
        self.settings.reconnect_base_delay = delay;
    }

    /// Upper bound on the reconnect delay. Default 60 s.
    pub fn set_max_reconnect_delay(&mut self, delay: Duration) {
        self.settings.max_reconnect_delay = delay;
    }

    /// Consecutive failures tolerated before giving up. Default 50.
    pub fn set_max_reconnect_attempts(&mut self, attempts: u32) {
        self.settings.max_reconnect_attempts = attempts;
    }

    // -----------------------------------------------------------------------
    // Callbacks
    // -----------------------------------------------------------------------

    /// Called when a connection is established, on first connect and on
    /// every reconnect. Subscriptions issued here apply to the new session.
    pub fn on_connect(&mut self, f: impl FnMut() + Send + 'static) {
        self.callbacks.connect = Some(Box::new(f));
    }

    /// Called when the connection closes, with the WebSocket close code and
    /// reason. Code 1006 stands in for closes without a handshake.
    pub fn on_close(&mut self, f: impl FnMut(u16, &str) + Send + 'static) {
        self.callbacks.close = Some(Box::new(f));
    }

    /// Called on transport and decode errors. Decode errors skip the
    /// offending packet; the connection stays up.
    pub fn on_error(&mut self, f: impl FnMut(&TickerError) + Send + 'static) {
        self.callbacks.error = Some(Box::new(f));
    }

    /// Called before each reconnect attempt with the attempt number and the
    /// delay about to be slept.
    pub fn on_reconnect(&mut self, f: impl FnMut(u32, Duration) + Send + 'static) {
        self.callbacks.reconnect = Some(Box::new(f));
    }

    /// Called when the reconnect budget is exhausted, just before
    /// [`serve`](Self::serve) returns.
    pub fn on_no_reconnect(&mut self, f: impl FnMut(u32) + Send + 'static) {
        self.callbacks.no_reconnect = Some(Box::new(f));
    }

    /// Called for every decoded tick, in wire arrival order.
    pub fn on_tick(&mut self, f: impl FnMut(Tick) + Send + 'static) {
        self.callbacks.tick = Some(Box::new(f));
    }

    /// Called for every order-update message.
    pub fn on_order_update(&mut self, f: impl FnMut(Order) + Send + 'static) {
        self.callbacks.order_update = Some(Box::new(f));
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// A cloneable handle for use from other threads and callbacks.
    pub fn handle(&self) -> TickerHandle {
        TickerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// See [`TickerHandle::subscribe`].
    pub fn subscribe(&self, tokens: &[u32]) -> Result<()> {
        self.shared.subscribe(tokens)
    }

    /// See [`TickerHandle::unsubscribe`].
    pub fn unsubscribe(&self, tokens: &[u32]) -> Result<()> {
        self.shared.unsubscribe(tokens)
    }

    /// See [`TickerHandle::set_mode`].
    pub fn set_mode(&self, mode: Mode, tokens: &[u32]) -> Result<()> {
        self.shared.set_mode(mode, tokens)
    }

    /// Request shutdown of a running [`serve`](Self::serve).
    pub fn stop(&self) {
        self.shared.request_stop();
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TickerState {
        self.shared.state()
    }

    // -----------------------------------------------------------------------
    // Serving
    // -----------------------------------------------------------------------

    /// Connect and stream until stopped or the reconnect budget exhausts.
    ///
    /// Returns `Ok(())` on a requested stop or when reconnection gives up;
    /// the only error return is an initial connect failure with
    /// reconnection disabled.
    pub async fn serve(&mut self) -> Result<()> {
        self.shared.reset_stop();
        let mut driver = Driver {
            shared: Arc::clone(&self.shared),
            settings: self.settings.clone(),
            callbacks: &mut self.callbacks,
        };
        driver.run().await
    }

    /// Like [`serve`](Self::serve), but also stops when `shutdown`
    /// resolves, then completes the close handshake before returning.
    pub async fn serve_with_shutdown<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let handle = self.handle();
        let serve = self.serve();
        tokio::pin!(serve);
        tokio::select! {
            res = &mut serve => return res,
            _ = shutdown => handle.stop(),
        }
        serve.await
    }
}

// ---------------------------------------------------------------------------
// Connection driver
// ---------------------------------------------------------------------------

/// Why a live connection ended.
enum Exit {
    /// The caller asked us to stop.
    Stopped,
    /// The connection dropped: server close, transport error, or silence
    /// past the read timeout.
    Dropped { code: u16, reason: String },
}

/// Drives the state machine for one `serve` call.
struct Driver<'a> {
    shared: Arc<Shared>,
    settings: Settings,
    callbacks: &'a mut Callbacks,
}

impl Driver<'_> {
    async fn run(&mut self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let mut attempt: u32 = 0;
        let mut ever_connected = false;

        loop {
            if shared.stop_requested() {
                shared.set_state(TickerState::Disconnected);
                return Ok(());
            }

            shared.set_state(TickerState::Connecting);
            let connected =
                time::timeout(self.settings.connect_timeout, transport::connect(&self.settings))
                    .await
                    .unwrap_or(Err(TickerError::Timeout("connect")));

            match connected {
                Ok(ws) => {
                    attempt = 0;
                    shared.set_state(TickerState::Connected);
                    tracing::info!(
                        reconnect = ever_connected,
                        "connected to ticker websocket"
                    );

                    let exit = self.stream(ws, ever_connected).await;
                    ever_connected = true;
                    match exit {
                        Exit::Stopped => {
                            shared.set_state(TickerState::Disconnected);
                            return Ok(());
                        }
                        Exit::Dropped { code, reason } => {
                            tracing::warn!(code, %reason, "ticker connection dropped");
                            self.callbacks.dispatch_close(code, &reason);
                        }
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "ticker connect failed");
                    self.callbacks.dispatch_error(&err);
                    if !ever_connected && !self.settings.auto_reconnect {
                        shared.set_state(TickerState::Disconnected);
                        return Err(err);
                    }
                }
            }

            if !self.settings.auto_reconnect {
                self.callbacks.dispatch_no_reconnect(0);
                shared.set_state(TickerState::Disconnected);
                return Ok(());
            }

            attempt += 1;
            if attempt > self.settings.max_reconnect_attempts {
                tracing::error!(
                    attempts = self.settings.max_reconnect_attempts,
                    "reconnect budget exhausted"
                );
                self.callbacks
                    .dispatch_no_reconnect(self.settings.max_reconnect_attempts);
                shared.set_state(TickerState::Disconnected);
                return Ok(());
            }

            let delay = backoff_delay(
                self.settings.reconnect_base_delay,
                self.settings.max_reconnect_delay,
                attempt,
            );
            shared.set_state(TickerState::WaitingBackoff);
            tracing::info!(attempt, ?delay, "scheduling reconnect");
            self.callbacks.dispatch_reconnect(attempt, delay);

            tokio::select! {
                _ = time::sleep(delay) => {}
                _ = shared.stopped() => {
                    shared.set_state(TickerState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    /// Stream one connection until it ends. On a reconnect, replays the
    /// subscription registry before anything else is read or dispatched.
    async fn stream(&mut self, ws: WsStream, replay: bool) -> Exit {
        let shared = Arc::clone(&self.shared);
        let read_timeout = self.settings.read_timeout;
        let write_timeout = self.settings.write_timeout;
        let (mut write, mut read) = ws.split();

        if replay {
            let commands = shared
                .registry
                .lock()
                .expect("subscription registry poisoned")
                .replay_commands();
            for command in commands {
                let text = match command.encode() {
                    Ok(text) => text,
                    Err(err) => {
                        self.callbacks.dispatch_error(&err);
                        continue;
                    }
                };
                if let Err(err) = send_text(&mut write, text, write_timeout).await {
                    self.callbacks.dispatch_error(&err);
                    return Exit::Dropped {
                        code: ABNORMAL_CLOSE,
                        reason: err.to_string(),
                    };
                }
            }
            tracing::info!("replayed subscriptions after reconnect");
        }

        self.callbacks.dispatch_connect();

        let mut last_frame = Instant::now();
        loop {
            tokio::select! {
                _ = shared.stopped() => {
                    shared.set_state(TickerState::Disconnecting);
                    tracing::info!("closing ticker connection");
                    let close = async {
                        let _ = write.send(Message::Close(None)).await;
                        // Wait for the server to echo the close frame.
                        while let Some(Ok(msg)) = read.next().await {
                            if matches!(msg, Message::Close(_)) {
                                break;
                            }
                        }
                    };
                    let _ = time::timeout(
                        Duration::from_secs(defaults::CLOSE_HANDSHAKE_TIMEOUT_SECS),
                        close,
                    )
                    .await;
                    return Exit::Stopped;
                }

                command = shared.commands.next() => {
                    let text = match command.encode() {
                        Ok(text) => text,
                        Err(err) => {
                            self.callbacks.dispatch_error(&err);
                            continue;
                        }
                    };
                    if let Err(err) = send_text(&mut write, text, write_timeout).await {
                        self.callbacks.dispatch_error(&err);
                        return Exit::Dropped {
                            code: ABNORMAL_CLOSE,
                            reason: err.to_string(),
                        };
                    }
                }

                msg = read.next() => match msg {
                    Some(Ok(msg)) => {
                        last_frame = Instant::now();
                        match msg {
                            Message::Binary(data) => self.dispatch_binary(&data),
                            Message::Text(text) => self.dispatch_text(text.as_str()),
                            // Heartbeat pings are answered by tungstenite;
                            // both directions only refresh liveness here.
                            Message::Ping(_) | Message::Pong(_) => {}
                            Message::Close(frame) => {
                                let (code, reason) = frame
                                    .map(|f| (u16::from(f.code), f.reason.to_string()))
                                    .unwrap_or((NO_STATUS_CLOSE, String::new()));
                                return Exit::Dropped { code, reason };
                            }
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        let err = TickerError::from(e);
                        self.callbacks.dispatch_error(&err);
                        return Exit::Dropped {
                            code: ABNORMAL_CLOSE,
                            reason: err.to_string(),
                        };
                    }
                    None => {
                        return Exit::Dropped {
                            code: ABNORMAL_CLOSE,
                            reason: "connection reset".into(),
                        };
                    }
                },

                _ = time::sleep_until(last_frame + read_timeout) => {
                    tracing::warn!(?read_timeout, "no frames within read timeout");
                    return Exit::Dropped {
                        code: ABNORMAL_CLOSE,
                        reason: "read timed out".into(),
                    };
                }
            }
        }
    }

    /// Decode a binary frame and dispatch its ticks. Malformed packets are
    /// skipped; the rest of the frame is still delivered.
    fn dispatch_binary(&mut self, data: &[u8]) {
        match codec::split_packets(data) {
            Ok(packets) => {
                for packet in packets {
                    match codec::parse_packet(packet) {
                        Ok(tick) => self.callbacks.dispatch_tick(tick),
                        Err(err) => {
                            tracing::warn!(error = %err, "skipping undecodable packet");
                            self.callbacks.dispatch_error(&err);
                        }
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed frame");
                self.callbacks.dispatch_error(&err);
            }
        }
    }

    /// Route an inbound text frame. Only order updates are surfaced.
    fn dispatch_text(&mut self, text: &str) {
        match codec::parse_text_message(text) {
            Ok(TextMessage::OrderUpdate(order)) => {
                self.callbacks.dispatch_order_update(*order);
            }
            Ok(TextMessage::Other) => {
                tracing::debug!("ignoring text message: {text}");
            }
            Err(err) => {
                tracing::warn!(error = %err, "bad order update payload");
                self.callbacks.dispatch_error(&err);
            }
        }
    }
}

/// Write one text frame under the write timeout.
async fn send_text(write: &mut WriteHalf, text: String, timeout: Duration) -> Result<()> {
    match time::timeout(timeout, write.send(Message::Text(text.into()))).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(TickerError::from(e)),
        Err(_) => Err(TickerError::Timeout("write")),
    }
}

/// Exponential backoff: base doubling per attempt, capped at `max`.
fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let doublings = attempt.saturating_sub(1).min(31);
    base.saturating_mul(1u32 << doublings).min(max)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
