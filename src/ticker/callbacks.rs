//! The caller-provided callback set and its dispatch helpers.

use std::time::Duration;

use crate::error::TickerError;
use crate::types::order::Order;
use crate::types::tick::Tick;

pub(crate) type ConnectHandler = Box<dyn FnMut() + Send>;
pub(crate) type CloseHandler = Box<dyn FnMut(u16, &str) + Send>;
pub(crate) type ErrorHandler = Box<dyn FnMut(&TickerError) + Send>;
pub(crate) type ReconnectHandler = Box<dyn FnMut(u32, Duration) + Send>;
pub(crate) type NoReconnectHandler = Box<dyn FnMut(u32) + Send>;
pub(crate) type TickHandler = Box<dyn FnMut(Tick) + Send>;
pub(crate) type OrderUpdateHandler = Box<dyn FnMut(Order) + Send>;

/// Callback slots, installed once through the [`Ticker`] setters before
/// serving and invoked synchronously from the connection task.
///
/// [`Ticker`]: crate::ticker::Ticker
#[derive(Default)]
pub(crate) struct Callbacks {
    pub connect: Option<ConnectHandler>,
    pub close: Option<CloseHandler>,
    pub error: Option<ErrorHandler>,
    pub reconnect: Option<ReconnectHandler>,
    pub no_reconnect: Option<NoReconnectHandler>,
    pub tick: Option<TickHandler>,
    pub order_update: Option<OrderUpdateHandler>,
}

impl Callbacks {
    pub(crate) fn dispatch_connect(&mut self) {
        if let Some(f) = &mut self.connect {
            f();
        }
    }

    pub(crate) fn dispatch_close(&mut self, code: u16, reason: &str) {
        if let Some(f) = &mut self.close {
            f(code, reason);
        }
    }

    pub(crate) fn dispatch_error(&mut self, err: &TickerError) {
        if let Some(f) = &mut self.error {
            f(err);
        }
    }

    pub(crate) fn dispatch_reconnect(&mut self, attempt: u32, delay: Duration) {
        if let Some(f) = &mut self.reconnect {
            f(attempt, delay);
        }
    }

    pub(crate) fn dispatch_no_reconnect(&mut self, attempt: u32) {
        if let Some(f) = &mut self.no_reconnect {
            f(attempt);
        }
    }

    pub(crate) fn dispatch_tick(&mut self, tick: Tick) {
        if let Some(f) = &mut self.tick {
            f(tick);
        }
    }

    pub(crate) fn dispatch_order_update(&mut self, order: Order) {
        if let Some(f) = &mut self.order_update {
            f(order);
        }
    }
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("connect", &self.connect.is_some())
            .field("close", &self.close.is_some())
            .field("error", &self.error.is_some())
            .field("reconnect", &self.reconnect.is_some())
            .field("no_reconnect", &self.no_reconnect.is_some())
            .field("tick", &self.tick.is_some())
            .field("order_update", &self.order_update.is_some())
            .finish()
    }
}
