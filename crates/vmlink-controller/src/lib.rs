//! Hardware link controller for the vending machine controller board.
//!
//! This crate contains the state machine that owns the board protocol and the
//! async service that runs it:
//!
//! - [`Controller`]: synchronous, deterministic FSM driver over a
//!   [`Transport`](vmlink_hardware::Transport).
//! - [`LinkService`] / [`LinkHandle`]: tokio task driving a controller, with
//!   request and event channels.
//! - [`ControllerConfig`]: timeouts, retry budget and blocking exchange
//!   schedule.

pub mod config;
pub mod controller;
pub mod events;
pub mod exchange;
pub mod service;

pub use config::{
    ControllerConfig, MAX_TIMEOUT, ServiceConfig, SyncExchangeConfig, TimeoutPolicy,
};
pub use controller::{Controller, NotificationGuard, StateTransition};
pub use events::{EventSink, FnSink, LinkEvent};
pub use exchange::PendingExchange;
pub use service::{LinkHandle, LinkService, LinkStatus};
