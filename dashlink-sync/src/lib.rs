//! # dashlink-sync — client sync engine
//!
//! Keeps a locally rendered component tree consistent with a dashboard
//! server that pushes incremental changes over a WebSocket hub, and
//! forwards user actions back.
//!
//! ## Architecture
//!
//! ```text
//!   HttpApi ──► handshake ──┐
//!                           ▼
//!   hub ──► transport ──► Dashboard ──► TopicBus ──► ComponentTree / stores
//!    ▲                      │                              │
//!    └──── outbox ◄─────────┴──── EventDispatcher ◄── user actions
//! ```
//!
//! - [`protocol`] — hub frames and the typed [`HubMessage`]
//! - [`transport`] — socket tasks, invocations and completions
//! - [`bus`] — synchronous topic bus with RAII subscriptions
//! - [`store`] / [`tree`] — per-node state and the mounting resolver
//! - [`dispatch`] — outbound client events
//! - [`session`] — session data and the liveness poll
//! - [`engine`] — [`Dashboard`], tying it together

pub mod api;
pub mod bus;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod host;
pub mod protocol;
pub mod session;
pub mod store;
pub mod transport;
pub mod tree;

pub use api::{ApiError, DashboardApi, HandshakeResponse, HttpApi};
pub use bus::{BusMessage, Subscription, TopicBus};
pub use config::ClientConfig;
pub use dispatch::{ElementEvent, EventDispatcher, Outbound};
pub use engine::{Dashboard, DashboardHandle, EngineError, EngineEvent, UserAction, View};
pub use host::{Host, HostError, Navigation, Notification, NotificationLevel, ScriptError, ScriptEvaluator};
pub use protocol::{HubInvocation, HubMessage, ProtocolError};
pub use session::{Position, Session};
pub use store::{ComponentMessage, ComponentState};
pub use transport::{ConnectionState, HubHandle, TransportError, TransportEvent};
pub use tree::ComponentTree;
