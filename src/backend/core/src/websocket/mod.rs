//! WebSocket fan-out for real-time event delivery to tenant dashboards.
//!
//! A single Redis-backed consumer (`fanout`) relays every bus event to the
//! connected sockets subscribed to its tenant; `auth` validates the bearer
//! token presented at upgrade time.

mod auth;
mod fanout;

pub use auth::{AuthError, Claims, WebSocketAuth};
pub use fanout::{ws_fanout_handler, ConnectionId, FanoutQuery, FanoutRouter};
