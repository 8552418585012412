//! Tenant event fan-out (spec §4.7): a single shared `events.*` consumer
//! routes each bus event to every socket currently authenticated for that
//! tenant, instead of one Redis subscriber per socket.
//!
//! Per-socket lifecycle: `connecting -> authenticating -> active -> closed`.
//! Authentication happens once, synchronously, before the upgrade completes;
//! a missing or invalid bearer token closes the connection immediately.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::events::{BusEvent, EventBus};

use super::auth::WebSocketAuth;

const SOCKET_BUFFER: usize = 256;

/// Opaque per-socket identifier, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Deserialize)]
pub struct FanoutQuery {
    pub token: Option<String>,
}

/// Owns the tenant -> socket-set routing map and the single subscription
/// that feeds it. Cheap to clone; share one instance across the process.
pub struct FanoutRouter {
    auth: Arc<WebSocketAuth>,
    routes: RwLock<HashMap<String, HashSet<ConnectionId>>>,
    senders: RwLock<HashMap<ConnectionId, mpsc::Sender<String>>>,
}

impl FanoutRouter {
    pub fn new(auth: Arc<WebSocketAuth>) -> Arc<Self> {
        Arc::new(Self {
            auth,
            routes: RwLock::new(HashMap::new()),
            senders: RwLock::new(HashMap::new()),
        })
    }

    /// Subscribe to every tenant's channel and forward each event to that
    /// tenant's connected sockets until the subscription itself fails.
    pub async fn run(self: Arc<Self>, bus: EventBus, redis_url: &str) -> Result<()> {
        let mut sub = bus.subscribe_all(redis_url).await?;
        loop {
            let event = sub.recv().await?;
            self.fanout(&event).await;
        }
    }

    async fn fanout(&self, event: &BusEvent) {
        let ids: Vec<ConnectionId> = {
            let routes = self.routes.read().await;
            match routes.get(&event.tenant_id) {
                Some(set) if !set.is_empty() => set.iter().copied().collect(),
                _ => return,
            }
        };

        let body = match serde_json::to_string(event) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, tenant_id = %event.tenant_id, "failed to serialize bus event for fan-out");
                return;
            }
        };

        let senders = self.senders.read().await;
        for id in ids {
            if let Some(tx) = senders.get(&id) {
                if tx.try_send(body.clone()).is_err() {
                    debug!(connection_id = %id, "fan-out channel full or closed, dropping event for this socket");
                }
            }
        }
    }

    async fn register(&self, tenant_id: &str, id: ConnectionId, tx: mpsc::Sender<String>) {
        self.senders.write().await.insert(id, tx);
        self.routes.write().await.entry(tenant_id.to_string()).or_default().insert(id);
    }

    async fn deregister(&self, tenant_id: &str, id: ConnectionId) {
        self.senders.write().await.remove(&id);
        let mut routes = self.routes.write().await;
        if let Some(set) = routes.get_mut(tenant_id) {
            set.remove(&id);
            if set.is_empty() {
                routes.remove(tenant_id);
            }
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.senders.read().await.len()
    }
}

/// axum handler: validates the bearer token from the query string or the
/// `Authorization` header, then upgrades. Unauthenticated requests never
/// reach the socket.
pub async fn ws_fanout_handler(
    State(router): State<Arc<FanoutRouter>>,
    Query(query): Query<FanoutQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> axum::response::Response {
    let token = query.token.or_else(|| bearer_from_header(&headers));

    let tenant_id = match token.as_deref().map(|t| router.auth.validate_token(t)) {
        Some(Ok(claims)) => claims.org_id.unwrap_or(claims.sub),
        _ => {
            warn!("websocket fan-out connection rejected: missing or invalid bearer token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, router, tenant_id)).into_response()
}

fn bearer_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn handle_socket(socket: WebSocket, router: Arc<FanoutRouter>, tenant_id: String) {
    let id = ConnectionId::new();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<String>(SOCKET_BUFFER);

    router.register(&tenant_id, id, tx).await;
    info!(connection_id = %id, tenant_id = %tenant_id, "websocket fan-out connection active");

    let forward = tokio::spawn(async move {
        while let Some(body) = rx.recv().await {
            if sink.send(Message::Text(body)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }

    forward.abort();
    router.deregister(&tenant_id, id).await;
    info!(connection_id = %id, tenant_id = %tenant_id, "websocket fan-out connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> Arc<FanoutRouter> {
        FanoutRouter::new(Arc::new(WebSocketAuth::new("test-secret".to_string(), 3600)))
    }

    #[tokio::test]
    async fn register_routes_event_to_matching_tenant_only() {
        let router = router();
        let id_a = ConnectionId::new();
        let id_b = ConnectionId::new();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        router.register("tenant-a", id_a, tx_a).await;
        router.register("tenant-b", id_b, tx_b).await;

        let event = BusEvent {
            tenant_id: "tenant-a".to_string(),
            seq: 1,
            event_type: "flow.completed".to_string(),
            payload: serde_json::json!({}),
            emitted_at: chrono::Utc::now(),
        };
        router.fanout(&event).await;

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn deregister_removes_empty_tenant_bucket() {
        let router = router();
        let id = ConnectionId::new();
        let (tx, _rx) = mpsc::channel(8);
        router.register("tenant-a", id, tx).await;
        assert_eq!(router.connection_count().await, 1);

        router.deregister("tenant-a", id).await;
        assert_eq!(router.connection_count().await, 0);
        assert!(router.routes.read().await.get("tenant-a").is_none());
    }
}
