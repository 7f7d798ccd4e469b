//! Per-client token-bucket admission control.
//!
//! Each client (keyed by source IP) owns a bucket holding up to `burst`
//! tokens. Tokens are regained at `rate` per minute, rounded down at each
//! request. A request is admitted when the bucket holds a token.
//!
//! The client map uses two-level locking: a coarse read-write lock guards
//! insertion and eviction, and each bucket has its own mutex for token
//! accounting, so concurrent requests from different clients only contend on
//! the read lock.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::AdmissionConfig;
use crate::error::ControlError;

/// Client key used when the peer address is unavailable.
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug)]
struct Bucket {
    tokens: i64,
    last_seen: Instant,
}

/// Token-bucket rate limiter keyed by client.
#[derive(Debug)]
pub struct AdmissionController {
    clients: RwLock<HashMap<String, Arc<Mutex<Bucket>>>>,
    rate: u32,
    burst: u32,
    evict_interval: Duration,
    idle_ttl: Duration,
}

impl AdmissionController {
    /// Create a controller from configuration.
    #[must_use]
    pub fn new(config: &AdmissionConfig) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            rate: config.rate,
            burst: config.burst,
            evict_interval: Duration::from_secs(config.evict_interval_secs),
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
        }
    }

    /// Decide whether to admit one request from `client`.
    pub fn admit(&self, client: &str) -> bool {
        let bucket = self.bucket(client);
        let mut bucket = bucket.lock();

        let now = Instant::now();
        let elapsed_ms = now.saturating_duration_since(bucket.last_seen).as_millis();
        let refill = elapsed_ms.saturating_mul(u128::from(self.rate)) / 60_000;
        let refill = i64::try_from(refill).unwrap_or(i64::MAX);

        bucket.tokens = bucket
            .tokens
            .saturating_add(refill)
            .min(i64::from(self.burst));
        bucket.last_seen = now;

        if bucket.tokens <= 0 {
            debug!(client, "admission denied");
            return false;
        }

        bucket.tokens -= 1;
        true
    }

    fn bucket(&self, client: &str) -> Arc<Mutex<Bucket>> {
        if let Some(bucket) = self.clients.read().get(client) {
            return Arc::clone(bucket);
        }

        let mut clients = self.clients.write();
        Arc::clone(clients.entry(client.to_owned()).or_insert_with(|| {
            Arc::new(Mutex::new(Bucket {
                tokens: i64::from(self.burst),
                last_seen: Instant::now(),
            }))
        }))
    }

    /// Forget clients idle for longer than the configured TTL.
    ///
    /// Returns the number of clients removed.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.write();
        let before = clients.len();

        clients.retain(|_, bucket| {
            now.saturating_duration_since(bucket.lock().last_seen) < self.idle_ttl
        });

        before - clients.len()
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.clients.read().len()
    }

    /// Spawn the idle-client eviction task.
    ///
    /// The task runs until `cancel` is triggered.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(controller.evict_interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let evicted = controller.evict_idle();
                        if evicted > 0 {
                            debug!(evicted, "evicted idle admission clients");
                        }
                    }
                }
            }
        })
    }
}

/// Axum middleware applying admission control to every request.
///
/// Clients are keyed by the peer IP from [`ConnectInfo`].
pub async fn admission_layer(
    State(controller): State<Arc<AdmissionController>>,
    request: Request,
    next: Next,
) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| UNKNOWN_CLIENT.to_owned(), |info| info.0.ip().to_string());

    if !controller.admit(&client) {
        warn!(client = %client, path = %request.uri().path(), "rate limit exceeded");
        return ControlError::RateLimited.into_response();
    }

    next.run(request).await
}
