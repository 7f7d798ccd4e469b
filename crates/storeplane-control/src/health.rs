//! Reachability probes for deployed stores.

use std::time::Duration;

use tracing::debug;

use crate::error::{ControlError, ControlResult};
use crate::types::{StoreRecord, StoreType};

/// Default wall-clock limit for one probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Stateless HTTP probe of a store's public endpoint.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    client: reqwest::Client,
}

impl HealthChecker {
    /// Create a checker with the default probe timeout.
    pub fn new() -> ControlResult<Self> {
        Self::with_timeout(DEFAULT_PROBE_TIMEOUT)
    }

    /// Create a checker with a custom probe timeout.
    pub fn with_timeout(timeout: Duration) -> ControlResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// URL probed for a store.
    #[must_use]
    pub fn probe_url(store: &StoreRecord) -> String {
        match store.store_type {
            StoreType::WooCommerce => store.url.clone(),
            StoreType::Medusa => format!("{}/health", store.url.trim_end_matches('/')),
        }
    }

    /// Probe a store.
    ///
    /// Returns `Ok(true)` on a 2xx response. Network failures and any other
    /// status are reported as [`ControlError::Probe`]; callers treat them as
    /// inconclusive rather than fatal.
    pub async fn probe(&self, store: &StoreRecord) -> ControlResult<bool> {
        let url = Self::probe_url(store);

        let response = self.client.get(&url).send().await.map_err(|e| {
            debug!(store_id = %store.id, url = %url, error = %e, "health probe failed");
            ControlError::probe(format!("request to {url} failed: {e}"))
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(store_id = %store.id, url = %url, "health probe passed");
            return Ok(true);
        }

        debug!(store_id = %store.id, url = %url, status = status.as_u16(), "health probe failed");
        Err(ControlError::probe(format!(
            "unexpected status code: {}",
            status.as_u16()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{addr}")
    }

    fn record(store_type: StoreType, url: String) -> StoreRecord {
        let mut record = StoreRecord::new("Test Shop".to_owned(), store_type, "localhost");
        record.url = url;
        record
    }

    #[test]
    fn probe_url_depends_on_type() {
        let woo = record(StoreType::WooCommerce, "http://store-a.localhost".to_owned());
        let medusa = record(StoreType::Medusa, "http://store-b.localhost".to_owned());
        assert_eq!(HealthChecker::probe_url(&woo), "http://store-a.localhost");
        assert_eq!(
            HealthChecker::probe_url(&medusa),
            "http://store-b.localhost/health"
        );
    }

    #[tokio::test]
    async fn woocommerce_probe_hits_root() {
        let base = serve(Router::new().route("/", get(|| async { "ok" }))).await;
        let checker = HealthChecker::new().unwrap();

        assert!(
            checker
                .probe(&record(StoreType::WooCommerce, base))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn medusa_probe_hits_health_path() {
        let app = Router::new()
            .route("/", get(|| async { StatusCode::NOT_FOUND }))
            .route("/health", get(|| async { "OK" }));
        let base = serve(app).await;
        let checker = HealthChecker::new().unwrap();

        assert!(checker.probe(&record(StoreType::Medusa, base)).await.unwrap());
    }

    #[tokio::test]
    async fn non_success_status_is_probe_error() {
        let app = Router::new().route("/", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let base = serve(app).await;
        let checker = HealthChecker::new().unwrap();

        let result = checker.probe(&record(StoreType::WooCommerce, base)).await;
        let Err(ControlError::Probe(message)) = result else {
            panic!("expected probe error");
        };
        assert!(message.contains("503"));
    }

    #[tokio::test]
    async fn unreachable_store_is_probe_error() {
        let checker = HealthChecker::with_timeout(Duration::from_millis(500)).unwrap();
        let result = checker
            .probe(&record(
                StoreType::WooCommerce,
                "http://127.0.0.1:1".to_owned(),
            ))
            .await;
        assert!(matches!(result, Err(ControlError::Probe(_))));
    }
}
