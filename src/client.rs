//! The HTTP seam between the engine and the network.
//!
//! The engine only ever talks to the gateway through [`HttpClient`], so the
//! real TLS client and the scripted test client are interchangeable. The
//! response body must stream: the engine reads it chunk by chunk rather than
//! buffering it whole.

use async_trait::async_trait;
use axum::response::IntoResponse;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::time::Duration;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type HyperClient = Client<hyper_tls::HttpsConnector<HttpConnector>, axum::body::Body>;

#[async_trait]
pub trait HttpClient: std::fmt::Debug {
    async fn request(
        &self,
        req: axum::extract::Request,
    ) -> Result<axum::response::Response, BoxError>;
}

#[async_trait]
impl HttpClient for HyperClient {
    async fn request(
        &self,
        req: axum::extract::Request,
    ) -> Result<axum::response::Response, BoxError> {
        self.request(req)
            .await
            .map(IntoResponse::into_response)
            .map_err(|e| Box::new(e) as BoxError)
    }
}

fn pool_env<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Build the production TLS client.
///
/// Pool settings come from `DOWNSTREAM_POOL_IDLE_TIMEOUT_SECS` and
/// `DOWNSTREAM_POOL_MAX_IDLE_PER_HOST`; the defaults suit a single
/// interactive session, where at most one stream is open at a time.
pub fn create_hyper_client() -> HyperClient {
    let idle_timeout_secs: u64 = pool_env("DOWNSTREAM_POOL_IDLE_TIMEOUT_SECS", 90);
    let max_idle_per_host: usize = pool_env("DOWNSTREAM_POOL_MAX_IDLE_PER_HOST", 8);

    tracing::debug!(
        idle_timeout_secs,
        max_idle_per_host,
        "building upstream HTTP client"
    );

    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(idle_timeout_secs))
        .pool_max_idle_per_host(max_idle_per_host)
        .pool_timer(TokioTimer::new())
        .build(hyper_tls::HttpsConnector::new())
}
