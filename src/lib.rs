//! Downstream - a streaming chat conversation engine
//!
//! This library consumes OpenAI-compatible `text/event-stream` responses and
//! reassembles them into conversations: raw transport chunks are decoded into
//! SSE lines, lines into incremental text deltas, deltas into one growing
//! assistant message, with the finished exchange persisted best-effort
//! through a pluggable conversation store.
//!
//! The pipeline, leaf first:
//! - [`sse::LineDecoder`] — chunk-boundary-tolerant line decoding
//! - [`delta::extract`] — `data:` payload classification and delta extraction
//! - [`accumulator::Accumulator`] — fragment reassembly
//! - [`engine::ChatEngine`] — request lifecycle, state machine, persistence
//! - [`store::ConversationStore`] — the external persistence boundary

pub mod accumulator;
pub mod client;
pub mod delta;
pub mod engine;
pub mod errors;
pub mod models;
pub mod sse;
pub mod store;

pub use engine::{ChatEngine, EngineConfig, Phase};
pub use errors::ChatError;
pub use models::{Conversation, Message, Role, derive_title};
pub use store::{ConversationStore, InMemoryStore, StoreError};

/// Test support: a scriptable [`client::HttpClient`] that records requests
/// and replays canned (optionally streaming) responses.
pub mod test_utils {
    use crate::client::{BoxError, HttpClient};
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use std::sync::{Arc, Mutex};

    pub struct MockHttpClient {
        pub requests: Arc<Mutex<Vec<MockRequest>>>,
        response_builder: Arc<dyn Fn() -> axum::response::Response + Send + Sync>,
    }

    #[derive(Debug, Clone)]
    pub struct MockRequest {
        pub method: String,
        pub uri: String,
        pub headers: Vec<(String, String)>,
        pub body: Vec<u8>,
    }

    impl MockHttpClient {
        /// Respond to every request with a fixed status and body.
        pub fn new(status: StatusCode, body: &str) -> Self {
            let body = body.to_string();
            Self {
                requests: Arc::new(Mutex::new(Vec::new())),
                response_builder: Arc::new(move || {
                    axum::response::Response::builder()
                        .status(status)
                        .body(axum::body::Body::from(body.clone()))
                        .unwrap()
                }),
            }
        }

        /// Respond with an event-stream body delivered in the given chunks.
        pub fn new_streaming(status: StatusCode, chunks: Vec<String>) -> Self {
            Self::new_streaming_results(status, chunks.into_iter().map(Ok).collect())
        }

        /// Like [`new_streaming`](Self::new_streaming), but individual chunks
        /// may fail, simulating a connection dying mid-stream.
        pub fn new_streaming_results(
            status: StatusCode,
            chunks: Vec<Result<String, String>>,
        ) -> Self {
            Self {
                requests: Arc::new(Mutex::new(Vec::new())),
                response_builder: Arc::new(move || {
                    use axum::body::Body;
                    use futures_util::stream;

                    let stream = stream::iter(chunks.clone().into_iter().map(|chunk| {
                        chunk
                            .map(String::into_bytes)
                            .map_err(std::io::Error::other)
                    }));

                    axum::response::Response::builder()
                        .status(status)
                        .header("content-type", "text/event-stream")
                        .header("cache-control", "no-cache")
                        .header("connection", "keep-alive")
                        .body(Body::from_stream(stream))
                        .unwrap()
                }),
            }
        }

        pub fn get_requests(&self) -> Vec<MockRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl std::fmt::Debug for MockHttpClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockHttpClient")
                .field("requests", &self.requests)
                .field("response_builder", &"<closure>")
                .finish()
        }
    }

    impl Clone for MockHttpClient {
        fn clone(&self) -> Self {
            Self {
                requests: Arc::clone(&self.requests),
                response_builder: Arc::clone(&self.response_builder),
            }
        }
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn request(
            &self,
            req: axum::extract::Request,
        ) -> Result<axum::response::Response, BoxError> {
            let method = req.method().to_string();
            let uri = req.uri().to_string();
            let headers = req
                .headers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();

            let body = axum::body::to_bytes(req.into_body(), usize::MAX)
                .await
                .map_err(|e| Box::new(e) as BoxError)?
                .to_vec();

            self.requests.lock().unwrap().push(MockRequest {
                method,
                uri,
                headers,
                body,
            });

            Ok((self.response_builder)())
        }
    }
}
