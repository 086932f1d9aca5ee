//! Error taxonomy for the chat engine.
//!
//! Only failures the user should see become `ChatError`s. Malformed SSE
//! lines are recovered inside the stream loop, and persistence failures are
//! logged without interrupting an exchange.

use crate::store::StoreError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Upstream returned 429.
    #[error("Rate limits exceeded, please try again later.")]
    RateLimited,

    /// Upstream returned 402.
    #[error("Payment required, please add credits to your workspace.")]
    QuotaExceeded,

    /// Upstream returned some other non-success status.
    #[error("AI gateway error (status {status}): {message}")]
    Gateway { status: u16, message: String },

    /// The connection failed or the body stream errored mid-read.
    #[error("Transport error: {0}")]
    Transport(String),

    /// No chunk arrived within the configured idle window.
    #[error("Upstream idle for longer than {0:?}")]
    IdleTimeout(Duration),

    /// A send was attempted while another stream was in flight.
    #[error("A response is already streaming for this conversation")]
    StreamInFlight,

    /// A conversation management call (load/list/delete) failed in the store.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The outbound request could not be built.
    #[error("Failed to build upstream request: {0}")]
    Request(String),
}
