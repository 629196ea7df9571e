//! Error types for the REST client and the stream session.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// A whole REST request failed. Single malformed items never produce this.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be sent or the body could not be read.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Upstream answered with a non-success status.
    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    /// The top-level body was not the expected JSON shape.
    #[error("could not decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn endpoint(&self) -> &str {
        match self {
            FetchError::Transport { endpoint, .. }
            | FetchError::Status { endpoint, .. }
            | FetchError::Decode { endpoint, .. } => endpoint,
        }
    }
}

/// Failure to establish a stream session.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("websocket connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: tungstenite::Error,
    },

    #[error("subscribe failed: {0}")]
    Subscribe(#[source] tungstenite::Error),

    #[error("could not encode subscribe frame: {0}")]
    Encode(#[from] serde_json::Error),
}
