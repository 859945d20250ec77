use thiserror::Error;

/// Errors that can surface from a single collector poll/scrape cycle.
/// These never escape past the collector boundary: a run loop logs them
/// and keeps the previous snapshot authoritative.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("http request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("scrape of {endpoint} returned status {status}")]
    BadStatus { endpoint: String, status: u16 },
    #[error("ipc dial to {path} failed: {source}")]
    IpcDial {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ipc request to {path} timed out")]
    IpcTimeout { path: String },
    #[error("malformed reply from {source_name}: {reason}")]
    Malformed { source_name: &'static str, reason: String },
    #[error("websocket dial to {url} failed: {source}")]
    WsDial {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("websocket connection to {url} closed")]
    WsClosed { url: String },
}
