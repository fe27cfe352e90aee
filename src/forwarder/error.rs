//! Error types for the forwarder.

use thiserror::Error;

/// Errors that are fatal for a forwarder instance.
#[derive(Debug, Error)]
pub enum ForwarderError {
    /// The listening port could not be bound.
    #[error("failed to bind listening socket: {0}")]
    Bind(#[source] std::io::Error),

    /// The upstream HTTP client could not be constructed.
    #[error("failed to build upstream client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Errors contained within a single connection's handling task.
///
/// These never cross connection boundaries and never reach the caller
/// of [`Forwarder::start`](crate::forwarder::Forwarder::start); they are
/// logged by the accept loop's spawned task and the connection is closed.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Malformed or incomplete client request.
    #[error("request parse failed: {0}")]
    Parse(#[from] ParseError),

    /// The upstream request could not be resolved, connected, or completed.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    /// I/O failure relaying bytes to the client mid-stream.
    #[error("relay failed: {0}")]
    Relay(#[from] std::io::Error),
}

impl ConnectionError {
    /// Whether this error reflects routine client behavior, such as the
    /// client closing its socket before the relay finished, rather than
    /// a forwarding failure.
    pub fn is_client_disconnect(&self) -> bool {
        matches!(self, ConnectionError::Relay(_))
    }
}


/// Outcomes of parsing the request line and header block.
///
/// End-of-stream before the header block is terminated is a defined
/// outcome here, not a fault: a client closing its socket mid-headers
/// yields [`ParseError::UnexpectedEof`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The client closed the connection before the request was complete.
    #[error("connection closed before request was complete")]
    UnexpectedEof,

    /// The request line did not contain method, path, and version.
    #[error("malformed request line: {0:?}")]
    BadRequestLine(String),

    /// Any method other than GET.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// A header name or value that cannot be sent upstream.
    #[error("invalid header: {0:?}")]
    InvalidHeader(String),

    /// I/O failure while reading the request.
    #[error("i/o error reading request: {0}")]
    Io(#[from] std::io::Error),
}
