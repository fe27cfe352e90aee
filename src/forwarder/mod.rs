//! Local HTTP reverse-forwarding server.
//!
//! This module provides:
//! - Listening socket lifecycle (start/stop)
//! - An accept loop spawning one task per connection
//! - Raw HTTP/1.1 GET request parsing
//! - Upstream dispatch and streaming response relay
//!
//! ## Architecture
//!
//! ```text
//! Client -> Accept loop -> Request parser -> Upstream client -> Relay
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use http_forwarder::{Forwarder, ForwarderConfig};
//!
//! let config = ForwarderConfig::new(8888, "https://origin.example");
//! let forwarder = Forwarder::start(config).await?;
//! // ... later
//! forwarder.stop();
//! forwarder.join().await;
//! ```

mod error;
mod handler;
mod listener;
mod request;

pub use error::{ConnectionError, ForwarderError, ParseError};
pub use listener::{Forwarder, ForwarderConfig, ForwarderStats, DEFAULT_BUFFER_SIZE};
pub use request::IncomingRequest;
