pub mod config;
pub mod forwarder;

pub use forwarder::{
    ConnectionError, Forwarder, ForwarderConfig, ForwarderError, ForwarderStats, IncomingRequest,
    ParseError, DEFAULT_BUFFER_SIZE,
};
