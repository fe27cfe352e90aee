//! Test harness for forwarder integration tests.
//!
//! Provides helpers to spawn a forwarder on an ephemeral port and to
//! speak raw HTTP/1.1 to it over a plain TCP socket, reading the
//! response until the forwarder closes the connection.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use http_forwarder::{Forwarder, ForwarderConfig};

/// Start a forwarder on an ephemeral localhost port.
pub async fn spawn_forwarder(target_base_url: &str) -> Forwarder {
    Forwarder::start(ForwarderConfig::new(0, target_base_url))
        .await
        .expect("forwarder should bind an ephemeral port")
}

/// Send raw bytes and read the response until the connection closes.
pub async fn raw_roundtrip(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    timeout(Duration::from_secs(5), async {
        let mut stream = TcpStream::connect(addr).await.expect("connect");
        stream.write_all(request).await.expect("write request");
        stream.flush().await.expect("flush request");
        // Half-close so the forwarder sees EOF if it reads past the request.
        stream.shutdown().await.expect("shutdown write half");
        let mut response = Vec::new();
        stream
            .read_to_end(&mut response)
            .await
            .expect("read response");
        response
    })
    .await
    .expect("response within deadline")
}

/// A response read off the wire, split into its parts.
#[allow(dead_code)]
pub struct RawResponse {
    pub status_line: String,
    /// Header name/value pairs, names lowercased, order preserved.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl RawResponse {
    pub fn parse(raw: &[u8]) -> Self {
        let split = raw
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response has a header terminator");
        let head = std::str::from_utf8(&raw[..split]).expect("head is utf-8");
        let body = raw[split + 4..].to_vec();

        let mut lines = head.split("\r\n");
        let status_line = lines.next().expect("status line").to_string();
        let headers = lines
            .map(|line| {
                let (name, value) = line.split_once(':').expect("header line has a colon");
                (name.trim().to_ascii_lowercase(), value.trim().to_string())
            })
            .collect();

        Self {
            status_line,
            headers,
            body,
        }
    }

    pub fn values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}
