//! Per-connection handling: parse the request, dispatch it upstream,
//! relay the response back.
//!
//! One task runs this end-to-end for exactly one connection. Both the
//! client socket and the upstream response are owned by this task and
//! released on every exit path, including parse failures and mid-stream
//! errors.

use std::io;
use std::sync::atomic::Ordering;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::error::{ConnectionError, ParseError};
use super::listener::{ForwarderConfig, ForwarderStats};
use super::request::{self, IncomingRequest};

/// Handle one client connection end-to-end.
///
/// Malformed requests are answered with 400/405 directly and reported
/// as `Ok`; upstream and relay failures surface as [`ConnectionError`]
/// for the accept loop's spawned task to log. The connection is closed
/// on return in all cases.
pub(crate) async fn handle_connection(
    stream: TcpStream,
    config: &ForwarderConfig,
    client: &reqwest::Client,
    stats: &ForwarderStats,
) -> Result<(), ConnectionError> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::with_capacity(config.buffer_size, write_half);

    let request = match request::read_request(&mut reader).await {
        Ok(request) => request,
        Err(ParseError::MethodNotAllowed(method)) => {
            stats.requests_rejected.fetch_add(1, Ordering::Relaxed);
            debug!(method = %method, "Rejecting non-GET request");
            write_response_head(&mut writer, "405 Method Not Allowed", false).await?;
            return Ok(());
        }
        Err(e @ ParseError::Io(_)) => return Err(e.into()),
        Err(e) => {
            stats.requests_rejected.fetch_add(1, Ordering::Relaxed);
            debug!(error = %e, "Rejecting malformed request");
            write_response_head(&mut writer, "400 Bad Request", false).await?;
            return Ok(());
        }
    };

    let headers = match upstream_headers(&request) {
        Ok(headers) => headers,
        Err(e) => {
            stats.requests_rejected.fetch_add(1, Ordering::Relaxed);
            debug!(error = %e, "Rejecting request with unforwardable header");
            write_response_head(&mut writer, "400 Bad Request", false).await?;
            return Ok(());
        }
    };

    // Exact concatenation; the path is appended verbatim, no normalization.
    let url = format!("{}{}", config.target_base_url, request.path);
    info!(method = %request.method, url = %url, "Forwarding request");

    let response = match client.get(&url).headers(headers).send().await {
        Ok(response) => response,
        Err(e) => {
            stats.upstream_failures.fetch_add(1, Ordering::Relaxed);
            // Nothing has been written to the client yet; close without
            // a response rather than inventing a status of our own.
            return Err(ConnectionError::Upstream(e));
        }
    };

    let status = response.status();
    let status_line = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    );
    write_response_head(&mut writer, &status_line, true).await?;
    write_upstream_headers(&mut writer, response.headers()).await?;

    let mut relayed = 0u64;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                stats.upstream_failures.fetch_add(1, Ordering::Relaxed);
                return Err(ConnectionError::Upstream(e));
            }
        };
        if let Err(e) = writer.write_all(&chunk).await {
            // Client went away mid-stream; normal termination for a relay.
            // Bytes that made it out before the disconnect still count.
            stats.bytes_relayed.fetch_add(relayed, Ordering::Relaxed);
            debug!(bytes = relayed, error = %e, "Client disconnected during relay");
            return Ok(());
        }
        relayed += chunk.len() as u64;
    }
    writer.flush().await?;

    stats.requests_forwarded.fetch_add(1, Ordering::Relaxed);
    stats.bytes_relayed.fetch_add(relayed, Ordering::Relaxed);
    debug!(status = status.as_u16(), bytes = relayed, "Response relayed");

    Ok(())
}

/// Build the upstream header map from the captured request headers.
///
/// `Host` is dropped in every spelling; the client library derives it
/// from the upstream URL's authority. Repeated names are appended as
/// repeated entries.
fn upstream_headers(request: &IncomingRequest) -> Result<HeaderMap, ParseError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ParseError::InvalidHeader(name.clone()))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|_| ParseError::InvalidHeader(name.clone()))?;
        headers.append(header_name, header_value);
    }
    Ok(headers)
}

/// Write the forwarded upstream headers and terminate the header block.
///
/// Every upstream header is relayed verbatim, once per repeated value,
/// except any header named `Connection`: the response head already
/// carries `Connection: close` and the forwarder never keeps
/// connections alive. Flushes after the terminating blank line.
async fn write_upstream_headers<W>(writer: &mut W, headers: &HeaderMap) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    for (name, value) in headers {
        if name == &CONNECTION {
            continue;
        }
        writer.write_all(name.as_str().as_bytes()).await?;
        writer.write_all(b": ").await?;
        writer.write_all(value.as_bytes()).await?;
        writer.write_all(b"\r\n").await?;
    }
    writer.write_all(b"\r\n").await?;
    writer.flush().await?;
    Ok(())
}

/// Write `HTTP/1.1 <status line>` and `Connection: close`.
///
/// When no further headers follow, the terminating blank line is
/// written and the stream flushed; otherwise the caller writes the
/// forwarded headers first and terminates the block itself.
async fn write_response_head<W>(
    writer: &mut W,
    status_line: &str,
    more_headers: bool,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(b"HTTP/1.1 ").await?;
    writer.write_all(status_line.as_bytes()).await?;
    writer.write_all(b"\r\nConnection: close\r\n").await?;
    if !more_headers {
        writer.write_all(b"\r\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_headers(headers: &[(&str, &str)]) -> IncomingRequest {
        IncomingRequest {
            method: "GET".to_string(),
            path: "/".to_string(),
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn host_is_dropped_in_any_spelling() {
        let request = request_with_headers(&[
            ("Host", "localhost:8888"),
            ("host", "localhost:8888"),
            ("Accept", "*/*"),
        ]);
        let headers = upstream_headers(&request).unwrap();
        assert!(headers.get("host").is_none());
        assert_eq!(headers.get("accept").unwrap().to_str().unwrap(), "*/*");
    }

    #[test]
    fn repeated_names_become_repeated_entries() {
        let request = request_with_headers(&[("X-Tag", "a"), ("X-Tag", "b")]);
        let headers = upstream_headers(&request).unwrap();
        let values: Vec<_> = headers
            .get_all("x-tag")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn invalid_header_name_is_a_parse_error() {
        let request = request_with_headers(&[("Bad Name", "v")]);
        match upstream_headers(&request) {
            Err(ParseError::InvalidHeader(name)) => assert_eq!(name, "Bad Name"),
            other => panic!("expected InvalidHeader, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn upstream_connection_header_is_not_forwarded() {
        let mut headers = HeaderMap::new();
        headers.append(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.append(
            HeaderName::from_static("x-origin"),
            HeaderValue::from_static("yes"),
        );

        let mut out = Vec::new();
        write_upstream_headers(&mut out, &headers).await.unwrap();

        assert_eq!(out, b"x-origin: yes\r\n\r\n");
    }

    #[tokio::test]
    async fn repeated_upstream_headers_are_forwarded_once_per_value() {
        let mut headers = HeaderMap::new();
        headers.append(HeaderName::from_static("x-tag"), HeaderValue::from_static("a"));
        headers.append(HeaderName::from_static("x-tag"), HeaderValue::from_static("b"));

        let mut out = Vec::new();
        write_upstream_headers(&mut out, &headers).await.unwrap();

        assert_eq!(out, b"x-tag: a\r\nx-tag: b\r\n\r\n");
    }

    #[tokio::test]
    async fn error_head_is_terminated_and_flushed() {
        let mut out = Vec::new();
        write_response_head(&mut out, "400 Bad Request", false)
            .await
            .unwrap();
        assert_eq!(out, b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n");
    }

    #[tokio::test]
    async fn success_head_defers_the_blank_line() {
        let mut out = Vec::new();
        write_response_head(&mut out, "200 OK", true).await.unwrap();
        assert_eq!(out, b"HTTP/1.1 200 OK\r\nConnection: close\r\n");
    }
}
