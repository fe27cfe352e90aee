//! Request line and header block parsing.
//!
//! Reads exactly one HTTP/1.1 request head from a buffered stream. Lines
//! are terminated by CRLF or bare LF. Parsing stops at the empty line;
//! no request body is ever read (the forwarder is GET-only).

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use super::error::ParseError;

/// A parsed client request head.
///
/// Headers are kept as an ordered list of name/value pairs so that a
/// name appearing N times in the input produces N entries, all forwarded
/// upstream as independent repeated headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    /// Request method, as received (matched case-insensitively).
    pub method: String,
    /// Request path, verbatim; appended to the target base URL as-is.
    pub path: String,
    /// Header name/value pairs in input order, multiplicity preserved.
    pub headers: Vec<(String, String)>,
}

/// Read and parse one request head from `reader`.
///
/// Returns a tagged [`ParseError`] for every malformed input, including
/// end-of-stream before the blank line terminating the header block.
pub async fn read_request<R>(reader: &mut R) -> Result<IncomingRequest, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let request_line = read_line(reader).await?.ok_or(ParseError::UnexpectedEof)?;

    // At most 3 tokens: method, path, version (version discarded).
    let mut tokens = request_line.splitn(3, ' ');
    let (method, path) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(method), Some(path), Some(_)) => (method.to_string(), path.to_string()),
        _ => return Err(ParseError::BadRequestLine(request_line)),
    };

    if !method.eq_ignore_ascii_case("GET") {
        return Err(ParseError::MethodNotAllowed(method));
    }

    let mut headers = Vec::new();
    loop {
        let line = read_line(reader).await?.ok_or(ParseError::UnexpectedEof)?;
        if line.is_empty() {
            break;
        }

        // Split on the first colon; a line without one carries an empty value.
        let (name, value) = match line.split_once(':') {
            Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
            None => (line.trim().to_string(), String::new()),
        };
        headers.push((name, value));
    }

    Ok(IncomingRequest {
        method,
        path,
        headers,
    })
}

/// Read one line, stripping the CRLF or LF terminator.
///
/// Returns `None` at end-of-stream.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(Some(line))
}
