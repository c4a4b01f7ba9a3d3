//! Minimal hand-rolled HTTP/1.1 parsing and response writing.
//!
//! Only what the ingress needs: a GET request line, no keep-alive, no
//! request bodies. Every response closes the connection afterward —
//! matching `kimberlite-server`'s `http.rs` sidecar, generalized here to
//! the coordinator's routes and to streamed (chunked) blob bodies.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;

/// A parsed request line: method and path, query string stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub path: String,
}

/// Reads one HTTP/1.1 request off `stream`: the request line plus headers
/// up to the blank line. Header values are discarded — none of this
/// ingress's routes need them. Returns `Ok(None)` if the peer closed the
/// connection before sending a request line.
pub fn read_request_line(stream: &mut TcpStream) -> io::Result<Option<RequestLine>> {
    let mut reader = BufReader::new(stream);
    let mut first_line = String::new();
    if reader.read_line(&mut first_line)? == 0 {
        return Ok(None);
    }

    let parsed = parse_request_line(first_line.trim_end());

    // Drain the header block so a pipelined client's next request isn't
    // misread as this one's tail; bodies are never expected on these
    // routes so nothing past the blank line is consumed.
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    Ok(parsed)
}

fn parse_request_line(line: &str) -> Option<RequestLine> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let raw_path = parts.next()?;
    let _http_version = parts.next()?;
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();
    Some(RequestLine { method, path })
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        410 => "Gone",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}

/// Writes a complete, non-streamed response: status line, headers, body.
pub fn write_response(stream: &mut TcpStream, status: u16, content_type: &str, body: &[u8]) -> io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n",
        status = status,
        reason = reason_phrase(status),
        content_type = content_type,
        len = body.len(),
    )?;
    stream.write_all(body)?;
    stream.flush()
}

/// Writes a `200 OK` response whose body is streamed from `source` using
/// HTTP/1.1 chunked transfer encoding, so a large blob payload never has
/// to be buffered in full before the first byte reaches the client.
pub fn write_chunked_response(stream: &mut TcpStream, content_type: &str, mut source: impl Read) -> io::Result<()> {
    write!(
        stream,
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
    )?;

    let mut buf = [0u8; 8192];
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        write!(stream, "{n:x}\r\n")?;
        stream.write_all(&buf[..n])?;
        stream.write_all(b"\r\n")?;
    }
    stream.write_all(b"0\r\n\r\n")?;
    stream.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_get_line() {
        let parsed = parse_request_line("GET /blobs/ab12 HTTP/1.1");
        assert_eq!(
            parsed,
            Some(RequestLine {
                method: "GET".to_string(),
                path: "/blobs/ab12".to_string(),
            })
        );
    }

    #[test]
    fn strips_query_string_from_path() {
        let parsed = parse_request_line("GET /blobs/ab12?flags=all HTTP/1.1").unwrap();
        assert_eq!(parsed.path, "/blobs/ab12");
    }

    #[test]
    fn rejects_a_malformed_line() {
        assert_eq!(parse_request_line("garbage"), None);
    }
}
