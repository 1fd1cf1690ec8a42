//! Minimal HTTP/1.x handling for the device's web server
//!
//! The server answers one request per connection. Only the request line is
//! looked at; headers are read and ignored. Three resources exist:
//!
//! | Path                 | Content type             | Body                 |
//! |----------------------|--------------------------|----------------------|
//! | `/`, `/index.html`   | `text/html`              | landing page         |
//! | `/main.js`           | `application/javascript` | landing page script  |
//! | `/readData`          | `application/json`       | latest reading       |
//!
//! The socket side lives with the transport (embassy-net on the device,
//! `std::net` in the simulator); this module turns request bytes into a
//! [`Response`].

use core::fmt::Write;

use heapless::String;
use log::debug;
use thiserror_no_std::Error;

use crate::readout::{READOUT_CAPACITY, read_latest};
use crate::store::LatestReading;

/// Landing page served on `/`
pub const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Script polling `/readData`, served on `/main.js`
pub const MAIN_JS: &str = include_str!("../assets/main.js");

/// Largest request head the server buffers
pub const MAX_REQUEST_SIZE: usize = 1024;

/// Room for the status line and the fixed header set
pub const HEAD_CAPACITY: usize = 192;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpError {
    #[error("request line is not valid UTF-8")]
    InvalidUtf8,
    #[error("malformed request line: {details}")]
    MalformedRequestLine { details: &'static str },
    #[error("unsupported protocol version")]
    UnsupportedVersion,
}

/// Parsed request line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub method: &'a str,
    /// Request target without the query string
    pub path: &'a str,
    pub version: &'a str,
}

/// Whether `buf` holds a complete request head.
pub fn request_complete(buf: &[u8]) -> bool {
    buf.windows(4).any(|w| w == b"\r\n\r\n")
}

/// Parse the request line at the start of `buf`.
pub fn parse_request_line(buf: &[u8]) -> Result<Request<'_>, HttpError> {
    let line_end = buf
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(buf.len());
    let line = core::str::from_utf8(&buf[..line_end]).map_err(|_| HttpError::InvalidUtf8)?;

    let mut parts = line.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::MalformedRequestLine {
            details: "expected method, target and version",
        });
    };

    if method.is_empty() || !method.bytes().all(|b| b.is_ascii_uppercase()) {
        return Err(HttpError::MalformedRequestLine {
            details: "invalid method",
        });
    }
    if !target.starts_with('/') {
        return Err(HttpError::MalformedRequestLine {
            details: "target must be an absolute path",
        });
    }
    if version != "HTTP/1.1" && version != "HTTP/1.0" {
        return Err(HttpError::UnsupportedVersion);
    }

    let path = target.split_once('?').map_or(target, |(path, _)| path);
    Ok(Request {
        method,
        path,
        version,
    })
}

/// Resources the server knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Index,
    Script,
    ReadData,
}

impl Route {
    pub fn resolve(path: &str) -> Option<Self> {
        match path {
            "/" | "/index.html" => Some(Self::Index),
            "/main.js" => Some(Self::Script),
            "/readData" => Some(Self::ReadData),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
}

impl Status {
    pub const fn code(self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::MethodNotAllowed => 405,
        }
    }

    pub const fn reason(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::MethodNotAllowed => "Method Not Allowed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Static(&'static str),
    Readout(String<READOUT_CAPACITY>),
}

impl Body {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Static(text) => text,
            Self::Readout(json) => json.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub content_type: &'static str,
    pub body: Body,
}

impl Response {
    fn text(status: Status) -> Self {
        Self {
            status,
            content_type: "text/plain",
            body: Body::Static(status.reason()),
        }
    }

    /// Status line and headers, terminated by the blank line.
    pub fn head(&self) -> String<HEAD_CAPACITY> {
        let mut head = String::new();
        let _ = write!(
            head,
            "HTTP/1.1 {} {}\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Cache-Control: no-store\r\n",
            self.status.code(),
            self.status.reason(),
            self.content_type,
            self.body.as_str().len(),
        );
        if self.status == Status::MethodNotAllowed {
            let _ = head.push_str("Allow: GET\r\n");
        }
        let _ = head.push_str("Connection: close\r\n\r\n");
        head
    }

    pub fn body(&self) -> &[u8] {
        self.body.as_str().as_bytes()
    }
}

/// Answer the request in `buf`, reading `/readData` from `store`.
pub fn handle_request(buf: &[u8], store: &LatestReading) -> Response {
    let request = match parse_request_line(buf) {
        Ok(request) => request,
        Err(e) => {
            debug!("Rejecting request: {}", e);
            return Response::text(Status::BadRequest);
        }
    };
    debug!("{} {}", request.method, request.path);

    let Some(route) = Route::resolve(request.path) else {
        return Response::text(Status::NotFound);
    };
    if request.method != "GET" {
        return Response::text(Status::MethodNotAllowed);
    }

    match route {
        Route::Index => Response {
            status: Status::Ok,
            content_type: "text/html",
            body: Body::Static(INDEX_HTML),
        },
        Route::Script => Response {
            status: Status::Ok,
            content_type: "application/javascript",
            body: Body::Static(MAIN_JS),
        },
        Route::ReadData => Response {
            status: Status::Ok,
            content_type: "application/json",
            body: Body::Readout(read_latest(store)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::SensorReading;

    fn get(path: &str) -> std::string::String {
        format!("GET {path} HTTP/1.1\r\nHost: healthmonitor.local\r\n\r\n")
    }

    #[test]
    fn test_request_complete_needs_blank_line() {
        assert!(!request_complete(b"GET / HTTP/1.1\r\nHost: x\r\n"));
        assert!(request_complete(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n"));
    }

    #[test]
    fn test_parse_strips_query() {
        let request = parse_request_line(b"GET /readData?t=1700000000 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/readData");
        assert_eq!(request.version, "HTTP/1.1");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            parse_request_line(b"GET /\r\n\r\n"),
            Err(HttpError::MalformedRequestLine { .. })
        ));
        assert!(matches!(
            parse_request_line(b"get / HTTP/1.1\r\n\r\n"),
            Err(HttpError::MalformedRequestLine { .. })
        ));
        assert_eq!(
            parse_request_line(b"GET / SPDY/3\r\n\r\n"),
            Err(HttpError::UnsupportedVersion)
        );
        assert_eq!(
            parse_request_line(b"GET /\xff HTTP/1.1\r\n\r\n"),
            Err(HttpError::InvalidUtf8)
        );
    }

    #[test]
    fn test_read_data_serves_latest_reading() {
        let store = LatestReading::new();
        store.publish(SensorReading::new(80, 95, 99.1));

        let response = handle_request(get("/readData").as_bytes(), &store);

        assert_eq!(response.status, Status::Ok);
        assert_eq!(response.content_type, "application/json");
        assert_eq!(
            response.body(),
            br#"{"pulseRateValue":"80","spo2Value":"95","tempValue":"99.1"}"#
        );
    }

    #[test]
    fn test_static_assets() {
        let store = LatestReading::new();

        let index = handle_request(get("/").as_bytes(), &store);
        assert_eq!(index.content_type, "text/html");
        assert_eq!(index, handle_request(get("/index.html").as_bytes(), &store));
        assert!(index.body.as_str().contains("main.js"));

        let script = handle_request(get("/main.js").as_bytes(), &store);
        assert_eq!(script.content_type, "application/javascript");
        assert!(script.body.as_str().contains("/readData"));
    }

    #[test]
    fn test_error_statuses() {
        let store = LatestReading::new();
        assert_eq!(
            handle_request(get("/favicon.ico").as_bytes(), &store).status,
            Status::NotFound
        );
        assert_eq!(
            handle_request(b"POST /readData HTTP/1.1\r\n\r\n", &store).status,
            Status::MethodNotAllowed
        );
        assert_eq!(
            handle_request(b"\r\n\r\n", &store).status,
            Status::BadRequest
        );
    }

    #[test]
    fn test_head_carries_length_and_closes() {
        let store = LatestReading::new();
        let response = handle_request(get("/readData").as_bytes(), &store);
        let head = response.head();

        assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(head.contains("Content-Type: application/json\r\n"));
        let length = format!("Content-Length: {}\r\n", response.body().len());
        assert!(head.contains(length.as_str()));
        assert!(head.ends_with("Connection: close\r\n\r\n"));
    }

    #[test]
    fn test_method_not_allowed_lists_get() {
        let store = LatestReading::new();
        let head = handle_request(b"DELETE / HTTP/1.1\r\n\r\n", &store).head();
        assert!(head.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(head.contains("Allow: GET\r\n"));
    }
}
