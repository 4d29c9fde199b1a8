use crate::http::headers::Headers;

/// HTTP status codes supported by the server.
///
/// Common HTTP status codes used in responses:
/// - `Ok` (200): Request successful
/// - `Created` (201): File written
/// - `BadRequest` (400): Malformed request
/// - `Forbidden` (403): Path escapes the file root or permission denied
/// - `NotFound` (404): Resource not found
/// - `PayloadTooLarge` (413): Declared body exceeds the configured limit
/// - `RequestHeaderFieldsTooLarge` (431): Header block exceeds the limit
/// - `InternalServerError` (500): Server error
/// - `NotImplemented` (501): Method not supported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 400 Bad Request
    BadRequest,
    /// 403 Forbidden
    Forbidden,
    /// 404 Not Found
    NotFound,
    /// 413 Payload Too Large
    PayloadTooLarge,
    /// 431 Request Header Fields Too Large
    RequestHeaderFieldsTooLarge,
    /// 500 Internal Server Error
    InternalServerError,
    /// 501 Not Implemented
    NotImplemented,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use beacon::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::PayloadTooLarge => 413,
            StatusCode::RequestHeaderFieldsTooLarge => 431,
            StatusCode::InternalServerError => 500,
            StatusCode::NotImplemented => 501,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use beacon::http::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::NotFound.reason_phrase(), "Not Found");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::PayloadTooLarge => "Payload Too Large",
            StatusCode::RequestHeaderFieldsTooLarge => "Request Header Fields Too Large",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::NotImplemented => "Not Implemented",
        }
    }

    /// A short plain-text body for error responses, e.g. `404 Not Found`.
    pub fn canonical_body(&self) -> String {
        format!("{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// Represents a complete HTTP response ready to be sent to a client.
///
/// `Content-Length` in `headers` always matches `body.len()` as long as the
/// body is changed through [`Response::set_body`].
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// HTTP headers in the order they will be written
    pub headers: Headers,
    /// Response body as bytes
    pub body: Vec<u8>,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```
/// # use beacon::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("Content-Type", "text/plain")
///     .body(b"hi".to_vec())
///     .build();
/// assert_eq!(response.headers.get("Content-Length"), Some("2"));
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Builds the final Response.
    ///
    /// `Content-Length` is always derived from the body. A value set through
    /// [`ResponseBuilder::header`] is overwritten.
    pub fn build(self) -> Response {
        let mut response = Response {
            status: self.status,
            headers: self.headers,
            body: Vec::new(),
        };
        response.set_body(self.body);
        response
    }
}

impl Response {
    /// Creates a 200 OK `text/plain` response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::text(StatusCode::Ok, body)
    }

    /// Creates a `text/plain` response with an arbitrary status.
    pub fn text(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(status)
            .header("Content-Type", "text/plain")
            .body(body)
            .build()
    }

    /// Creates an error response whose body is the status line text.
    pub fn error(status: StatusCode) -> Self {
        Self::text(status, status.canonical_body())
    }

    /// Creates a 404 Not Found response.
    pub fn not_found() -> Self {
        Self::error(StatusCode::NotFound)
    }

    /// Creates a 500 Internal Server Error response.
    pub fn internal_error() -> Self {
        Self::error(StatusCode::InternalServerError)
    }

    /// Replaces the body and keeps `Content-Length` in sync with it.
    pub fn set_body(&mut self, body: Vec<u8>) {
        self.headers
            .insert("Content-Length", body.len().to_string());
        self.body = body;
    }

    /// Whether the connection is closed once this response is written.
    pub fn closes_connection(&self) -> bool {
        self.headers
            .get("Connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    }
}
