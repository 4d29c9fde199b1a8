//! Request routing.
//!
//! The route table is static. A request is dispatched to the route whose
//! method equals the request method and whose pattern matches the path;
//! when several match, the longest pattern wins. Anything unmatched is a
//! 404.
//!
//! ```text
//! GET  /                 -> greeting
//! GET  /echo/<text>      -> <text>
//! GET  /user-agent       -> User-Agent header value
//! GET  /files/<name>     -> file bytes from the root
//! POST /files/<name>     -> write body to the root
//! ```

pub mod files;

use anyhow::Context;
use tracing::{debug, warn};

use crate::config::FilesConfig;
use crate::http::encoding;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::router::files::{FileError, FileStore};

pub const GREETING: &str = "Hello, World!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Exact(&'static str),
    Prefix(&'static str),
}

impl Pattern {
    /// Returns the part of `path` after the pattern if it matches.
    pub fn matches<'a>(&self, path: &'a str) -> Option<&'a str> {
        match self {
            Pattern::Exact(p) => (path == *p).then_some(""),
            Pattern::Prefix(p) => path.strip_prefix(p),
        }
    }

    fn specificity(&self) -> usize {
        match self {
            Pattern::Exact(p) | Pattern::Prefix(p) => p.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Index,
    Echo,
    UserAgent,
    ReadFile,
    WriteFile,
}

#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub method: Method,
    pub pattern: Pattern,
    pub endpoint: Endpoint,
}

pub const ROUTES: &[Route] = &[
    Route { method: Method::GET, pattern: Pattern::Exact("/"), endpoint: Endpoint::Index },
    Route { method: Method::GET, pattern: Pattern::Prefix("/echo/"), endpoint: Endpoint::Echo },
    Route { method: Method::GET, pattern: Pattern::Exact("/user-agent"), endpoint: Endpoint::UserAgent },
    Route { method: Method::GET, pattern: Pattern::Prefix("/files/"), endpoint: Endpoint::ReadFile },
    Route { method: Method::POST, pattern: Pattern::Prefix("/files/"), endpoint: Endpoint::WriteFile },
];

/// Maps requests to responses. Shared read-only by every connection.
#[derive(Debug)]
pub struct Router {
    files: FileStore,
    routes: &'static [Route],
}

impl Router {
    pub fn new(files: FileStore) -> Self {
        Self {
            files,
            routes: ROUTES,
        }
    }

    pub fn from_config(cfg: &FilesConfig) -> anyhow::Result<Self> {
        let files = FileStore::new(&cfg.root)
            .with_context(|| format!("Invalid files root {}", cfg.root.display()))?;
        Ok(Self::new(files))
    }

    /// Finds the most specific route for `method` and `path`, along with the
    /// remainder of the path after the matched prefix.
    pub fn find<'a>(&self, method: Method, path: &'a str) -> Option<(&Route, &'a str)> {
        self.routes
            .iter()
            .filter(|r| r.method == method)
            .filter_map(|r| r.pattern.matches(path).map(|tail| (r, tail)))
            .max_by_key(|(r, _)| r.pattern.specificity())
    }

    /// Executes a request and applies content negotiation to the result.
    pub async fn handle(&self, request: &Request) -> Response {
        let mut response = match self.find(request.method, &request.path) {
            Some((route, tail)) => self.dispatch(route.endpoint, tail, request).await,
            None => Response::not_found(),
        };

        encoding::negotiate(request, &mut response);

        debug!(
            method = %request.method,
            path = %request.path,
            status = response.status.as_u16(),
            "Request handled"
        );
        response
    }

    async fn dispatch(&self, endpoint: Endpoint, tail: &str, request: &Request) -> Response {
        match endpoint {
            Endpoint::Index => Response::ok(GREETING),
            Endpoint::Echo => Response::ok(tail),
            Endpoint::UserAgent => match request.header("User-Agent") {
                Some(agent) => Response::ok(agent),
                None => Response::text(StatusCode::BadRequest, "missing User-Agent header"),
            },
            Endpoint::ReadFile => match self.files.read(tail).await {
                Ok(bytes) => ResponseBuilder::new(StatusCode::Ok)
                    .header("Content-Type", "application/octet-stream")
                    .body(bytes)
                    .build(),
                Err(e) => file_error(tail, e),
            },
            Endpoint::WriteFile => match self.files.write(tail, request.body()).await {
                Ok(()) => ResponseBuilder::new(StatusCode::Created).build(),
                // A missing parent directory is a failed write, not a missing resource.
                Err(FileError::NotFound) => {
                    warn!(file = %tail, "Parent directory does not exist");
                    Response::internal_error()
                }
                Err(e) => file_error(tail, e),
            },
        }
    }
}

fn file_error(name: &str, e: FileError) -> Response {
    match &e {
        FileError::Io(_) => warn!(file = %name, error = %e, "File operation failed"),
        _ => debug!(file = %name, error = %e, "File request rejected"),
    }
    Response::error(e.status())
}
