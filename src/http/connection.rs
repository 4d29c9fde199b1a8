use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::{debug, warn};

use crate::http::parser::{ParseError, ParseLimits, parse_http_request_with_limits};
use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;
use crate::router::Router;

const READ_CHUNK: usize = 4096;

/// One accepted client stream and its buffers.
///
/// Generic over the transport so tests can drive it with an in-memory
/// duplex pipe instead of a socket.
pub struct Connection<S> {
    stream: S,
    inbound: BytesMut,
    state: ConnectionState,
    router: Arc<Router>,
    limits: ParseLimits,
    idle_timeout: Option<Duration>,
}

pub enum ConnectionState {
    Reading,
    Parsing,
    Dispatching(Request),
    Writing(ResponseWriter),
    Closed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, router: Arc<Router>) -> Self {
        Self {
            stream,
            inbound: BytesMut::with_capacity(READ_CHUNK),
            state: ConnectionState::Reading,
            router,
            limits: ParseLimits::default(),
            idle_timeout: None,
        }
    }

    pub fn with_limits(mut self, limits: ParseLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Drives the connection until it closes.
    ///
    /// The state is taken out before each step, so an error from any step
    /// leaves the connection `Closed`.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            self.state = match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => self.read_more().await?,

                ConnectionState::Parsing => self.parse_next(),

                ConnectionState::Dispatching(request) => {
                    let mut response = self.router.handle(&request).await;

                    if !request.keep_alive() {
                        response.headers.insert("Connection", "close");
                    }

                    ConnectionState::Writing(ResponseWriter::new(&response))
                }

                ConnectionState::Writing(mut writer) => {
                    if !self.write_response(&mut writer).await? {
                        return Ok(());
                    }

                    if writer.closes_connection() {
                        ConnectionState::Closed
                    } else if !self.inbound.is_empty() {
                        // pipelined request already buffered
                        ConnectionState::Parsing
                    } else {
                        ConnectionState::Reading
                    }
                }

                ConnectionState::Closed => break,
            };
        }

        Ok(())
    }

    async fn read_more(&mut self) -> anyhow::Result<ConnectionState> {
        self.inbound.reserve(READ_CHUNK);
        let read = self.stream.read_buf(&mut self.inbound);

        let n = match self.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(res) => res.context("Failed to read request")?,
                Err(_) => {
                    debug!(buffered = self.inbound.len(), "Idle timeout, closing");
                    return Ok(ConnectionState::Closed);
                }
            },
            None => read.await.context("Failed to read request")?,
        };

        if n > 0 {
            return Ok(ConnectionState::Parsing);
        }

        // Client closed connection
        if self.inbound.is_empty() {
            return Ok(ConnectionState::Closed);
        }

        debug!(
            buffered = self.inbound.len(),
            "Peer closed in the middle of a request"
        );
        self.inbound.clear();
        Ok(Self::reject(StatusCode::BadRequest))
    }

    /// Returns false when the peer stopped reading for longer than the idle
    /// timeout.
    async fn write_response(&mut self, writer: &mut ResponseWriter) -> anyhow::Result<bool> {
        let write = writer.write_to_stream(&mut self.stream);

        match self.idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, write).await {
                Ok(res) => res.context("Failed to write response")?,
                Err(_) => {
                    debug!("Write stalled past idle timeout, closing");
                    return Ok(false);
                }
            },
            None => write.await.context("Failed to write response")?,
        }

        Ok(true)
    }

    fn parse_next(&mut self) -> ConnectionState {
        match parse_http_request_with_limits(&self.inbound, &self.limits) {
            Ok((request, consumed)) => {
                // Remove consumed bytes, keep anything pipelined after them
                self.inbound.advance(consumed);
                debug!(
                    method = %request.method,
                    path = %request.path,
                    consumed,
                    leftover = self.inbound.len(),
                    "Request parsed"
                );
                ConnectionState::Dispatching(request)
            }

            Err(ParseError::Incomplete) => ConnectionState::Reading,

            Err(e) => {
                warn!(error = %e, "Rejecting request");
                self.inbound.clear();
                Self::reject(e.status())
            }
        }
    }

    fn reject(status: StatusCode) -> ConnectionState {
        let mut response = Response::error(status);
        response.headers.insert("Connection", "close");
        ConnectionState::Writing(ResponseWriter::new(&response))
    }
}
