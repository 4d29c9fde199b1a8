use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::Response;

const HTTP_VERSION: &str = "HTTP/1.1";

/// Serializes a response into wire bytes.
///
/// Headers are written in insertion order. `Content-Length` is always
/// written last and computed from the body actually being sent, so a stale
/// header value can never reach the client.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + resp.body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in resp.headers.iter() {
        if k.eq_ignore_ascii_case("Content-Length") {
            continue;
        }
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(format!("Content-Length: {}\r\n", resp.body.len()).as_bytes());

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    // Body
    buf.extend_from_slice(&resp.body);

    buf
}

/// Outbound buffer of one serialized response plus a write cursor.
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
    close: bool,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
            close: response.closes_connection(),
        }
    }

    /// Whether the connection ends once this response is sent.
    pub fn closes_connection(&self) -> bool {
        self.close
    }

    /// Writes until the buffer is drained. A short write only suspends the
    /// calling task until the socket is writable again.
    pub async fn write_to_stream<S>(&mut self, stream: &mut S) -> anyhow::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream
                .write(&self.buffer[self.written..])
                .await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
