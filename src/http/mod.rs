//! HTTP protocol implementation.
//!
//! This module implements the subset of HTTP/1.1 the server speaks: one
//! request line, `Name: Value` headers, and a body framed only by
//! `Content-Length`. Chunked transfer coding is not supported and is
//! rejected with `501 Not Implemented`.
//!
//! # Architecture
//!
//! - **`connection`**: per-client state machine, inbound buffer and pipelining
//! - **`parser`**: parses one request from the front of a byte buffer
//! - **`headers`**: ordered, case-insensitive header map
//! - **`request`**: HTTP request representation
//! - **`response`**: HTTP response representation with builder pattern
//! - **`encoding`**: gzip content negotiation
//! - **`writer`**: serializes and writes responses to the client
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Wait for incoming bytes
//!        └──────┬──────┘
//!               │ bytes appended
//!               ▼
//!        ┌─────────────┐  Incomplete → Reading
//!        │   Parsing   │  Error      → Writing (4xx/5xx, then Closed)
//!        └──────┬──────┘
//!               │ Request parsed, consumed bytes dropped
//!               ▼
//!        ┌─────────────┐
//!        │ Dispatching │ ← Router + content negotiation
//!        └──────┬──────┘
//!               ▼
//!        ┌─────────────┐
//!        │   Writing   │ ← Drain the outbound buffer
//!        └──────┬──────┘
//!               ├─ Connection: close  → Closed
//!               ├─ bytes left over    → Parsing (pipelined request)
//!               └─ otherwise          → Reading
//! ```

pub mod connection;
pub mod encoding;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
