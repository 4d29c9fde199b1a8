//! Beacon - a small event-driven HTTP/1.1 server
//!
//! Core library for request parsing, routing and connection handling.

pub mod config;
pub mod http;
pub mod router;
pub mod server;
