//! Listening socket and connection multiplexing.

pub mod listener;

pub use listener::Server;
