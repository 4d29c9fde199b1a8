//! Response body content negotiation.
//!
//! Only `gzip` is offered. The request's `Accept-Encoding` value is split
//! into comma-separated tokens and each token is compared exactly, so
//! `x-gzip-foo` never selects gzip.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::warn;

use crate::http::request::Request;
use crate::http::response::Response;

pub const GZIP: &str = "gzip";

/// Returns true when an `Accept-Encoding` header value accepts gzip.
///
/// Parameters such as `;q=0.5` are ignored except for `q=0`, which is an
/// explicit refusal.
pub fn accepts_gzip(accept_encoding: &str) -> bool {
    accept_encoding.split(',').any(|item| {
        let mut params = item.split(';');
        let token = params.next().unwrap_or_default().trim();
        if !token.eq_ignore_ascii_case(GZIP) {
            return false;
        }
        !params.any(|p| is_zero_quality(p.trim()))
    })
}

fn is_zero_quality(param: &str) -> bool {
    match param.split_once('=') {
        Some((name, value)) if name.trim().eq_ignore_ascii_case("q") => {
            value.trim().parse::<f32>().is_ok_and(|q| q == 0.0)
        }
        _ => false,
    }
}

/// Compresses `data` into a complete gzip member.
pub fn gzip(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(data.len() / 2 + 32),
        Compression::default(),
    );
    encoder.write_all(data)?;
    encoder.finish()
}

/// Applies gzip to `response` when `request` asks for it and there is a body.
///
/// `Content-Length` is recomputed from the encoded bytes. If compression
/// fails the identity body is kept.
pub fn negotiate(request: &Request, response: &mut Response) {
    if response.body.is_empty() || response.headers.contains("Content-Encoding") {
        return;
    }

    let wanted = request
        .header("Accept-Encoding")
        .is_some_and(accepts_gzip);
    if !wanted {
        return;
    }

    match gzip(&response.body) {
        Ok(encoded) => {
            response.headers.insert("Content-Encoding", GZIP);
            response.set_body(encoded);
        }
        Err(e) => {
            warn!(error = %e, path = %request.path, "gzip encoding failed, sending identity body");
        }
    }
}
