//! Helpers shared by the connection and server tests.

#![allow(dead_code)]

use std::io::Read;

use flate2::read::GzDecoder;

/// A response read back off the wire.
#[derive(Debug)]
pub struct WireResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl WireResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Splits a byte stream into consecutive `Content-Length` framed responses.
pub fn split_responses(mut buf: &[u8]) -> Vec<WireResponse> {
    let mut out = Vec::new();

    while !buf.is_empty() {
        let head_end = buf
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("response head is terminated");
        let head = std::str::from_utf8(&buf[..head_end]).expect("utf-8 head");
        let mut lines = head.split("\r\n");

        let status_line = lines.next().unwrap();
        let mut parts = status_line.splitn(3, ' ');
        assert_eq!(parts.next(), Some("HTTP/1.1"));
        let status = parts.next().unwrap().parse().unwrap();

        let headers: Vec<(String, String)> = lines
            .map(|l| {
                let (k, v) = l.split_once(": ").unwrap();
                (k.to_string(), v.to_string())
            })
            .collect();

        let len: usize = headers
            .iter()
            .find(|(k, _)| k == "Content-Length")
            .map(|(_, v)| v.parse().unwrap())
            .expect("Content-Length is always present");

        let body_start = head_end + 4;
        let body = buf[body_start..body_start + len].to_vec();
        buf = &buf[body_start + len..];

        out.push(WireResponse {
            status,
            headers,
            body,
        });
    }

    out
}

pub fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).unwrap();
    out
}
