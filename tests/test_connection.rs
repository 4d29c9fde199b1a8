mod common;

use std::sync::Arc;
use std::time::Duration;

use beacon::http::connection::Connection;
use beacon::http::parser::ParseLimits;
use beacon::router::Router;
use beacon::router::files::FileStore;
use common::{WireResponse, split_responses};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

fn router() -> (TempDir, Arc<Router>) {
    let dir = tempfile::tempdir().unwrap();
    let router = Router::new(FileStore::new(dir.path()).unwrap());
    (dir, Arc::new(router))
}

/// Feeds `chunks` to a connection one write at a time, closes the client's
/// write side and returns everything the server sent.
async fn exchange(
    mut conn: Connection<DuplexStream>,
    client: DuplexStream,
    chunks: Vec<Vec<u8>>,
) -> Vec<WireResponse> {
    let server = tokio::spawn(async move { conn.run().await });
    let (mut rd, mut wr) = tokio::io::split(client);

    let writer = async move {
        for chunk in chunks {
            // The server may close first; later writes failing is expected.
            if wr.write_all(&chunk).await.is_err() {
                return;
            }
            let _ = wr.flush().await;
            tokio::task::yield_now().await;
        }
        let _ = wr.shutdown().await;
    };
    let reader = async move {
        let mut out = Vec::new();
        rd.read_to_end(&mut out).await.unwrap();
        out
    };

    let ((), raw) = tokio::join!(writer, reader);
    server.await.unwrap().unwrap();
    split_responses(&raw)
}

async fn serve(chunks: Vec<Vec<u8>>) -> Vec<WireResponse> {
    let (_dir, router) = router();
    let (client, server) = tokio::io::duplex(64 * 1024);
    exchange(Connection::new(server, router), client, chunks).await
}

#[tokio::test]
async fn test_single_request_then_peer_close() {
    let responses = serve(vec![b"GET /echo/hello HTTP/1.1\r\n\r\n".to_vec()]).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, 200);
    assert_eq!(responses[0].body, b"hello");
    assert_eq!(responses[0].header("Content-Length"), Some("5"));
}

#[tokio::test]
async fn test_pipelined_requests_answered_in_order() {
    let responses = serve(vec![
        b"GET /echo/one HTTP/1.1\r\n\r\nGET /echo/two HTTP/1.1\r\n\r\nGET /missing HTTP/1.1\r\n\r\n"
            .to_vec(),
    ])
    .await;

    let statuses: Vec<u16> = responses.iter().map(|r| r.status).collect();
    assert_eq!(statuses, vec![200, 200, 404]);
    assert_eq!(responses[0].body, b"one");
    assert_eq!(responses[1].body, b"two");
}

#[tokio::test]
async fn test_request_split_across_reads() {
    let request = b"GET /user-agent HTTP/1.1\r\nUser-Agent: test-agent/1.0\r\n\r\n";
    let chunks = request.iter().map(|b| vec![*b]).collect();

    let responses = serve(chunks).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].body, b"test-agent/1.0");
}

#[tokio::test]
async fn test_pipelined_body_boundary_split_across_reads() {
    let (dir, router) = router();
    let (client, server) = tokio::io::duplex(64 * 1024);

    let responses = exchange(
        Connection::new(server, router),
        client,
        vec![
            b"POST /files/note.txt HTTP/1.1\r\nContent-Length: 3\r\n\r\na".to_vec(),
            b"bcGET /files/note.txt HTTP/1.1\r\n".to_vec(),
            b"\r\n".to_vec(),
        ],
    )
    .await;

    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].status, 201);
    assert_eq!(responses[1].status, 200);
    assert_eq!(responses[1].body, b"abc");
    assert_eq!(std::fs::read(dir.path().join("note.txt")).unwrap(), b"abc");
}

#[tokio::test]
async fn test_short_writes_deliver_whole_response() {
    let (_dir, router) = router();
    // A tiny pipe forces every response write to be partial.
    let (client, server) = tokio::io::duplex(7);
    let text = "x".repeat(500);

    let responses = exchange(
        Connection::new(server, router),
        client,
        vec![format!("GET /echo/{} HTTP/1.1\r\n\r\n", text).into_bytes()],
    )
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].body, text.as_bytes());
}

#[tokio::test]
async fn test_malformed_request_gets_400_and_close() {
    let responses = serve(vec![
        b"NONSENSE\r\n\r\nGET /echo/after HTTP/1.1\r\n\r\n".to_vec(),
    ])
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, 400);
    assert_eq!(responses[0].header("Connection"), Some("close"));
}

#[tokio::test]
async fn test_unsupported_method_gets_501() {
    let responses = serve(vec![b"DELETE /files/a HTTP/1.1\r\n\r\n".to_vec()]).await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, 501);
}

#[tokio::test]
async fn test_connection_close_stops_after_response() {
    let responses = serve(vec![
        b"GET /echo/first HTTP/1.1\r\nConnection: close\r\n\r\nGET /echo/second HTTP/1.1\r\n\r\n"
            .to_vec(),
    ])
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].body, b"first");
    assert_eq!(responses[0].header("Connection"), Some("close"));
}

#[tokio::test]
async fn test_http10_closes_by_default() {
    let responses = serve(vec![
        b"GET / HTTP/1.0\r\n\r\nGET / HTTP/1.0\r\n\r\n".to_vec(),
    ])
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].body, b"Hello, World!");
}

#[tokio::test]
async fn test_peer_close_mid_request_gets_400() {
    let responses = serve(vec![
        b"POST /files/a HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc".to_vec(),
    ])
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, 400);
}

#[tokio::test]
async fn test_oversized_body_rejected_with_413() {
    let (_dir, router) = router();
    let (client, server) = tokio::io::duplex(64 * 1024);
    let conn = Connection::new(server, router).with_limits(ParseLimits {
        max_header_bytes: 1024,
        max_body_bytes: 8,
    });

    let responses = exchange(
        conn,
        client,
        vec![b"POST /files/a HTTP/1.1\r\nContent-Length: 9\r\n\r\n123456789".to_vec()],
    )
    .await;

    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].status, 413);
}

#[tokio::test]
async fn test_idle_timeout_closes_silent_connection() {
    let (_dir, router) = router();
    let (mut client, server) = tokio::io::duplex(1024);
    let mut conn = Connection::new(server, router)
        .with_idle_timeout(Some(Duration::from_millis(50)));

    let result = tokio::time::timeout(Duration::from_secs(5), conn.run())
        .await
        .expect("connection closes on its own");
    assert!(result.is_ok());
    drop(conn);

    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_idle_timeout_covers_stalled_write() {
    let (dir, router) = router();
    std::fs::write(dir.path().join("big.bin"), vec![7u8; 16 * 1024]).unwrap();

    // The response is far larger than the pipe and the client never reads it.
    let (mut client, server) = tokio::io::duplex(1024);
    client
        .write_all(b"GET /files/big.bin HTTP/1.1\r\n\r\n")
        .await
        .unwrap();
    let mut conn = Connection::new(server, router)
        .with_idle_timeout(Some(Duration::from_millis(50)));

    let result = tokio::time::timeout(Duration::from_secs(5), conn.run())
        .await
        .expect("stalled write gives up after the idle timeout");
    assert!(result.is_ok());
}
