//! Integration tests for the HTTP stream adapter
//!
//! These tests verify that:
//! 1. The stream request carries the feed protocol headers and credentials
//! 2. The body is handed over untouched until the server closes the stream
//! 3. Non-success statuses and unreachable hosts map to the right fault classes

use std::time::Duration;

use firehose_domain::{ChunkSource, FaultClass, StreamConnector};
use firehose_http::{HttpStreamConfig, HttpStreamConnector};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

/// Serve one canned response and report the request head that was received
async fn serve_once(response: Vec<u8>) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let _ = tx.send(String::from_utf8_lossy(&request).to_string());
        socket.write_all(&response).await.unwrap();
        socket.shutdown().await.unwrap();
    });

    (format!("http://{}/stream/track.json", addr), rx)
}

fn connector(url: String) -> HttpStreamConnector {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut config = HttpStreamConfig::new(url, "user", "pass");
    config.keep_alive = Duration::from_secs(2);
    HttpStreamConnector::new(config).expect("Failed to build connector")
}

#[tokio::test]
async fn test_streams_body_until_close() {
    let body = b"{\"id\":1}\r\n{\"id\":2}\r\n";
    let mut response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    let (url, request) = serve_once(response).await;

    let connector = connector(url);
    let mut source = connector.connect().await.expect("Failed to connect");

    let mut received = Vec::new();
    loop {
        let chunk = source.next_chunk().await.expect("Read failed");
        if chunk.is_empty() {
            break;
        }
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, body);

    // A closed source keeps reporting a clean close.
    source.close();
    assert!(source.next_chunk().await.unwrap().is_empty());

    let head = request.await.unwrap().to_lowercase();
    assert!(head.starts_with("get /stream/track.json http/1.1"));
    assert!(head.contains("accept: application/json"));
    assert!(head.contains("accept-encoding: gzip"));
    assert!(head.contains("connection: keep-alive"));
    // base64("user:pass")
    assert!(head.contains("authorization: basic dxnlcjpwyxnz"));
}

#[tokio::test]
async fn test_unauthorized_is_http_fault() {
    let response = b"HTTP/1.1 401 Unauthorized\r\nContent-Length: 0\r\n\r\n".to_vec();
    let (url, _request) = serve_once(response).await;

    let err = match connector(url).connect().await {
        Ok(_) => panic!("401 must not open a stream"),
        Err(err) => err,
    };
    assert_eq!(err.fault_class(), FaultClass::Http);
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_truncated_body_is_protocol_fault() {
    let response =
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n10\r\n{\"id\":1}".to_vec();
    let (url, _request) = serve_once(response).await;

    let mut source = connector(url).connect().await.expect("Failed to connect");
    let mut fault = None;
    for _ in 0..4 {
        match source.next_chunk().await {
            Ok(chunk) if chunk.is_empty() => break,
            Ok(_) => continue,
            Err(err) => {
                fault = Some(err.fault_class());
                break;
            }
        }
    }
    assert_eq!(fault, Some(FaultClass::IncompleteRead));
}

#[tokio::test]
async fn test_unreachable_host_is_connection_fault() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = match connector(format!("http://{}/stream", addr)).connect().await {
        Ok(_) => panic!("nothing is listening"),
        Err(err) => err,
    };
    assert_eq!(err.fault_class(), FaultClass::Connection);
}

#[tokio::test]
async fn test_invalid_url_is_connection_fault() {
    let err = match connector("not a url".to_string()).connect().await {
        Ok(_) => panic!("URL must be rejected"),
        Err(err) => err,
    };
    assert_eq!(err.fault_class(), FaultClass::Connection);
}
