//! Client protocol behavior against misbehaving endpoints.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::UnixListener;
use tokio_util::codec::{Framed, LinesCodec};

use filed::client::{self, CallConfig, CallError};

fn call_config(socket: &Path, retries: u32, timeout_ms: u64) -> CallConfig {
    CallConfig {
        socket: socket.to_path_buf(),
        delimiter: "|".to_string(),
        retries,
        timeout: Duration::from_millis(timeout_ms),
        verbose: false,
    }
}

#[tokio::test]
async fn offline_after_exhausting_retries() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("silent.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    // Accept and hold every connection, never answering.
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(stream);
        }
    });

    let config = call_config(&socket, 3, 100);
    let err = client::call("status", &config).await.unwrap_err();
    assert!(matches!(err, CallError::Offline));
    assert_eq!(
        err.to_string(),
        "server seems to be offline, abandoning"
    );

    // one connection per attempt: the initial try plus two retries
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn recovers_when_server_replies_on_second_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("flaky.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    tokio::spawn(async move {
        // First attempt: swallow the request, never reply. Holding the
        // stream keeps the client waiting until its timeout.
        let (first, _) = listener.accept().await.unwrap();
        let mut first = Framed::new(first, LinesCodec::new());
        let _swallowed = first.next().await;

        // Second attempt: answer properly.
        let (second, _) = listener.accept().await.unwrap();
        let mut second = Framed::new(second, LinesCodec::new());
        let request = second.next().await.unwrap().unwrap();
        assert_eq!(request, "status");
        second.send("true|pong").await.unwrap();

        // keep the first connection alive past the client's decision
        let _hold = first;
        tokio::time::sleep(Duration::from_secs(1)).await;
    });

    let config = call_config(&socket, 3, 150);
    let message = client::call("status", &config).await.unwrap();
    assert_eq!(message, "pong");
}

#[tokio::test]
async fn remote_failure_is_not_retried() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("failing.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            let mut framed = Framed::new(stream, LinesCodec::new());
            if framed.next().await.is_some() {
                let _ = framed.send("false|no such file").await;
            }
        }
    });

    let config = call_config(&socket, 3, 500);
    let err = client::call("rm|false|false|/gone", &config).await.unwrap_err();
    match err {
        CallError::Remote(message) => assert_eq!(message, "no such file"),
        other => panic!("expected a remote error, got {other}"),
    }
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_socket_reports_offline() {
    let dir = tempfile::tempdir().unwrap();
    let config = call_config(&dir.path().join("nowhere.sock"), 2, 50);
    let err = client::call("status", &config).await.unwrap_err();
    assert!(matches!(err, CallError::Offline));
}

#[tokio::test]
async fn multi_chunk_reply_joins_with_newlines() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("chunky.sock");
    let listener = UnixListener::bind(&socket).unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, LinesCodec::new());
        let _ = framed.next().await;
        framed.send("true|one|two").await.unwrap();
    });

    let config = call_config(&socket, 3, 500);
    assert_eq!(client::call("status", &config).await.unwrap(), "one\ntwo");
}
