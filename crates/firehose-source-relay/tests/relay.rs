use std::sync::Arc;
use std::time::Duration;

use firehose_core::{RawEvent, SourceError, StreamSource, Subscription};
use firehose_source_relay::{RelayEndpoint, RelaySource, RelaySourceConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::mpsc;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

// ── Test Helpers ──

fn fast_config(endpoint: RelayEndpoint) -> RelaySourceConfig {
    RelaySourceConfig {
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
        ..RelaySourceConfig::new(endpoint)
    }
}

fn collect_events(source: &RelaySource) -> (Subscription, mpsc::UnboundedReceiver<RawEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = source.subscribe(Arc::new(move |event: &RawEvent| {
        let _ = tx.send(event.clone());
    }));
    (sub, rx)
}

fn collect_errors(source: &RelaySource) -> (Subscription, mpsc::UnboundedReceiver<SourceError>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = source.on_error(Arc::new(move |error: &SourceError| {
        // SourceError is not Clone; keep enough to assert on.
        let copy = match error {
            SourceError::Connect { endpoint, detail } => SourceError::Connect {
                endpoint: endpoint.clone(),
                detail: detail.clone(),
            },
            SourceError::Decode(e) => SourceError::Transport(format!("decode: {e}")),
            other => SourceError::Transport(other.to_string()),
        };
        let _ = tx.send(copy);
    }));
    (sub, rx)
}

fn collect_status(source: &RelaySource) -> (Subscription, mpsc::UnboundedReceiver<bool>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sub = source
        .on_status_change(Arc::new(move |connected: &bool| {
            let _ = tx.send(*connected);
        }))
        .expect("relay source pushes status");
    (sub, rx)
}

async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting")
        .expect("channel closed")
}

// ── Unix Socket ──

#[tokio::test]
async fn delivers_ndjson_lines_from_unix_socket() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("relay.sock");
    let listener = UnixListener::bind(&path).expect("bind");

    let (release_tx, mut release_rx) = mpsc::unbounded_channel::<()>();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        stream
            .write_all(
                concat!(
                    r#"{"session_id":"s1","event_id":"b1","event_type":"chunk","timestamp":999999999}"#,
                    "\n\n",
                    r#"{"session_id":"s1","event_id":"b2","event_type":"heartbeat"}"#,
                    "\n",
                )
                .as_bytes(),
            )
            .await
            .expect("write");
        // Hold the connection until the test is done with it.
        let _ = release_rx.recv().await;
    });

    let source = RelaySource::new(fast_config(RelayEndpoint::Unix(path)));
    let (_events_sub, mut events) = collect_events(&source);
    let (_status_sub, mut status) = collect_status(&source);
    source.start().expect("start");

    assert!(next(&mut status).await);
    let first = next(&mut events).await;
    assert_eq!(first.event_id, "b1");
    assert_eq!(first.timestamp, Some(999_999_999));
    assert!(next(&mut events).await.is_heartbeat());
    assert!(source.is_connected());

    source.shutdown();
    assert!(!source.is_connected());
    drop(release_tx);
}

#[tokio::test]
async fn undecodable_line_is_reported_and_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("relay.sock");
    let listener = UnixListener::bind(&path).expect("bind");

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        stream
            .write_all(b"not json\n{\"event_id\":\"b1\",\"event_type\":\"chunk\"}\n")
            .await
            .expect("write");
        tokio::time::sleep(WAIT).await;
    });

    let source = RelaySource::new(fast_config(RelayEndpoint::Unix(path)));
    let (_events_sub, mut events) = collect_events(&source);
    let (_errors_sub, mut errors) = collect_errors(&source);
    source.start().expect("start");

    let err = next(&mut errors).await;
    assert!(err.to_string().contains("decode"), "{err}");
    assert_eq!(next(&mut events).await.event_id, "b1");
}

#[tokio::test]
async fn missing_socket_reports_connect_error_and_retries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.sock");

    let source = RelaySource::new(fast_config(RelayEndpoint::Unix(path)));
    let (_errors_sub, mut errors) = collect_errors(&source);
    source.start().expect("start");

    for _ in 0..2 {
        let err = next(&mut errors).await;
        assert!(matches!(err, SourceError::Connect { .. }), "{err}");
    }
    assert!(!source.is_connected());
}

// ── TCP ──

#[tokio::test]
async fn reconnects_after_relay_restart_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");

    tokio::spawn(async move {
        for id in ["b1", "b2"] {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let line = format!("{{\"event_id\":\"{id}\",\"event_type\":\"chunk\"}}\n");
            stream.write_all(line.as_bytes()).await.expect("write");
            if id == "b2" {
                tokio::time::sleep(WAIT).await;
            }
        }
    });

    let source = RelaySource::new(fast_config(RelayEndpoint::Tcp(addr.to_string())));
    let (_events_sub, mut events) = collect_events(&source);
    let (_status_sub, mut status) = collect_status(&source);
    source.start().expect("start");

    assert_eq!(next(&mut events).await.event_id, "b1");
    assert_eq!(next(&mut events).await.event_id, "b2");
    let transitions = vec![
        next(&mut status).await,
        next(&mut status).await,
        next(&mut status).await,
    ];
    assert_eq!(transitions, [true, false, true]);
}

#[tokio::test]
async fn start_after_shutdown_is_rejected() {
    let source = RelaySource::new(fast_config(RelayEndpoint::Tcp("127.0.0.1:1".into())));
    source.shutdown();
    assert!(matches!(source.start(), Err(SourceError::Closed(_))));
}
