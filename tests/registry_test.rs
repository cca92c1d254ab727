//! Integration tests for the session registry lifecycle.

use async_trait::async_trait;
use btserial::{
    BoxedStream, DeviceId, Error, SessionEvent, SessionInterface, SessionRegistry, TextEncoding,
    TransportConnector,
};
use parking_lot::Mutex;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{duplex, AsyncRead, AsyncWrite, DuplexStream, ReadBuf};

const MAC: &str = "AA:BB:CC:DD:EE:FF";

/// Stream whose shutdown always fails, to exercise swallowed close errors.
struct FailingShutdown(DuplexStream);

impl AsyncRead for FailingShutdown {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for FailingShutdown {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "socket already gone")))
    }
}

/// What the test connector hands back.
#[derive(Clone, Copy, PartialEq)]
enum Mode {
    /// Peer end is parked and never read.
    Silent,
    /// Like `Silent`, with a pipe small enough to stall writers quickly.
    Stalled,
    /// Peer end echoes every byte back.
    Loopback,
    /// Stream fails on shutdown.
    FailingClose,
    /// Connect fails with the given error kind.
    Fail(io::ErrorKind),
}

struct TestConnector {
    mode: Mode,
    delay: Duration,
    calls: AtomicUsize,
    peers: Mutex<Vec<DuplexStream>>,
}

impl TestConnector {
    fn new(mode: Mode) -> Arc<Self> {
        Self::with_delay(mode, Duration::ZERO)
    }

    fn with_delay(mode: Mode, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            mode,
            delay,
            calls: AtomicUsize::new(0),
            peers: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportConnector for TestConnector {
    async fn connect(&self, _id: &DeviceId) -> io::Result<BoxedStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let capacity = if self.mode == Mode::Stalled { 16 } else { 1024 };
        let (client, server) = duplex(capacity);
        match self.mode {
            Mode::Silent | Mode::Stalled => {
                self.peers.lock().push(server);
                Ok(Box::new(client))
            }
            Mode::Loopback => {
                tokio::spawn(async move {
                    let (mut rd, mut wr) = tokio::io::split(server);
                    let _ = tokio::io::copy(&mut rd, &mut wr).await;
                });
                Ok(Box::new(client))
            }
            Mode::FailingClose => {
                self.peers.lock().push(server);
                Ok(Box::new(FailingShutdown(client)))
            }
            Mode::Fail(kind) => Err(io::Error::new(kind, "simulated failure")),
        }
    }
}

#[tokio::test]
async fn test_cached_session_ignores_other_connector() {
    let registry = SessionRegistry::default();
    let first = TestConnector::new(Mode::Silent);
    let other = TestConnector::new(Mode::Silent);

    let a = registry.open(MAC, first.clone()).await.unwrap();
    let b = registry.open(MAC, other.clone()).await.unwrap();

    assert_eq!(first.calls(), 1);
    assert_eq!(other.calls(), 0);
    assert!(Arc::ptr_eq(&a, &b));
}

#[tokio::test]
async fn test_reopen_after_close_connects_again() {
    let registry = SessionRegistry::default();
    let connector = TestConnector::new(Mode::Silent);

    let first = registry.open(MAC, connector.clone()).await.unwrap();
    registry.close(MAC).await;

    assert!(!registry.contains(MAC));
    assert!(!first.is_open());

    let second = registry.open(MAC, connector.clone()).await.unwrap();
    assert_eq!(connector.calls(), 2);
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.is_open());
}

#[tokio::test]
async fn test_close_unknown_is_noop() {
    let registry = SessionRegistry::default();
    let connector = TestConnector::new(Mode::Silent);
    registry.open("known", connector).await.unwrap();

    registry.close("never-opened").await;
    registry.close(&DeviceId::from("never-opened")).await;

    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_close_swallows_close_error() {
    let registry = SessionRegistry::default();
    let session = registry
        .open(MAC, TestConnector::new(Mode::FailingClose))
        .await
        .unwrap();

    registry.close(&session).await;

    assert!(registry.is_empty());
    assert!(!session.is_open());
}

#[tokio::test]
async fn test_close_all_continues_past_failures() {
    let registry = SessionRegistry::default();
    let silent = TestConnector::new(Mode::Silent);
    let failing = TestConnector::new(Mode::FailingClose);

    let sessions = vec![
        registry.open("dev-1", silent.clone()).await.unwrap(),
        registry.open("dev-2", failing.clone()).await.unwrap(),
        registry.open("dev-3", silent.clone()).await.unwrap(),
    ];
    assert_eq!(registry.len(), 3);

    registry.close_all().await;

    assert!(registry.is_empty());
    for session in &sessions {
        assert!(!session.is_open(), "{} was not closed", session.id());
    }
}

#[tokio::test]
async fn test_close_all_interrupts_stalled_write() {
    let registry = SessionRegistry::default();
    // Keeps the unread peer end alive for the whole test.
    let connector = TestConnector::new(Mode::Stalled);
    let session = registry.open(MAC, connector.clone()).await.unwrap();

    let writer = {
        let session = session.clone();
        tokio::spawn(async move { session.write_bytes(&[0u8; 1024]).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!writer.is_finished());

    tokio::time::timeout(Duration::from_secs(2), registry.close_all())
        .await
        .expect("close_all must not wait for a stalled write");

    assert!(registry.is_empty());
    assert!(!session.is_open());

    let err = tokio::time::timeout(Duration::from_secs(2), writer)
        .await
        .expect("stalled write should be woken")
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::WriteFailed { .. }));
    assert_eq!(err.io_error().kind(), io::ErrorKind::NotConnected);
}

#[tokio::test]
async fn test_loopback_roundtrip() {
    let registry = SessionRegistry::default();
    let session = registry
        .open(MAC, TestConnector::new(Mode::Loopback))
        .await
        .unwrap();

    session.write_line("hello").await.unwrap();
    assert_eq!(session.read_line().await.unwrap().as_deref(), Some("hello"));

    session.write_line("héllo ✓ 日本").await.unwrap();
    assert_eq!(
        session.read_line().await.unwrap().as_deref(),
        Some("héllo ✓ 日本")
    );

    registry.close_all().await;
}

#[tokio::test]
async fn test_loopback_latin1_roundtrip() {
    let registry = SessionRegistry::default();
    let session = registry
        .open_with_encoding(MAC, TestConnector::new(Mode::Loopback), TextEncoding::Latin1)
        .await
        .unwrap();

    session.write_line("café").await.unwrap();
    assert_eq!(session.read_line().await.unwrap().as_deref(), Some("café"));
}

#[tokio::test]
async fn test_connect_timeout_reports_connection_failed() {
    let registry = SessionRegistry::default();
    let connector = TestConnector::new(Mode::Fail(io::ErrorKind::TimedOut));

    let err = registry.open(MAC, connector.clone()).await.unwrap_err();

    assert!(matches!(err, Error::ConnectionFailed { .. }));
    assert_eq!(err.device_id().as_str(), MAC);
    assert_eq!(err.io_error().kind(), io::ErrorKind::TimedOut);
    assert!(!registry.contains(MAC));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_concurrent_opens_share_one_connect() {
    let registry = SessionRegistry::default();
    let connector = TestConnector::with_delay(Mode::Silent, Duration::from_millis(50));

    let (a, b) = tokio::join!(
        registry.open(MAC, connector.clone()),
        registry.open(MAC, connector.clone()),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(connector.calls(), 1);
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_concurrent_failure_is_delivered_to_all_waiters() {
    let registry = SessionRegistry::default();
    let connector = TestConnector::with_delay(
        Mode::Fail(io::ErrorKind::ConnectionRefused),
        Duration::from_millis(50),
    );

    let (a, b) = tokio::join!(
        registry.open(MAC, connector.clone()),
        registry.open(MAC, connector.clone()),
    );

    assert!(matches!(a, Err(Error::ConnectionFailed { .. })));
    assert!(matches!(b, Err(Error::ConnectionFailed { .. })));
    assert_eq!(connector.calls(), 1);

    // Failures are not cached; the next open tries again.
    assert!(registry.open(MAC, connector.clone()).await.is_err());
    assert_eq!(connector.calls(), 2);
}

#[tokio::test]
async fn test_abandoned_open_still_caches_session() {
    let registry = SessionRegistry::default();
    let connector = TestConnector::with_delay(Mode::Silent, Duration::from_millis(50));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(5), registry.open(MAC, connector.clone())).await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert!(registry.contains(MAC));
    let session = registry.open(MAC, connector.clone()).await.unwrap();
    assert!(session.is_open());
    assert_eq!(connector.calls(), 1);
}

#[tokio::test]
async fn test_list_candidates_uses_provider() {
    let devices = vec![DeviceId::from("11:11:11:11:11:11"), DeviceId::from(MAC)];
    let registry = SessionRegistry::new(devices.clone());

    assert_eq!(registry.list_candidates().await.unwrap(), devices);
    assert!(SessionRegistry::default()
        .list_candidates()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_interface_over_registry_session() {
    let registry = SessionRegistry::default();
    let session = registry
        .open(MAC, TestConnector::new(Mode::Loopback))
        .await
        .unwrap();
    let (interface, mut events) = SessionInterface::spawn(session, 8);

    interface.send_message("ping").await.unwrap();

    let mut seen = Vec::new();
    while seen.len() < 2 {
        seen.push(events.recv().await.unwrap());
    }
    assert!(seen.contains(&SessionEvent::MessageSent("ping".to_string())));
    assert!(seen.contains(&SessionEvent::MessageReceived("ping".to_string())));

    registry.close(&interface).await;
    assert!(registry.is_empty());
    assert!(!interface.session().is_open());
}
