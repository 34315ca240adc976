use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use upd_liveness::LivenessHandle;
use upd_model::{Clock, MockClock};
use upd_node::{
    HandshakeEvent, HandshakeFeed, JournalStore, Monitor, MonitorConfig, Notifier, NotifyError,
    PeerConfig, PeerId, Timestamp, TrackerConfig, Transition, WriterConfig,
};

const P1: PeerId = PeerId([1u8; 32]);
const P2: PeerId = PeerId([2u8; 32]);

/// Announces each call, then never returns.
struct StuckNotifier {
    tx: mpsc::UnboundedSender<(PeerId, Transition)>,
}

#[async_trait]
impl Notifier for StuckNotifier {
    async fn notify(&self, peer: &PeerConfig, transition: Transition) -> Result<(), NotifyError> {
        let _ = self.tx.send((peer.public_key, transition));
        std::future::pending().await
    }
}

/// Forwards every notification to a channel, optionally failing afterwards.
struct RecordingNotifier {
    tx: mpsc::UnboundedSender<(PeerId, Transition)>,
    fail: bool,
}

impl RecordingNotifier {
    fn new(fail: bool) -> (Self, mpsc::UnboundedReceiver<(PeerId, Transition)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail }, rx)
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, peer: &PeerConfig, transition: Transition) -> Result<(), NotifyError> {
        let _ = self.tx.send((peer.public_key, transition));
        if self.fail {
            return Err(NotifyError::Script("always fails".into()));
        }
        Ok(())
    }
}

fn peer_config(key: PeerId) -> PeerConfig {
    PeerConfig {
        public_key: key,
        ip_address: "10.1.0.1".into(),
        port: 51820,
        keep_alive: 25,
    }
}

fn fast_config(window: Duration) -> MonitorConfig {
    MonitorConfig {
        sweep_interval: Duration::from_millis(20),
        writer: WriterConfig { window, ..Default::default() },
        tracker: TrackerConfig::default(),
    }
}

fn handshake(at: Timestamp, peer: PeerId) -> HandshakeEvent {
    HandshakeEvent::new(at, peer, Duration::from_millis(4))
}

async fn next_note(
    rx: &mut mpsc::UnboundedReceiver<(PeerId, Transition)>,
) -> (PeerId, Transition) {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("notifier dropped")
}

async fn wait_until_seeded(liveness: &LivenessHandle, peer: PeerId) {
    timeout(Duration::from_secs(5), async {
        while !matches!(liveness.state(peer).await, Ok(Some(_))) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("monitor never seeded liveness");
}

#[tokio::test]
async fn test_inactive_then_active_again() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JournalStore::open(dir.path()).unwrap());
    let clock = MockClock::new(Timestamp::from_secs(1_000));
    let (notifier, mut notes) = RecordingNotifier::new(false);

    let monitor = Monitor::new(
        store.clone(),
        vec![peer_config(P1), peer_config(P2)],
        Arc::new(notifier),
        Arc::new(clock.clone()),
        fast_config(Duration::from_millis(50)),
    );
    let mut reports = monitor.writer().subscribe();
    let cancel = monitor.shutdown_token();

    let (tx1, rx1) = mpsc::channel(16);
    let (_tx2, rx2) = mpsc::channel(16);
    let run = tokio::spawn(monitor.run(HashMap::from([(P1, rx1), (P2, rx2)])));

    tx1.send(handshake(clock.now(), P1)).await.unwrap();
    let report = timeout(Duration::from_secs(5), reports.recv()).await.unwrap().unwrap();
    assert_eq!(report.committed, 1);

    // Both peers silent past the threshold
    clock.advance(Duration::from_secs(300));
    let mut inactive = vec![next_note(&mut notes).await, next_note(&mut notes).await];
    inactive.sort_by_key(|(p, _)| *p);
    assert_eq!(
        inactive,
        vec![(P1, Transition::BecameInactive), (P2, Transition::BecameInactive)]
    );

    // Later sweeps stay quiet
    clock.advance(Duration::from_secs(20));
    assert!(timeout(Duration::from_millis(200), notes.recv()).await.is_err());

    tx1.send(handshake(clock.now(), P1)).await.unwrap();
    assert_eq!(next_note(&mut notes).await, (P1, Transition::BecameActive));

    cancel.cancel();
    run.await.unwrap().unwrap();
    assert_eq!(store.len().unwrap(), 2);
}

#[tokio::test]
async fn test_notifier_failure_does_not_stop_monitor() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JournalStore::open(dir.path()).unwrap());
    let clock = MockClock::new(Timestamp::from_secs(10));
    let (notifier, mut notes) = RecordingNotifier::new(true);

    let monitor = Monitor::new(
        store.clone(),
        vec![peer_config(P1)],
        Arc::new(notifier),
        Arc::new(clock.clone()),
        fast_config(Duration::from_millis(50)),
    );
    let liveness = monitor.liveness().clone();
    let cancel = monitor.shutdown_token();
    let (tx1, rx1) = mpsc::channel(16);
    let run = tokio::spawn(monitor.run(HashMap::from([(P1, rx1)])));
    wait_until_seeded(&liveness, P1).await;

    clock.advance(Duration::from_secs(241));
    assert_eq!(next_note(&mut notes).await, (P1, Transition::BecameInactive));

    tx1.send(handshake(clock.now(), P1)).await.unwrap();
    assert_eq!(next_note(&mut notes).await, (P1, Transition::BecameActive));

    cancel.cancel();
    run.await.unwrap().unwrap();
    assert_eq!(store.len().unwrap(), 1);
}

#[tokio::test]
async fn test_shutdown_flushes_open_window() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JournalStore::open(dir.path()).unwrap());
    let clock = MockClock::new(Timestamp::from_secs(100));
    let (notifier, _notes) = RecordingNotifier::new(false);

    // The window never closes on its own during the test
    let monitor = Monitor::new(
        store.clone(),
        vec![peer_config(P1)],
        Arc::new(notifier),
        Arc::new(clock.clone()),
        fast_config(Duration::from_secs(60)),
    );
    let liveness = monitor.liveness().clone();
    let cancel = monitor.shutdown_token();
    let (tx1, rx1) = mpsc::channel(16);
    let run = tokio::spawn(monitor.run(HashMap::from([(P1, rx1)])));
    wait_until_seeded(&liveness, P1).await;

    let at = Timestamp::from_secs(101);
    clock.set(at);
    tx1.send(handshake(at, P1)).await.unwrap();

    // Wait until the consumer has picked the event up
    timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(Some(state)) = liveness.state(P1).await {
                if state.last_active_at == at {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(store.is_empty().unwrap());

    cancel.cancel();
    run.await.unwrap().unwrap();
    let keys: Vec<_> = store.scan_all().unwrap().map(|r| r.unwrap().0).collect();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].timestamp, at);
    assert_eq!(keys[0].peer, P1);
}

#[tokio::test]
async fn test_feed_drives_journal() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JournalStore::open(dir.path()).unwrap());
    let clock = MockClock::new(Timestamp::from_secs(1));
    let (notifier, _notes) = RecordingNotifier::new(false);

    let mut feed = HandshakeFeed::new(Arc::new(clock.clone()), 16);
    let sources = HashMap::from([(P1, feed.register(P1)), (P2, feed.register(P2))]);

    let monitor = Monitor::new(
        store.clone(),
        vec![peer_config(P1), peer_config(P2)],
        Arc::new(notifier),
        Arc::new(clock.clone()),
        fast_config(Duration::from_millis(500)),
    );
    let mut reports = monitor.writer().subscribe();
    let cancel = monitor.shutdown_token();
    let run = tokio::spawn(monitor.run(sources));

    // P2 reported before P1 in the stream but observed later
    let input = format!(
        "{{\"peer\":\"{}\",\"rtt_us\":900,\"observed_at\":2500000000}}\n\
         {{\"peer\":\"{}\",\"rtt_us\":700,\"observed_at\":2000000000}}\n",
        P2, P1
    );
    let delivered = feed
        .run(input.as_bytes(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(delivered, 2);

    let report = timeout(Duration::from_secs(5), reports.recv()).await.unwrap().unwrap();
    assert_eq!(report.committed, 2);

    cancel.cancel();
    run.await.unwrap().unwrap();

    let entries: Vec<_> = store.scan_all().unwrap().map(|r| r.unwrap()).collect();
    let peers: Vec<_> = entries.iter().map(|(k, _)| k.peer).collect();
    assert_eq!(peers, vec![P1, P2]);
    assert_eq!(entries[0].1.rtt, Duration::from_micros(700));
}

#[tokio::test]
async fn test_stuck_notifier_blocks_neither_journal_nor_shutdown() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JournalStore::open(dir.path()).unwrap());
    let clock = MockClock::new(Timestamp::from_secs(50));
    let (tx, mut notes) = mpsc::unbounded_channel();

    let monitor = Monitor::new(
        store.clone(),
        vec![peer_config(P1), peer_config(P2)],
        Arc::new(StuckNotifier { tx }),
        Arc::new(clock.clone()),
        fast_config(Duration::from_millis(20)),
    );
    let liveness = monitor.liveness().clone();
    let cancel = monitor.shutdown_token();
    let (tx1, rx1) = mpsc::channel(16);
    let (tx2, rx2) = mpsc::channel(16);
    let run = tokio::spawn(monitor.run(HashMap::from([(P1, rx1), (P2, rx2)])));
    wait_until_seeded(&liveness, P1).await;

    // The first inactivity notice never completes
    clock.advance(Duration::from_secs(300));
    next_note(&mut notes).await;

    tx1.send(handshake(clock.now(), P1)).await.unwrap();
    clock.advance(Duration::from_secs(1));
    tx2.send(handshake(clock.now(), P2)).await.unwrap();
    clock.advance(Duration::from_secs(1));
    tx1.send(handshake(clock.now(), P1)).await.unwrap();

    timeout(Duration::from_secs(5), async {
        while store.len().unwrap() < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("handshakes never reached the journal");

    cancel.cancel();
    timeout(Duration::from_secs(3), run)
        .await
        .expect("monitor did not stop while a notification was pending")
        .unwrap()
        .unwrap();
    assert_eq!(store.len().unwrap(), 3);
}
