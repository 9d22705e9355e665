use snapvault::backup::{BackupEvent, BroadcastHub, ChangeKind, EventLogBroadcaster};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn forward(tx: mpsc::UnboundedSender<BackupEvent>) -> Arc<dyn Fn(BackupEvent) + Send + Sync> {
    Arc::new(move |event| {
        let _ = tx.send(event);
    })
}

const POLL: Duration = Duration::from_millis(20);

// =========================================================================================
// 1. FEATURE TESTS (Happy Path + Logic)
// =========================================================================================

mod features {
    use super::*;

    #[tokio::test]
    async fn test_delivered_to_others_not_to_self() {
        let hub = BroadcastHub::new();
        let a = hub.connect("backups");
        let b = hub.connect("backups");
        let c = hub.connect("backups");

        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let (c_tx, mut c_rx) = mpsc::unbounded_channel();
        let _a = a.subscribe(forward(a_tx));
        let _b = b.subscribe(forward(b_tx));
        let _c = c.subscribe(forward(c_tx));

        a.publish(ChangeKind::Created, 100);

        let expected = BackupEvent { kind: ChangeKind::Created, timestamp: 100 };
        for rx in [&mut b_rx, &mut c_rx] {
            let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
            assert_eq!(got, Some(expected));
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_err(), "delivered exactly once");
    }

    #[tokio::test]
    async fn test_channels_are_isolated_by_name() {
        let hub = BroadcastHub::new();
        let publisher = hub.connect("profile-a");
        let other = hub.connect("profile-b");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = other.subscribe(forward(tx));

        publisher.publish(ChangeKind::Deleted, 7);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_hubs_are_isolated() {
        let first = BroadcastHub::new();
        let second = BroadcastHub::new();
        let publisher = first.connect("backups");
        let listener = second.connect("backups");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = listener.subscribe(forward(tx));

        publisher.publish(ChangeKind::Created, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscription_stops_listening() {
        let hub = BroadcastHub::new();
        let publisher = hub.connect("backups");
        let listener = hub.connect("backups");

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = listener.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        drop(sub);

        publisher.publish(ChangeKind::Created, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closed_handle_stops_publishing() {
        let hub = BroadcastHub::new();
        let publisher = hub.connect("backups");
        let listener = hub.connect("backups");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = listener.subscribe(forward(tx));

        publisher.close();
        publisher.publish(ChangeKind::Created, 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_without_runtime_falls_back_to_noop() {
        let hub = BroadcastHub::new();
        let handle = hub.connect("backups");

        handle.publish(ChangeKind::Created, 1);
        let sub = handle.subscribe(Arc::new(|_| {}));
        assert!(!sub.is_active());
        sub.unsubscribe();
        handle.close();
    }

    #[test]
    fn test_event_wire_format() {
        let event = BackupEvent { kind: ChangeKind::Deleted, timestamp: 1700000000000 };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "deleted", "timestamp": 1700000000000i64 }));
    }

    // --- EVENT LOG (shared database file) ---

    #[tokio::test]
    async fn test_event_log_delivers_across_connections() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("backups.db");
        let a = EventLogBroadcaster::connect(&db, "backups", POLL);
        let b = EventLogBroadcaster::connect(&db, "backups", POLL);

        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let _a = a.subscribe(forward(a_tx));
        let _b = b.subscribe(forward(b_tx));

        a.publish(ChangeKind::Created, 10);
        a.publish(ChangeKind::Deleted, 10);

        for expected in [ChangeKind::Created, ChangeKind::Deleted] {
            let got = tokio::time::timeout(Duration::from_secs(2), b_rx.recv()).await.unwrap();
            assert_eq!(got, Some(BackupEvent { kind: expected, timestamp: 10 }));
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_err(), "delivered exactly once");
    }

    #[tokio::test]
    async fn test_event_log_skips_history_and_other_channels() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("backups.db");
        let publisher = EventLogBroadcaster::connect(&db, "profile-a", POLL);
        let neighbour = EventLogBroadcaster::connect(&db, "profile-b", POLL);
        let late = EventLogBroadcaster::connect(&db, "profile-a", POLL);

        publisher.publish(ChangeKind::Created, 1);

        let (late_tx, mut late_rx) = mpsc::unbounded_channel();
        let (other_tx, mut other_rx) = mpsc::unbounded_channel();
        let _late = late.subscribe(forward(late_tx));
        let _other = neighbour.subscribe(forward(other_tx));

        publisher.publish(ChangeKind::Created, 2);

        let got = tokio::time::timeout(Duration::from_secs(2), late_rx.recv()).await.unwrap();
        assert_eq!(got.map(|e| e.timestamp), Some(2));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(late_rx.try_recv().is_err());
        assert!(other_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_event_log_falls_back_when_file_unreachable() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let handle = EventLogBroadcaster::connect(&blocker.join("backups.db"), "backups", POLL);
        handle.publish(ChangeKind::Created, 1);
        assert!(!handle.subscribe(Arc::new(|_| {})).is_active());
    }

    #[test]
    fn test_event_log_without_runtime_falls_back_to_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let handle = EventLogBroadcaster::connect(&tmp.path().join("backups.db"), "backups", POLL);
        assert!(!handle.subscribe(Arc::new(|_| {})).is_active());
    }
}
