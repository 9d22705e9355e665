mod helpers;
use helpers::{build_manager, sample_entries, setup_manager, test_config, MemoryState};
use snapvault::backup::BroadcastHub;
use snapvault::config::BackupConfig;
use std::time::Duration;
use tokio::time::sleep;

// =========================================================================================
// 1. FEATURE TESTS (Happy Path + Logic)
// =========================================================================================

mod features {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_into_one_write() {
        let (manager, _state, _tmp) = setup_manager().await;

        // 5 mutations within 200ms, window 1000ms. Last signal at t=160.
        for _ in 0..5 {
            manager.signal_mutation();
            sleep(Duration::from_millis(40)).await;
        }

        // t=1150: one tick before the deadline
        sleep(Duration::from_millis(950)).await;
        assert!(manager.store().list().await.unwrap().is_empty());

        // t=1170: past last signal + window
        sleep(Duration::from_millis(20)).await;
        let listing = manager.store().list().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].record_count, 3);

        // Nothing else follows.
        sleep(Duration::from_secs(5)).await;
        assert_eq!(manager.store().list().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_lands_at_last_signal_plus_window() {
        let (manager, _state, _tmp) = setup_manager().await;

        manager.signal_mutation();
        sleep(Duration::from_millis(999)).await;
        assert!(manager.store().list().await.unwrap().is_empty());

        sleep(Duration::from_millis(2)).await;
        assert_eq!(manager.store().list().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_signals_each_write() {
        let (manager, _state, _tmp) = setup_manager().await;

        for _ in 0..3 {
            manager.signal_mutation();
            sleep(Duration::from_millis(1100)).await;
        }

        assert_eq!(manager.store().list().await.unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_reflects_state_at_fire_time() {
        let (manager, state, _tmp) = setup_manager().await;

        manager.signal_mutation();
        sleep(Duration::from_millis(500)).await;
        state.set_entries(sample_entries(7));

        sleep(Duration::from_millis(600)).await;
        let listing = manager.store().list().await.unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].record_count, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pending_drops_the_write() {
        let (manager, _state, _tmp) = setup_manager().await;

        manager.signal_mutation();
        sleep(Duration::from_millis(300)).await;
        assert!(manager.cancel_pending().await);
        assert!(!manager.cancel_pending().await);

        sleep(Duration::from_secs(3)).await;
        assert!(manager.store().list().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_flushes_pending_write() {
        let (mut manager, _state, _tmp) = setup_manager().await;

        manager.signal_mutation();
        sleep(Duration::from_millis(100)).await;
        manager.close().await;

        assert_eq!(manager.store().list().await.unwrap().len(), 1);

        // Stopped: later signals are ignored.
        manager.signal_mutation();
        sleep(Duration::from_secs(3)).await;
        assert_eq!(manager.store().list().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_eviction_keeps_retention() {
        let tmp = tempfile::tempdir().unwrap();
        let config = BackupConfig {
            retention: 2,
            ..test_config(&tmp)
        };
        let manager = build_manager(config, MemoryState::with_entries(sample_entries(1)), &BroadcastHub::new());

        for _ in 0..4 {
            manager.signal_mutation();
            sleep(Duration::from_millis(1100)).await;
        }

        assert_eq!(manager.store().list().await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_failure_is_absorbed() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let config = BackupConfig::with_db_path(blocker.join("backups.db"));
        let manager = build_manager(config, MemoryState::with_entries(sample_entries(2)), &BroadcastHub::new());

        manager.signal_mutation();
        sleep(Duration::from_millis(1500)).await;

        // The actor survived the failed write and still answers.
        assert!(!manager.cancel_pending().await);
        assert!(manager.list_snapshots(true).await.is_empty());
    }
}
