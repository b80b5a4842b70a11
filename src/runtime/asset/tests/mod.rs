//! Asset manager tests

use super::*;
use crate::runtime::engine::ProcessId;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting() -> (Arc<AtomicUsize>, impl FnOnce(Escalation) + Send + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    (count, move |_escalation: Escalation| {
        seen.fetch_add(1, Ordering::SeqCst);
    })
}

#[cfg(test)]
mod manager_tests {
    use super::*;

    #[test]
    fn test_complete_removes_asset() {
        let manager = AssetManager::new();
        let (failures, on_failure) = counting();
        let handle = manager.register("object", None, Duration::from_secs(5), on_failure);
        assert_eq!(manager.len(), 1);
        assert!(handle.is_outstanding());
        assert!(handle.complete());
        assert!(!handle.complete());
        assert!(manager.is_empty());
        assert_eq!(manager.check_timeouts(Instant::now() + Duration::from_secs(10)), 0);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
        assert_eq!(manager.stats().completed(), 1);
    }

    #[test]
    fn test_cancel_skips_failure_callback() {
        let manager = AssetManager::new();
        let (failures, on_failure) = counting();
        let handle = manager.register("flow", None, Duration::from_millis(1), on_failure);
        assert!(handle.cancel());
        assert!(!handle.complete());
        manager.check_timeouts(Instant::now() + Duration::from_secs(1));
        assert_eq!(failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_timeout_fires_once_with_timeout_escalation() {
        let manager = AssetManager::new();
        let kinds = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen = kinds.clone();
        let handle = manager.register("slow source", None, Duration::from_millis(50), move |e| {
            seen.lock().push(e.kind().to_string());
        });

        let now = Instant::now();
        assert_eq!(manager.check_timeouts(now), 0);
        assert_eq!(manager.check_timeouts(now + Duration::from_millis(60)), 1);
        assert_eq!(manager.check_timeouts(now + Duration::from_millis(120)), 0);
        assert_eq!(*kinds.lock(), vec![Escalation::ASSET_TIMEOUT.to_string()]);
        // a late completion loses
        assert!(!handle.complete());
        assert_eq!(manager.stats().timed_out(), 1);
    }

    #[test]
    fn test_fail_owned_by_only_touches_owner() {
        let manager = AssetManager::new();
        let (mine, on_mine) = counting();
        let (theirs, on_theirs) = counting();
        manager.register("a", Some(ProcessId(1)), Duration::from_secs(5), on_mine);
        manager.register("b", Some(ProcessId(2)), Duration::from_secs(5), on_theirs);
        let failed = manager.fail_owned_by(ProcessId(1), &Escalation::cancelled("stop"));
        assert_eq!(failed, 1);
        assert_eq!(mine.load(Ordering::SeqCst), 1);
        assert_eq!(theirs.load(Ordering::SeqCst), 0);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_outstanding_lists_in_registration_order() {
        let manager = AssetManager::new();
        manager.register("first", None, Duration::from_secs(5), |_| {});
        manager.register("second", Some(ProcessId(3)), Duration::from_secs(5), |_| {});
        let outstanding = manager.outstanding();
        let names: Vec<&str> = outstanding.iter().map(|a| a.description.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(outstanding[1].owner, Some(ProcessId(3)));
    }

    #[test]
    fn test_callback_may_touch_the_manager() {
        let manager = AssetManager::new();
        let inner = manager.clone();
        manager.register("outer", None, Duration::from_millis(1), move |_| {
            // runs outside the lock
            assert_eq!(inner.len(), 0);
        });
        assert_eq!(manager.check_timeouts(Instant::now() + Duration::from_millis(5)), 1);
    }
}

#[cfg(test)]
mod monitor_tests {
    use super::*;

    #[test]
    fn test_monitor_times_out_within_poll_interval() {
        let manager = AssetManager::new();
        let (tx, rx) = crossbeam::channel::unbounded();
        let waiters = Arc::new(AtomicUsize::new(0));
        let released = waiters.clone();
        manager.register("never completed", None, Duration::from_millis(50), move |e| {
            released.fetch_add(1, Ordering::SeqCst);
            tx.send(e).unwrap();
        });

        let mut monitor = AssetMonitor::start(manager.clone(), Duration::from_millis(10)).unwrap();
        let start = Instant::now();
        let escalation = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(escalation.is_kind(Escalation::ASSET_TIMEOUT));
        assert!(start.elapsed() < Duration::from_secs(2));

        std::thread::sleep(Duration::from_millis(50));
        monitor.stop();
        assert!(!monitor.is_running());
        assert_eq!(waiters.load(Ordering::SeqCst), 1);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_slow_failure_callback_does_not_delay_detection() {
        let manager = AssetManager::new();
        let (entered, wait_entered) = crossbeam::channel::bounded::<()>(1);
        let (release, wait_release) = crossbeam::channel::bounded::<()>(1);
        manager.register("slow", None, Duration::from_millis(10), move |_| {
            let _ = entered.send(());
            let _ = wait_release.recv_timeout(Duration::from_secs(5));
        });

        let mut monitor = AssetMonitor::start(manager.clone(), Duration::from_millis(5)).unwrap();
        wait_entered.recv_timeout(Duration::from_secs(5)).unwrap();

        // registered while the first callback is still running
        let (failed, on_failure) = counting();
        manager.register("later", None, Duration::from_millis(10), on_failure);
        let deadline = Instant::now() + Duration::from_secs(2);
        while manager.stats().timed_out() < 2 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(manager.stats().timed_out(), 2);
        assert!(manager.is_empty());

        release.send(()).unwrap();
        monitor.stop();
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_expire_leaves_callback_to_caller() {
        let manager = AssetManager::new();
        let (failed, on_failure) = counting();
        manager.register("object", None, Duration::from_millis(1), on_failure);
        let expired = manager.expire(Instant::now() + Duration::from_millis(5));
        assert_eq!(expired.len(), 1);
        assert!(manager.is_empty());
        assert_eq!(manager.stats().timed_out(), 1);
        assert_eq!(failed.load(Ordering::SeqCst), 0);
        for asset in expired {
            asset.fail();
        }
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }
}
