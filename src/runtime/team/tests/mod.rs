//! Team tests

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod passive_tests {
    use super::*;

    #[test]
    fn test_runs_on_calling_thread() {
        let team = PassiveTeam::new("passive");
        let caller = std::thread::current().id();
        let ran_on = Arc::new(parking_lot::Mutex::new(None));
        let slot = ran_on.clone();
        team.assign_job(Box::new(move || {
            *slot.lock() = Some(std::thread::current().id());
        }))
        .unwrap();
        assert_eq!(*ran_on.lock(), Some(caller));
        assert!(team.is_passive());
        assert_eq!(team.stats().unwrap().completed(), 1);
    }

    #[test]
    fn test_rejects_after_stop() {
        let team = PassiveTeam::new("passive");
        team.stop_working();
        let err = team.assign_job(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, TeamError::Stopped { .. }));
    }

    #[test]
    fn test_panicking_job_is_contained() {
        let team = PassiveTeam::new("passive");
        team.assign_job(Box::new(|| panic!("boom"))).unwrap();
        assert_eq!(team.stats().unwrap().panicked(), 1);
        assert_eq!(team.stats().unwrap().completed(), 0);
    }
}

#[cfg(test)]
mod executor_tests {
    use super::*;

    #[test]
    fn test_runs_all_jobs() {
        let team = ExecutorTeam::new("T1", 2).unwrap();
        assert_eq!(team.num_workers(), 2);
        let counter = Arc::new(AtomicUsize::new(0));
        let (done_tx, done_rx) = crossbeam::channel::unbounded();
        for _ in 0..10 {
            let counter = counter.clone();
            let done_tx = done_tx.clone();
            team.assign_job(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                done_tx.send(()).unwrap();
            }))
            .unwrap();
        }
        for _ in 0..10 {
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 10);
        assert_eq!(team.stats().unwrap().assigned(), 10);
    }

    #[test]
    fn test_runs_off_the_calling_thread() {
        let team = ExecutorTeam::new("T1", 1).unwrap();
        let caller = std::thread::current().id();
        let (tx, rx) = crossbeam::channel::bounded(1);
        team.assign_job(Box::new(move || {
            tx.send(std::thread::current().id()).unwrap();
        }))
        .unwrap();
        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn test_stop_drains_queue() {
        let team = ExecutorTeam::new("T1", 1).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let counter = counter.clone();
            team.assign_job(Box::new(move || {
                std::thread::sleep(Duration::from_millis(2));
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
        team.stop_working();
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(!team.is_running());
        assert!(matches!(
            team.assign_job(Box::new(|| {})),
            Err(TeamError::Stopped { .. })
        ));
    }

    #[test]
    fn test_worker_survives_panic() {
        let team = ExecutorTeam::new("T1", 1).unwrap();
        team.assign_job(Box::new(|| panic!("boom"))).unwrap();
        let (tx, rx) = crossbeam::channel::bounded(1);
        team.assign_job(Box::new(move || tx.send(()).unwrap()))
            .unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        team.stop_working();
        assert_eq!(team.stats().unwrap().panicked(), 1);
    }
}
