/// Refresh scheduler integration tests.
///
/// These run the real worker thread and check the two submission modes
/// from the outside: droppable bursts collapse to the latest request,
/// durable jobs are never lost and keep their order, and a panicking job
/// does not take the worker down. Waits use `recv_timeout` with generous
/// limits so a stuck worker fails the test instead of hanging the suite.
use crossbeam_channel::bounded;
use livescan_core::scheduler::RefreshScheduler;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(30);

// ── Helpers ──────────────────────────────────────────────────────────────────

fn scheduler() -> RefreshScheduler {
    RefreshScheduler::start(Duration::from_millis(5)).unwrap()
}

// ── Droppable ────────────────────────────────────────────────────────────────

#[test]
fn test_burst_coalesces_to_latest() {
    let sched = scheduler();
    let log = Arc::new(Mutex::new(Vec::new()));
    let (started_tx, started_rx) = bounded::<()>(1);
    let (gate_tx, gate_rx) = bounded::<()>(1);

    let l = log.clone();
    sched.submit_latest(move || {
        let _ = started_tx.send(());
        let _ = gate_rx.recv_timeout(WAIT);
        l.lock().push(0);
    });
    started_rx
        .recv_timeout(WAIT)
        .expect("first refresh never started");

    for i in 1..=20 {
        let l = log.clone();
        sched.submit_latest(move || l.lock().push(i));
    }
    assert!(sched.has_pending());
    gate_tx.send(()).unwrap();

    assert!(sched.wait_idle(WAIT));
    assert_eq!(*log.lock(), vec![0, 20]);
    assert_eq!(sched.stats().executed(), 3, "two refreshes plus the wait_idle job");
    assert_eq!(sched.stats().superseded(), 19);
}

#[test]
fn test_refresh_after_idle_runs_again() {
    let sched = scheduler();
    let count = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let c = count.clone();
        sched.submit_latest(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(sched.wait_idle(WAIT));
    }
    assert_eq!(count.load(Ordering::SeqCst), 3);
}

// ── Durable ──────────────────────────────────────────────────────────────────

#[test]
fn test_durable_jobs_survive_droppable_noise() {
    let sched = scheduler();
    let durable = Arc::new(Mutex::new(Vec::new()));

    for i in 0..10 {
        let d = durable.clone();
        sched.submit(move || d.lock().push(i));
        sched.submit_latest(|| std::thread::sleep(Duration::from_millis(1)));
    }

    assert!(sched.wait_idle(WAIT));
    assert_eq!(*durable.lock(), (0..10).collect::<Vec<_>>());
}

#[test]
fn test_queued_jobs_run_after_last_handle_dropped() {
    let sched = scheduler();
    let (tx, rx) = bounded::<usize>(4);
    for i in 0..3 {
        let tx = tx.clone();
        sched.submit(move || {
            std::thread::sleep(Duration::from_millis(5));
            let _ = tx.send(i);
        });
    }
    drop(sched);

    let got: Vec<usize> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
    assert_eq!(got, vec![0, 1, 2]);
}

// ── Failure handling ─────────────────────────────────────────────────────────

#[test]
fn test_panics_are_contained() {
    let sched = scheduler();
    let ran = Arc::new(AtomicUsize::new(0));

    sched.submit_latest(|| panic!("refresh exploded"));
    assert!(sched.wait_idle(WAIT));
    sched.submit(|| panic!("reload exploded"));

    let r = ran.clone();
    sched.submit(move || {
        r.fetch_add(1, Ordering::SeqCst);
    });
    let r = ran.clone();
    sched.submit_latest(move || {
        r.fetch_add(1, Ordering::SeqCst);
    });

    assert!(sched.wait_idle(WAIT));
    assert_eq!(ran.load(Ordering::SeqCst), 2);
    assert_eq!(sched.stats().panicked(), 2);
}
