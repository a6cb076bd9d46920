//! Admission control under contention and shutdown.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_test::{assert_pending, assert_ready};

use atelier::orchestration::{PoolEvent, WorkerPool};
use atelier::Error;

/// Test: Sixth spawn waits for a release
/// Given a pool of five with five active agents
/// When a sixth spawn is requested
/// Then it stays queued until one agent is released
#[tokio::test]
async fn test_sixth_spawn_waits_for_release() {
    let pool = WorkerPool::new(5);
    let mut agents = Vec::new();
    for i in 0..5 {
        agents.push(pool.spawn(&format!("worker-{}", i), 0).await.unwrap());
    }

    let mut sixth = tokio_test::task::spawn(pool.spawn("worker-5", 0));
    assert_pending!(sixth.poll());
    let metrics = pool.metrics();
    assert_eq!((metrics.active, metrics.queued, metrics.max_concurrent), (5, 1, 5));

    pool.release(&agents[2].id).unwrap();
    let admitted = assert_ready!(sixth.poll()).unwrap();
    assert_eq!(admitted.agent_type, "worker-5");
    assert_eq!(pool.metrics().active, 5);
    assert_eq!(pool.metrics().queued, 0);
}

/// Test: Concurrency limit holds under load
/// Given 40 concurrent requests with mixed priorities against 4 slots
/// When each holds its slot briefly
/// Then no more than 4 are ever active and all complete
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_limit_holds_under_load() {
    let pool = Arc::new(WorkerPool::new(4));
    let peak = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let pool = Arc::clone(&pool);
            let peak = Arc::clone(&peak);
            let completed = Arc::clone(&completed);
            tokio::spawn(async move {
                let agent = pool.spawn("load", i % 5).await.unwrap();
                peak.fetch_max(pool.metrics().active, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                pool.release(&agent.id).unwrap();
                completed.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 4);
    assert_eq!(completed.load(Ordering::SeqCst), 40);
    assert_eq!(pool.metrics().active, 0);
}

/// Test: Shutdown is cooperative
/// Given two active agents and one queued request
/// When shutdown starts
/// Then the queued request and new spawns are rejected, and shutdown
/// completes only after both agents are released
#[tokio::test]
async fn test_shutdown_rejects_and_waits() {
    let pool = WorkerPool::new(2);
    let a = pool.spawn("a", 0).await.unwrap();
    let b = pool.spawn("b", 0).await.unwrap();

    let mut queued = tokio_test::task::spawn(pool.spawn("queued", 9));
    assert_pending!(queued.poll());

    let mut shutdown = tokio_test::task::spawn(pool.shutdown());
    assert_pending!(shutdown.poll());

    assert!(matches!(assert_ready!(queued.poll()), Err(Error::PoolClosed)));
    assert!(matches!(pool.spawn("late", 0).await, Err(Error::PoolClosed)));

    pool.release(&a.id).unwrap();
    assert_pending!(shutdown.poll());
    pool.release(&b.id).unwrap();
    assert_ready!(shutdown.poll()).unwrap();
    assert_eq!(pool.metrics().active, 0);
}

/// Test: Pool events describe admission
/// Given an event channel and a pool of one
/// When a second spawn queues and is admitted after release
/// Then Spawned, Queued, Released, Spawned are emitted in order
#[tokio::test]
async fn test_pool_events_in_order() {
    let (tx, mut rx) = mpsc::channel(8);
    let pool = WorkerPool::new(1).with_events(tx);

    let first = pool.spawn("character", 0).await.unwrap();
    let mut second = tokio_test::task::spawn(pool.spawn("visual", 1));
    assert_pending!(second.poll());
    pool.release(&first.id).unwrap();
    let admitted = assert_ready!(second.poll()).unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert_eq!(events.len(), 4);
    assert!(matches!(events[0], PoolEvent::Spawned { .. }));
    assert!(matches!(events[1], PoolEvent::Queued { priority: 1, .. }));
    assert_eq!(events[2], PoolEvent::Released { agent_id: first.id });
    assert_eq!(
        events[3],
        PoolEvent::Spawned {
            agent_id: admitted.id,
            agent_type: "visual".to_string()
        }
    );
}
