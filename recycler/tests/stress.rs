use rand::{rngs::StdRng, Rng, SeedableRng};
use recycler::{HybridPool, StripedPool};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    mpsc, Arc,
};

/// One pooled scratch value instrumented to detect double-issue.
struct Scratch {
    in_use: AtomicBool,
    _payload: Vec<u8>,
}

#[test]
fn striped_pool_never_double_issues() {
    const WORKERS: usize = 8;
    const CYCLES: usize = 10_000;

    let pool = Arc::new(StripedPool::new(WORKERS).unwrap());
    let created = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let pool = Arc::clone(&pool);
            let created = Arc::clone(&created);
            std::thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(worker as u64);
                for _ in 0..CYCLES {
                    let payload = rng.gen_range(64..1024);
                    let scratch = pool.acquire(|| {
                        created.fetch_add(1, Ordering::Relaxed);
                        Scratch {
                            in_use: AtomicBool::new(false),
                            _payload: vec![0u8; payload],
                        }
                    });
                    assert!(
                        !scratch.in_use.swap(true, Ordering::AcqRel),
                        "value issued to two workers at once"
                    );
                    scratch.in_use.store(false, Ordering::Release);
                    pool.release(scratch);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Nothing leaked out of the pool, so at most one value per worker can
    // ever have been in circulation at once.
    assert!(created.load(Ordering::Relaxed) <= WORKERS);
}

#[test]
fn cross_thread_release_recycles() {
    const ITEMS: usize = 1_000;

    let pool = Arc::new(StripedPool::new(4).unwrap());
    let created = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel();
    let (ack_tx, ack_rx) = mpsc::channel();

    let releaser = {
        let pool = Arc::clone(&pool);
        std::thread::spawn(move || {
            for buf in rx {
                pool.release(buf);
                ack_tx.send(()).unwrap();
            }
        })
    };

    for _ in 0..ITEMS {
        let buf = pool.acquire(|| {
            created.fetch_add(1, Ordering::Relaxed);
            vec![0u8; 64]
        });
        tx.send(buf).unwrap();
        // Wait for the release before acquiring again, so every acquire
        // after the first must find the value back on this thread's stripe.
        ack_rx.recv().unwrap();
    }
    drop(tx);
    releaser.join().unwrap();

    assert_eq!(created.load(Ordering::Relaxed), 1);
}

recycler::local_slot!(static SLOT: Vec<u8>);

#[test]
fn hybrid_pool_standard_path_round_trip() {
    let pool = HybridPool::new(recycler::default_stripes(), &SLOT).unwrap();
    let mut buf = pool.acquire(|| Vec::with_capacity(256));
    buf.push(7);
    let ptr = buf.as_ptr();
    pool.release(buf);

    let buf = pool.acquire(|| Vec::with_capacity(256));
    assert_eq!(buf.as_ptr(), ptr);
}

#[cfg(feature = "tokio")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lightweight_workers_share_striped_pool() {
    recycler::local_slot!(static TASK_SLOT: Vec<u8>);

    let pool = Arc::new(HybridPool::new(4, &TASK_SLOT).unwrap());
    let mut tasks = Vec::new();
    for _ in 0..64 {
        let pool = Arc::clone(&pool);
        tasks.push(tokio::spawn(async move {
            for _ in 0..100 {
                let mut buf = pool.acquire(|| Vec::with_capacity(128));
                buf.clear();
                buf.extend_from_slice(b"payload");
                pool.release(buf);
                tokio::task::yield_now().await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}
