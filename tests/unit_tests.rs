#[cfg(test)]
mod tests {
    use affine_pool::{
        errors::PoolError,
        pool::{Config, Pool},
    };
    use crossbeam::channel::bounded;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Barrier, Mutex,
        },
        thread,
        time::{Duration, Instant},
    };

    fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn global_queue_is_fifo_with_single_worker() {
        let pool = Pool::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let order = order.clone();
                pool.submit(move || order.lock().unwrap().push(i)).unwrap()
            })
            .collect();

        for handle in handles {
            handle.wait().unwrap();
        }

        let seen = order.lock().unwrap();
        assert_eq!(*seen, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn affined_tasks_only_run_on_their_worker() {
        let pool = Pool::new(4);
        let id = pool.allocate_affinity(false).unwrap();

        let handles: Vec<_> = (0..32)
            .map(|_| pool.submit_to(id, || thread::current().id()).unwrap())
            .collect();

        let mut tids: Vec<_> = handles.into_iter().map(|h| h.wait().unwrap()).collect();
        tids.dedup();
        assert_eq!(tids.len(), 1, "tasks ran on more than one thread");
    }

    #[test]
    fn least_loaded_candidate_wins() {
        let pool = Pool::new(2);
        let a = pool.allocate_affinity(false).unwrap();
        let b = pool.allocate_affinity(false).unwrap();

        let tid_b = pool.submit_to(b, || thread::current().id()).unwrap().wait().unwrap();

        // Occupy A with a gated task, then stack three more behind it.
        let (started_tx, started_rx) = bounded::<()>(1);
        let (gate_tx, gate_rx) = bounded::<()>(1);
        let gated = pool
            .submit_to(a, move || {
                started_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
            })
            .unwrap();
        started_rx.recv().unwrap();
        let backlog: Vec<_> = (0..3).map(|_| pool.submit_to(a, || ()).unwrap()).collect();

        // A holds 3 queued tasks, B holds 0.
        let routed = pool.submit_any([a, b], || thread::current().id()).unwrap();
        assert_eq!(routed.wait().unwrap(), tid_b);

        gate_tx.send(()).unwrap();
        gated.wait().unwrap();
        for handle in backlog {
            handle.wait().unwrap();
        }
    }

    #[test]
    fn candidate_ties_break_by_iteration_order() {
        let pool = Pool::new(2);
        let a = pool.allocate_affinity(false).unwrap();
        let b = pool.allocate_affinity(false).unwrap();

        let tid_a = pool.submit_to(a, || thread::current().id()).unwrap().wait().unwrap();

        // Both queues empty: the first candidate wins the tie.
        let routed = pool.submit_any([a, b], || thread::current().id()).unwrap();
        assert_eq!(routed.wait().unwrap(), tid_a);
    }

    #[test]
    fn empty_candidate_set_degrades_to_global() {
        let pool = Pool::new(1);
        let handle = pool.submit_any(Vec::new(), || 7).unwrap();
        assert_eq!(handle.wait().unwrap(), 7);
    }

    #[test]
    fn resize_up_is_immediate_and_all_workers_serve() {
        let pool = Pool::new(1);
        pool.resize(4);
        assert_eq!(pool.current_size(), 4);

        // Four tasks meeting at one barrier can only finish if four distinct
        // workers pick one each.
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let barrier = barrier.clone();
                pool.submit(move || {
                    barrier.wait();
                })
                .unwrap()
            })
            .collect();

        for handle in handles {
            handle.wait().unwrap();
        }
    }

    #[test]
    fn resize_down_converges_without_losing_work() {
        let pool = Pool::new(4);

        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..200)
            .map(|_| {
                let counter = counter.clone();
                pool.submit(move || {
                    thread::sleep(Duration::from_millis(1));
                    counter.fetch_add(1, Ordering::Relaxed);
                })
                .unwrap()
            })
            .collect();

        pool.resize(1);

        for handle in handles {
            handle.wait().unwrap();
        }
        assert_eq!(counter.load(Ordering::Relaxed), 200);

        wait_until("pool to shrink to 1", || pool.current_size() == 1);
        assert_eq!(pool.status().pending_retirements, 0);
    }

    #[test]
    fn graceful_drop_drains_all_queued_work() {
        let pool = Pool::new(2);
        let handles: Vec<_> = (0..100)
            .map(|i| pool.submit(move || i * 2).unwrap())
            .collect();

        drop(pool);

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.wait().unwrap(), i * 2);
        }
    }

    #[test]
    fn abort_discards_queued_tasks_as_lost() {
        // No workers: everything stays queued until the abort throws it away.
        let pool = Pool::new(0);
        let handles: Vec<_> = (0..10).map(|i| pool.submit(move || i).unwrap()).collect();

        pool.abort();

        for handle in handles {
            assert_eq!(handle.wait(), Err(PoolError::Lost));
        }
        assert_eq!(pool.submit(|| ()).unwrap_err(), PoolError::Closed);
    }

    #[test]
    fn retired_worker_id_is_rejected() {
        let pool = Pool::new(1);
        let id = pool.allocate_affinity(false).unwrap();

        pool.resize(0);
        wait_until("pool to shrink to 0", || pool.current_size() == 0);

        assert_eq!(
            pool.submit_to(id, || ()).unwrap_err(),
            PoolError::InvalidAffinity
        );
    }

    #[test]
    fn affinity_exhaustion_and_on_demand_spawn() {
        let pool = Pool::new(2);
        pool.allocate_affinity(false).unwrap();
        pool.allocate_affinity(false).unwrap();

        assert_eq!(
            pool.allocate_affinity(false).unwrap_err(),
            PoolError::AffinitiesExhausted
        );

        let extra = pool.allocate_affinity(true).unwrap();
        assert_eq!(pool.current_size(), 3);
        assert_eq!(pool.submit_to(extra, || 1).unwrap().wait().unwrap(), 1);
    }

    #[test]
    fn panicking_task_resolves_handle_and_worker_survives() {
        let pool = Pool::new(1);

        let handle = pool.submit(|| panic!("boom")).unwrap();
        match handle.wait() {
            Err(PoolError::Panicked(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected Panicked, got {:?}", other),
        }

        // Same (only) worker keeps serving.
        assert_eq!(pool.submit(|| 1 + 1).unwrap().wait().unwrap(), 2);
    }

    #[test]
    fn is_ready_is_nonblocking() {
        let pool = Pool::new(1);
        let id = pool.allocate_affinity(false).unwrap();

        let (started_tx, started_rx) = bounded::<()>(1);
        let (gate_tx, gate_rx) = bounded::<()>(1);
        let mut gated = pool
            .submit_to(id, move || {
                started_tx.send(()).unwrap();
                gate_rx.recv().unwrap();
                42
            })
            .unwrap();
        started_rx.recv().unwrap();

        assert!(!gated.is_ready());
        gate_tx.send(()).unwrap();

        wait_until("gated task to finish", || gated.is_ready());
        assert_eq!(gated.wait().unwrap(), 42);
    }

    #[test]
    fn dropping_a_handle_does_not_cancel_the_task() {
        let pool = Pool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_in_task = counter.clone();
        drop(pool.submit(move || {
            counter_in_task.fetch_add(1, Ordering::Relaxed);
        }));

        wait_until("orphaned task to run", || counter.load(Ordering::Relaxed) == 1);
    }

    #[test]
    fn idle_hook_fires_after_each_task() {
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_in_hook = fired.clone();

        let pool = Pool::with_config(Config {
            initial_workers: 2,
            idle_hook: Some(Arc::new(move || {
                fired_in_hook.fetch_add(1, Ordering::Relaxed);
            })),
        });

        let handles: Vec<_> = (0..10).map(|i| pool.submit(move || i).unwrap()).collect();
        for handle in handles {
            handle.wait().unwrap();
        }

        // At least once per completed task, plus worker-start firings.
        assert!(fired.load(Ordering::Relaxed) >= 10);
    }

    #[tokio::test]
    async fn handles_can_be_awaited() {
        let pool = Pool::new(2);
        let handle = pool.submit(|| 21 * 2).unwrap();
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[test]
    fn handles_work_with_a_futures_executor() {
        let pool = Pool::new(1);
        let handle = pool.submit(|| "done").unwrap();
        assert_eq!(futures::executor::block_on(handle).unwrap(), "done");
    }
}
