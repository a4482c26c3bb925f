// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bounded worker pool for per-page work on the scanned path.
//
// Pages are issued in increasing index order, never more than one per worker
// at a time, so issuing can stop the moment a deadline passes. Completions
// arrive over a channel in whatever order workers finish; the run is
// reassembled by page index before it is returned.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, warn};
use vibeparser_core::{Result, VibeError};

/// Upper bound for the automatic worker count.
pub const MAX_AUTO_WORKERS: usize = 8;

/// Worker count for a configured value; 0 picks available parallelism,
/// capped at [`MAX_AUTO_WORKERS`].
pub fn resolve_workers(configured: usize) -> usize {
    if configured > 0 {
        return configured;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_AUTO_WORKERS)
}

/// How one issued page ended.
#[derive(Debug)]
pub enum Slot<T> {
    Done(T),
    /// The job panicked; the worker survived.
    Panicked,
    /// Still running when the grace period ran out.
    Unfinished,
}

/// Outcome of [`PagePool::run`].
#[derive(Debug)]
pub struct PoolRun<T> {
    /// Every issued page, in index order.
    pub slots: Vec<(usize, Slot<T>)>,
    /// Pages never issued because the deadline passed first.
    pub unissued: Vec<usize>,
    pub deadline_hit: bool,
}

/// A fixed-size pool of page workers.
pub struct PagePool {
    pool: ThreadPool,
    workers: usize,
}

impl PagePool {
    pub fn new(workers: usize) -> Result<Self> {
        let workers = resolve_workers(workers);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("vibeparser-page-{index}"))
            .build()
            .map_err(|err| VibeError::Io(std::io::Error::other(err.to_string())))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` for every index in `indices`.
    ///
    /// Once `deadline` passes no further pages are issued. Pages already
    /// issued get until `deadline + grace` to finish and are reported
    /// [`Slot::Unfinished`] otherwise; their workers are abandoned, not
    /// waited for.
    pub fn run<T, F>(
        &self,
        indices: &[usize],
        deadline: Option<Instant>,
        grace: Duration,
        job: F,
    ) -> PoolRun<T>
    where
        T: Send + 'static,
        F: Fn(usize) -> T + Send + Sync + 'static,
    {
        let job = Arc::new(job);
        let (sender, receiver) = crossbeam_channel::unbounded::<(usize, Option<T>)>();
        let hard_stop = deadline.map(|at| at + grace);

        let mut pending = indices.iter().copied();
        let mut issued = Vec::with_capacity(indices.len());
        let mut finished: BTreeMap<usize, Option<T>> = BTreeMap::new();
        let mut in_flight = 0usize;
        let mut deadline_hit = false;

        loop {
            while in_flight < self.workers {
                if deadline.is_some_and(|at| Instant::now() >= at) {
                    deadline_hit = true;
                    break;
                }
                let Some(index) = pending.next() else {
                    break;
                };
                let job = Arc::clone(&job);
                let sender = sender.clone();
                self.pool.spawn(move || {
                    let outcome = catch_unwind(AssertUnwindSafe(|| job(index))).ok();
                    // The receiver is gone when the run was abandoned.
                    let _ = sender.send((index, outcome));
                });
                debug!(index, "Page issued");
                issued.push(index);
                in_flight += 1;
            }
            if in_flight == 0 {
                break;
            }

            let wait_until = match (deadline, hard_stop) {
                (Some(at), _) if Instant::now() < at => Some(at),
                (_, stop) => stop,
            };
            let received = match wait_until {
                Some(at) => receiver.recv_deadline(at),
                None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match received {
                Ok((index, outcome)) => {
                    debug!(index, "Page finished");
                    finished.insert(index, outcome);
                    in_flight -= 1;
                }
                Err(RecvTimeoutError::Timeout) => {
                    deadline_hit = true;
                    if hard_stop.is_some_and(|stop| Instant::now() >= stop) {
                        warn!(in_flight, "Grace period over; abandoning unfinished pages");
                        break;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let unissued: Vec<usize> = pending.collect();
        issued.sort_unstable();
        let slots = issued
            .into_iter()
            .map(|index| {
                let slot = match finished.remove(&index) {
                    Some(Some(value)) => Slot::Done(value),
                    Some(None) => Slot::Panicked,
                    None => Slot::Unfinished,
                };
                (index, slot)
            })
            .collect();

        PoolRun {
            slots,
            unissued,
            deadline_hit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn done_values(run: &PoolRun<usize>) -> Vec<(usize, Option<usize>)> {
        run.slots
            .iter()
            .map(|(index, slot)| match slot {
                Slot::Done(value) => (*index, Some(*value)),
                _ => (*index, None),
            })
            .collect()
    }

    #[test]
    fn results_are_assembled_in_page_order() {
        let pool = PagePool::new(3).unwrap();
        let completion_order = Arc::new(Mutex::new(Vec::new()));
        let order = Arc::clone(&completion_order);

        let run = pool.run(&[0, 1, 2], None, Duration::ZERO, move |index| {
            let delay = match index {
                0 => 150,
                1 => 0,
                _ => 60,
            };
            std::thread::sleep(Duration::from_millis(delay));
            order.lock().unwrap().push(index);
            index * 10
        });

        assert_eq!(*completion_order.lock().unwrap(), vec![1, 2, 0]);
        assert_eq!(done_values(&run), vec![(0, Some(0)), (1, Some(10)), (2, Some(20))]);
        assert!(run.unissued.is_empty());
        assert!(!run.deadline_hit);
    }

    #[test]
    fn panics_are_contained_to_their_page() {
        let pool = PagePool::new(2).unwrap();
        let run = pool.run(&[0, 1, 2], None, Duration::ZERO, |index| {
            if index == 1 {
                panic!("page worker blew up");
            }
            index
        });
        assert!(matches!(run.slots[1], (1, Slot::Panicked)));
        assert!(matches!(run.slots[2], (2, Slot::Done(2))));
    }

    #[test]
    fn deadline_stops_issuing_and_abandons_slow_pages() {
        let pool = PagePool::new(1).unwrap();
        let deadline = Instant::now() + Duration::from_millis(100);
        let started = Instant::now();

        let run = pool.run(&[0, 1, 2, 3], Some(deadline), Duration::from_millis(50), |index| {
            let delay = if index == 0 { 10 } else { 2_000 };
            std::thread::sleep(Duration::from_millis(delay));
            index
        });

        assert!(started.elapsed() < Duration::from_millis(1_000));
        assert!(run.deadline_hit);
        assert!(matches!(run.slots[0], (0, Slot::Done(0))));
        assert!(matches!(run.slots[1], (1, Slot::Unfinished)));
        assert_eq!(run.slots.len(), 2);
        assert_eq!(run.unissued, vec![2, 3]);
    }

    #[test]
    fn expired_deadline_issues_nothing() {
        let pool = PagePool::new(2).unwrap();
        let run = pool.run(&[0, 1], Some(Instant::now()), Duration::ZERO, |index| index);
        assert!(run.slots.is_empty());
        assert_eq!(run.unissued, vec![0, 1]);
        assert!(run.deadline_hit);
    }

    #[test]
    fn auto_workers_are_bounded() {
        let workers = resolve_workers(0);
        assert!((1..=MAX_AUTO_WORKERS).contains(&workers));
        assert_eq!(resolve_workers(3), 3);
    }
}
