//! A flat work queue with feedback for symbolic preprocessing.
//!
//! Row tasks form a transitively growing frontier: handling one task can
//! discover columns whose reducers become new tasks. This is expressed as a
//! fixed pool of workers pulling from a shared injector plus per-worker
//! work-stealing deques, with a `TaskFeeder` handle through which running
//! tasks push more work. A single pending-task counter covers both queued and
//! running tasks, so the pool drains exactly when no task is queued and no
//! task is running.

use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use crossbeam_utils::Backoff;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Lets a running task schedule more tasks onto the shared frontier.
pub(crate) struct TaskFeeder<'a, T> {
    injector: &'a Injector<T>,
    pending: &'a AtomicUsize,
}

impl<T> TaskFeeder<'_, T> {
    /// Adds a task, eligible for any worker. At-least-once delivery; there is
    /// no cancellation.
    pub fn add(&self, task: T) {
        // Counted before it becomes visible so the drain condition can never
        // observe zero while this task is still queued.
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.injector.push(task);
    }
}

/// Runs `seed` tasks and everything they transitively feed on `threads`
/// workers. Each worker owns a state built by `make_state`; the states are
/// returned once the frontier is empty and all workers have stopped.
pub(crate) fn drain_with_feedback<T, S, MakeState, Run>(
    seed: Vec<T>,
    threads: usize,
    make_state: MakeState,
    run: Run,
) -> Vec<S>
where
    T: Send,
    S: Send,
    MakeState: Fn() -> S + Sync,
    Run: Fn(&mut S, T, &TaskFeeder<'_, T>) + Sync,
{
    let threads = threads.max(1);
    let injector = Injector::new();
    let pending = AtomicUsize::new(seed.len());
    for task in seed {
        injector.push(task);
    }

    let locals: Vec<Worker<T>> = (0..threads).map(|_| Worker::new_lifo()).collect();
    let stealers: Vec<Stealer<T>> = locals.iter().map(Worker::stealer).collect();

    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(threads);
        for (me, local) in locals.into_iter().enumerate() {
            let injector = &injector;
            let pending = &pending;
            let stealers = &stealers[..];
            let make_state = &make_state;
            let run = &run;
            handles.push(scope.spawn(move || {
                let mut state = make_state();
                let feeder = TaskFeeder { injector, pending };
                let backoff = Backoff::new();
                loop {
                    match local.pop().or_else(|| steal_task(injector, &local, stealers, me)) {
                        Some(task) => {
                            run(&mut state, task, &feeder);
                            // Decremented only after the task ran, so a task
                            // that is still feeding work keeps the pool alive.
                            pending.fetch_sub(1, Ordering::SeqCst);
                            backoff.reset();
                        }
                        None => {
                            if pending.load(Ordering::SeqCst) == 0 {
                                break;
                            }
                            backoff.snooze();
                        }
                    }
                }
                state
            }));
        }
        handles
            .into_iter()
            .map(|handle| handle.join().expect("worker thread panicked"))
            .collect()
    })
}

fn steal_task<T>(
    injector: &Injector<T>,
    local: &Worker<T>,
    stealers: &[Stealer<T>],
    me: usize,
) -> Option<T> {
    std::iter::repeat_with(|| {
        injector.steal_batch_and_pop(local).or_else(|| {
            stealers
                .iter()
                .enumerate()
                .filter(|&(other, _)| other != me)
                .map(|(_, stealer)| stealer.steal())
                .collect()
        })
    })
    .find(|steal: &Steal<T>| !steal.is_retry())
    .and_then(Steal::success)
}
