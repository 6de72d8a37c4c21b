//! Worker pool and priority queue.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, trace};
use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::task::{Priority, TaskId, TaskRef};

/// One heap entry. Entries are immutable; priority or restart changes
/// push a fresh entry with a bumped epoch and the stale one is skipped
/// at dispatch time.
struct QueueEntry {
    priority: Priority,
    seq: u64,
    epoch: u64,
    task: TaskRef,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: highest priority first, FIFO within a priority.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct TaskState {
    epoch: u64,
    /// Priority the task's live heap entry was keyed under.
    keyed: Priority,
    running: bool,
    restart: bool,
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<QueueEntry>,
    states: HashMap<TaskId, TaskState>,
    next_seq: u64,
}

impl Queue {
    fn push(&mut self, task: TaskRef, epoch: u64) {
        let priority = task.priority();
        if let Some(state) = self.states.get_mut(&task.id()) {
            state.keyed = priority;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueueEntry {
            priority,
            seq,
            epoch,
            task,
        });
    }

    /// Pops the next dispatchable entry, dropping stale ones.
    fn take_next(&mut self) -> Option<TaskRef> {
        while let Some(entry) = self.heap.pop() {
            let Some(state) = self.states.get_mut(&entry.task.id()) else {
                continue;
            };
            if state.running || state.epoch != entry.epoch {
                continue;
            }
            let current = entry.task.priority();
            if current != entry.priority {
                // Priority changed since enqueue: re-key and retry.
                state.keyed = current;
                let seq = self.next_seq;
                self.next_seq += 1;
                self.heap.push(QueueEntry {
                    priority: current,
                    seq,
                    epoch: entry.epoch,
                    task: entry.task,
                });
                continue;
            }
            state.running = true;
            return Some(entry.task);
        }
        None
    }
}

struct Inner {
    queue: Mutex<Queue>,
    available: Condvar,
    shutdown: AtomicBool,
    next_task_id: AtomicU64,
}

/// Shared scheduler dispatching tasks to a pool of worker threads.
pub struct Scheduler {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Creates a scheduler with `num_workers` worker threads.
    ///
    /// # Errors
    /// Returns [`Error::NoWorkers`] if `num_workers` is zero and
    /// [`Error::Spawn`] if the OS refuses a worker thread.
    pub fn new(num_workers: usize) -> Result<Arc<Self>> {
        if num_workers == 0 {
            return Err(Error::NoWorkers);
        }

        let inner = Arc::new(Inner {
            queue: Mutex::new(Queue::default()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_task_id: AtomicU64::new(1),
        });

        let mut workers = Vec::with_capacity(num_workers);
        for n in 0..num_workers {
            let inner = Arc::clone(&inner);
            let handle = std::thread::Builder::new()
                .name(format!("emstack-worker-{n}"))
                .spawn(move || worker_loop(&inner))?;
            workers.push(handle);
        }

        Ok(Arc::new(Self {
            inner,
            workers: Mutex::new(workers),
        }))
    }

    /// Creates a scheduler sized to the machine's available parallelism.
    ///
    /// # Errors
    /// Returns an error if worker threads cannot be spawned.
    pub fn with_default_workers() -> Result<Arc<Self>> {
        let workers = std::thread::available_parallelism().map_or(2, std::num::NonZeroUsize::get);
        Self::new(workers)
    }

    /// Returns a fresh task identity.
    pub fn next_task_id(&self) -> TaskId {
        self.inner
            .next_task_id
            .fetch_add(1, AtomicOrdering::Relaxed)
    }

    /// Submits a task for execution.
    ///
    /// If the task is idle it is enqueued. If it is already queued its
    /// queue position is refreshed (picking up a priority change). If it
    /// is running it is marked for restart and re-enqueued when the
    /// current run returns.
    ///
    /// # Errors
    /// Returns [`Error::Shutdown`] after [`shutdown`](Self::shutdown).
    pub fn submit(&self, task: &TaskRef) -> Result<()> {
        if self.inner.shutdown.load(AtomicOrdering::SeqCst) {
            return Err(Error::Shutdown);
        }

        let mut queue = self.inner.queue.lock();
        let id = task.id();
        match queue.states.get_mut(&id) {
            None => {
                queue.states.insert(id, TaskState::default());
                queue.push(Arc::clone(task), 0);
                trace!("submit task {id} ({})", task.description());
            }
            Some(state) if state.running => {
                state.restart = true;
                trace!("task {id} running, marked for restart");
                return Ok(());
            }
            Some(state) => {
                state.epoch += 1;
                let epoch = state.epoch;
                queue.push(Arc::clone(task), epoch);
                trace!("task {id} re-keyed at epoch {epoch}");
            }
        }
        drop(queue);
        self.inner.available.notify_one();
        Ok(())
    }

    /// Refreshes the queue position of a queued task after a priority
    /// change. A no-op when the priority matches the one the task is
    /// already keyed under. Running or idle tasks are left alone; their
    /// next submission reads the new priority anyway.
    pub fn change_priority(&self, task: &TaskRef) {
        let mut queue = self.inner.queue.lock();
        let id = task.id();
        let epoch = match queue.states.get_mut(&id) {
            Some(state) if !state.running && state.keyed != task.priority() => {
                state.epoch += 1;
                state.epoch
            }
            _ => return,
        };
        queue.push(Arc::clone(task), epoch);
    }

    /// Number of tasks currently queued or running.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.inner.queue.lock().states.len()
    }

    /// Stops accepting tasks, wakes all workers and joins them. Queued
    /// tasks that have not started are dropped.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, AtomicOrdering::SeqCst) {
            return;
        }
        debug!("scheduler shutting down");
        self.inner.available.notify_all();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            let _ = handle.join();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(inner: &Inner) {
    loop {
        let task = {
            let mut queue = inner.queue.lock();
            loop {
                if inner.shutdown.load(AtomicOrdering::SeqCst) {
                    return;
                }
                if let Some(task) = queue.take_next() {
                    break task;
                }
                inner.available.wait(&mut queue);
            }
        };

        let id = task.id();
        trace!("task {id} started: {}", task.description());
        task.run();
        trace!("task {id} finished");

        let mut queue = inner.queue.lock();
        let restart = match queue.states.get_mut(&id) {
            Some(state) => {
                state.running = false;
                if state.restart {
                    state.restart = false;
                    state.epoch += 1;
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if restart {
            let epoch = queue.states[&id].epoch;
            queue.push(task, epoch);
            drop(queue);
            inner.available.notify_one();
        } else {
            queue.states.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use crossbeam_channel::{bounded, Sender};
    use std::sync::atomic::AtomicU8;
    use std::sync::Mutex as StdMutex;

    struct RecordingTask {
        id: TaskId,
        priority: AtomicU8,
        log: Arc<StdMutex<Vec<TaskId>>>,
        gate: Option<crossbeam_channel::Receiver<()>>,
        started: Option<Sender<()>>,
    }

    impl RecordingTask {
        fn new(id: TaskId, priority: Priority, log: &Arc<StdMutex<Vec<TaskId>>>) -> TaskRef {
            Arc::new(Self {
                id,
                priority: AtomicU8::new(priority.as_u8()),
                log: Arc::clone(log),
                gate: None,
                started: None,
            })
        }

        fn gated(
            id: TaskId,
            log: &Arc<StdMutex<Vec<TaskId>>>,
        ) -> (TaskRef, Sender<()>, crossbeam_channel::Receiver<()>) {
            let (release_tx, release_rx) = bounded(1);
            let (started_tx, started_rx) = bounded(1);
            let task: TaskRef = Arc::new(Self {
                id,
                priority: AtomicU8::new(Priority::Normal.as_u8()),
                log: Arc::clone(log),
                gate: Some(release_rx),
                started: Some(started_tx),
            });
            (task, release_tx, started_rx)
        }
    }

    impl Task for RecordingTask {
        fn id(&self) -> TaskId {
            self.id
        }

        fn description(&self) -> String {
            format!("recording task {}", self.id)
        }

        fn priority(&self) -> Priority {
            Priority::from_u8(self.priority.load(AtomicOrdering::SeqCst))
        }

        fn run(&self) {
            if let Some(started) = &self.started {
                let _ = started.send(());
            }
            if let Some(gate) = &self.gate {
                let _ = gate.recv();
            }
            self.log.lock().unwrap().push(self.id);
        }
    }

    fn init_logs() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn wait_until_idle(scheduler: &Scheduler) {
        while scheduler.active_tasks() > 0 {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    #[test]
    fn dispatches_by_priority_then_fifo() {
        init_logs();
        let scheduler = Scheduler::new(1).unwrap();
        let log = Arc::new(StdMutex::new(Vec::new()));

        // Hold the single worker so later submissions pile up.
        let (blocker, release, started) = RecordingTask::gated(scheduler.next_task_id(), &log);
        scheduler.submit(&blocker).unwrap();
        started.recv().unwrap();

        let low = RecordingTask::new(scheduler.next_task_id(), Priority::Low, &log);
        let high = RecordingTask::new(scheduler.next_task_id(), Priority::VeryHigh, &log);
        let normal_a = RecordingTask::new(scheduler.next_task_id(), Priority::Normal, &log);
        let normal_b = RecordingTask::new(scheduler.next_task_id(), Priority::Normal, &log);
        for task in [&low, &high, &normal_a, &normal_b] {
            scheduler.submit(task).unwrap();
        }

        release.send(()).unwrap();
        wait_until_idle(&scheduler);

        let order = log.lock().unwrap().clone();
        assert_eq!(
            order,
            vec![
                blocker.id(),
                high.id(),
                normal_a.id(),
                normal_b.id(),
                low.id()
            ]
        );
    }

    #[test]
    fn resubmit_while_running_restarts() {
        init_logs();
        let scheduler = Scheduler::new(1).unwrap();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let (task, release, started) = RecordingTask::gated(scheduler.next_task_id(), &log);
        scheduler.submit(&task).unwrap();
        started.recv().unwrap();

        // Already running: this marks it for restart.
        scheduler.submit(&task).unwrap();
        release.send(()).unwrap();

        // Second run needs the gate released again.
        started.recv().unwrap();
        release.send(()).unwrap();
        wait_until_idle(&scheduler);

        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn priority_change_while_queued_takes_effect() {
        init_logs();
        let scheduler = Scheduler::new(1).unwrap();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let (blocker, release, started) = RecordingTask::gated(scheduler.next_task_id(), &log);
        scheduler.submit(&blocker).unwrap();
        started.recv().unwrap();

        let first = RecordingTask::new(scheduler.next_task_id(), Priority::Normal, &log);
        let second_concrete = Arc::new(RecordingTask {
            id: scheduler.next_task_id(),
            priority: AtomicU8::new(Priority::Low.as_u8()),
            log: Arc::clone(&log),
            gate: None,
            started: None,
        });
        let second: TaskRef = second_concrete.clone();
        scheduler.submit(&first).unwrap();
        scheduler.submit(&second).unwrap();

        // Raise the late task above the earlier one, then re-key it.
        second_concrete
            .priority
            .store(Priority::VeryHigh.as_u8(), AtomicOrdering::SeqCst);
        scheduler.change_priority(&second);

        release.send(()).unwrap();
        wait_until_idle(&scheduler);

        let order = log.lock().unwrap().clone();
        assert_eq!(order, vec![blocker.id(), second.id(), first.id()]);
    }

    #[test]
    fn unchanged_priority_does_not_grow_the_queue() {
        init_logs();
        let scheduler = Scheduler::new(1).unwrap();
        let log = Arc::new(StdMutex::new(Vec::new()));

        let (blocker, release, started) = RecordingTask::gated(scheduler.next_task_id(), &log);
        scheduler.submit(&blocker).unwrap();
        started.recv().unwrap();

        let task = RecordingTask::new(scheduler.next_task_id(), Priority::Low, &log);
        scheduler.submit(&task).unwrap();

        // Re-keying with the same priority would leave a stale heap
        // entry behind for every call.
        let before = scheduler.inner.queue.lock().heap.len();
        for _ in 0..8 {
            scheduler.change_priority(&task);
        }
        assert_eq!(scheduler.inner.queue.lock().heap.len(), before);

        release.send(()).unwrap();
        wait_until_idle(&scheduler);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn spawn_failures_carry_the_os_error() {
        let err = Error::from(std::io::Error::from(std::io::ErrorKind::WouldBlock));
        assert!(matches!(err, Error::Spawn(_)));
        assert!(err.to_string().contains("spawn"));
    }

    #[test]
    fn submit_after_shutdown_fails() {
        let scheduler = Scheduler::new(1).unwrap();
        scheduler.shutdown();
        let log = Arc::new(StdMutex::new(Vec::new()));
        let task = RecordingTask::new(1, Priority::Normal, &log);
        assert!(matches!(scheduler.submit(&task), Err(Error::Shutdown)));
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(matches!(Scheduler::new(0), Err(Error::NoWorkers)));
    }
}
