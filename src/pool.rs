use super::{
    errors::PoolError,
    handle::{Job, TaskHandle},
    model::{PoolStatus, WorkerId},
};
use std::{
    any::Any,
    collections::{HashMap, VecDeque},
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard},
    thread,
};
use tokio::sync::oneshot;

/// Hook fired under the pool lock whenever a worker becomes idle: once at
/// worker start, after every completed task, and just before a worker blocks
/// waiting for work. External code uses it to detect quiescence.
///
/// The hook runs while the lock is held and must not call back into the pool.
pub type IdleHook = Arc<dyn Fn() + Send + Sync + 'static>;

/// Pool configuration.
#[derive(Clone)]
pub struct Config {
    pub initial_workers: usize,
    pub idle_hook: Option<IdleHook>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_workers: num_cpus::get(),
            idle_hook: None,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("initial_workers", &self.initial_workers)
            .field("idle_hook", &self.idle_hook.is_some())
            .finish()
    }
}

struct WorkerEntry {
    queue: VecDeque<Job>,
    /// Per-worker condvar bound to the one pool mutex, so affined
    /// submissions wake exactly their target.
    wake: Arc<Condvar>,
    idle: bool,
    join: Option<thread::JoinHandle<()>>,
}

/// Everything the pool mutex guards. Worker-id set, private queues, and the
/// free-affinity set stay mutually consistent because every mutation happens
/// through one of these fields while the lock is held.
struct Shared {
    global: VecDeque<Job>,
    workers: HashMap<WorkerId, WorkerEntry>,
    free_affinities: Vec<WorkerId>,
    retire_permits: usize,
    closing: bool,
    size: usize,
    next_id: u64,
}

struct Inner {
    shared: Mutex<Shared>,
    idle_hook: Option<IdleHook>,
}

impl Inner {
    fn fire_idle_hook(&self) {
        if let Some(hook) = &self.idle_hook {
            hook();
        }
    }
}

/// Dynamically resizable worker pool with per-task affinity.
///
/// Tasks go either on a shared global FIFO or on the private FIFO of one
/// specific worker. A worker always drains its private queue before taking
/// global work, which gives affined tasks priority on their target at the
/// cost of possible starvation of global work on a flooded worker.
///
/// Dropping the pool performs a graceful stop: no further submissions are
/// accepted, every queued task still runs, then all workers are joined.
pub struct Pool {
    inner: Arc<Inner>,
}

impl Pool {
    /// Creates a pool with `initial_workers` workers and no idle hook.
    pub fn new(initial_workers: usize) -> Self {
        Self::with_config(Config {
            initial_workers,
            ..Default::default()
        })
    }

    pub fn with_config(config: Config) -> Self {
        let inner = Arc::new(Inner {
            shared: Mutex::new(Shared {
                global: VecDeque::new(),
                workers: HashMap::new(),
                free_affinities: Vec::new(),
                retire_permits: 0,
                closing: false,
                size: 0,
                next_id: 0,
            }),
            idle_hook: config.idle_hook,
        });

        {
            let mut shared = inner.shared.lock().unwrap();
            for _ in 0..config.initial_workers {
                spawn_worker(&inner, &mut shared);
            }
        }

        Self { inner }
    }

    /// Submits a task with no affinity. Any live worker may run it; tasks on
    /// the global queue run in submission order.
    pub fn submit<F, R>(&self, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (job, handle) = package(f);
        let mut shared = self.lock();

        if shared.closing {
            return Err(PoolError::Closed);
        }

        shared.global.push_back(job);

        // Wake one idle worker; busy workers re-check the queues on their own.
        if let Some(entry) = shared.workers.values().find(|e| e.idle) {
            entry.wake.notify_one();
        }

        Ok(handle)
    }

    /// Submits a task pinned to `worker`. Only that worker ever runs it;
    /// tasks on one private queue run in submission order.
    pub fn submit_to<F, R>(&self, worker: WorkerId, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (job, handle) = package(f);
        let mut shared = self.lock();

        if shared.closing {
            return Err(PoolError::Closed);
        }

        let entry = shared
            .workers
            .get_mut(&worker)
            .ok_or(PoolError::InvalidAffinity)?;
        entry.queue.push_back(job);
        entry.wake.notify_one();

        Ok(handle)
    }

    /// Submits a task to whichever live candidate currently has the shortest
    /// private queue, ties broken by iteration order. Best-effort: the depth
    /// read and the enqueue are not serialized, so two concurrent submissions
    /// may pick the same momentarily-least-loaded worker. An empty candidate
    /// set, or one with no live members, degrades to an unaffined submission.
    pub fn submit_any<I, F, R>(&self, candidates: I, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        I: IntoIterator<Item = WorkerId>,
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let target = {
            let shared = self.lock();

            if shared.closing {
                return Err(PoolError::Closed);
            }

            let mut best: Option<(usize, WorkerId)> = None;
            for id in candidates {
                if let Some(entry) = shared.workers.get(&id) {
                    let depth = entry.queue.len();
                    if best.map_or(true, |(least, _)| depth < least) {
                        best = Some((depth, id));
                    }
                }
            }
            best.map(|(_, id)| id)
        };

        match target {
            Some(id) => self.submit_to(id, f),
            None => self.submit(f),
        }
    }

    /// Number of live workers. Shrinks lag behind `resize` until the retiring
    /// workers have actually claimed their permits.
    pub fn current_size(&self) -> usize {
        self.lock().size
    }

    pub fn status(&self) -> PoolStatus {
        let shared = self.lock();
        PoolStatus {
            workers: shared.size,
            queued_global: shared.global.len(),
            queued_private: shared.workers.values().map(|e| e.queue.len()).sum(),
            free_affinities: shared.free_affinities.len(),
            pending_retirements: shared.retire_permits,
        }
    }

    /// Grows or shrinks the pool to `new_size` workers.
    ///
    /// Growing spawns the missing workers before returning. Shrinking only
    /// hands out retirement permits and returns; each permit is claimed by
    /// the first worker that notices it while holding no private work, so the
    /// size converges to `new_size` asynchronously and no queued task is
    /// lost.
    pub fn resize(&self, new_size: usize) {
        let mut shared = self.lock();

        if shared.closing {
            return;
        }

        // Workers that have been told to retire but have not yet done so
        // count against the target, so back-to-back resizes reconcile
        // instead of compounding stale permits.
        let effective = shared.size - shared.retire_permits;
        if new_size == effective {
            return;
        }

        if new_size > effective {
            let cancelled = shared.retire_permits.min(new_size - effective);
            shared.retire_permits -= cancelled;
            while shared.size - shared.retire_permits < new_size {
                spawn_worker(&self.inner, &mut shared);
            }
            return;
        }

        shared.retire_permits += effective - new_size;
        for entry in shared.workers.values() {
            entry.wake.notify_all();
        }
    }

    /// Removes and returns one worker-id from the free-affinity set, giving
    /// the caller a worker it can repeatedly target via `submit_to`. The id
    /// is caller-managed from then on; the pool never reclaims it.
    ///
    /// With `create_if_none`, an empty free set spawns exactly one new
    /// worker first.
    pub fn allocate_affinity(&self, create_if_none: bool) -> Result<WorkerId, PoolError> {
        let mut shared = self.lock();

        if shared.closing {
            return Err(PoolError::Closed);
        }

        if shared.free_affinities.is_empty() && create_if_none {
            spawn_worker(&self.inner, &mut shared);
        }

        shared
            .free_affinities
            .pop()
            .ok_or(PoolError::AffinitiesExhausted)
    }

    /// Shuts down without draining: clears the global queue and every private
    /// queue, then joins all workers. Discarded tasks resolve their handles
    /// with `PoolError::Lost`; tasks already running finish normally.
    pub fn abort(&self) {
        let handles = {
            let mut shared = self.lock();

            shared.global.clear();
            shared.closing = true;

            let mut handles = Vec::with_capacity(shared.workers.len());
            for entry in shared.workers.values_mut() {
                entry.queue.clear();
                entry.wake.notify_all();
                if let Some(handle) = entry.join.take() {
                    handles.push(handle);
                }
            }
            handles
        };

        for handle in handles {
            let _ = handle.join();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        let handles = {
            let mut shared = self.lock();
            shared.closing = true;

            let mut handles = Vec::with_capacity(shared.workers.len());
            for entry in shared.workers.values_mut() {
                entry.wake.notify_all();
                if let Some(handle) = entry.join.take() {
                    handles.push(handle);
                }
            }
            handles
        };

        for handle in handles {
            let _ = handle.join();
        }
    }
}

/// Wraps a typed closure into a queueable job plus the handle observing it.
/// The job catches panics so a failing task resolves its handle instead of
/// taking down the worker.
fn package<F, R>(f: F) -> (Job, TaskHandle<R>)
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let job: Job = Box::new(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(f))
            .map_err(|payload| PoolError::Panicked(panic_message(payload.as_ref())));
        let _ = tx.send(result);
    });
    (job, TaskHandle::new(rx))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

/// Must be called with the pool lock held. Registers the new worker in the
/// worker set and the free-affinity set before its thread observes any
/// shared state.
fn spawn_worker(inner: &Arc<Inner>, shared: &mut Shared) -> WorkerId {
    let id = WorkerId(shared.next_id);
    shared.next_id += 1;

    let thread_inner = Arc::clone(inner);
    let join = thread::Builder::new()
        .name(format!("pool-{}", id))
        .spawn(move || worker_loop(thread_inner, id))
        .expect("failed to spawn pool worker thread");

    shared.workers.insert(
        id,
        WorkerEntry {
            queue: VecDeque::new(),
            wake: Arc::new(Condvar::new()),
            idle: false,
            join: Some(join),
        },
    );
    shared.free_affinities.push(id);
    shared.size += 1;

    id
}

fn worker_loop(inner: Arc<Inner>, id: WorkerId) {
    let mut shared = inner.shared.lock().unwrap();
    inner.fire_idle_hook();

    loop {
        if try_retire(&mut shared, id) {
            return;
        }

        // Private work first, then global. FIFO within each queue.
        let job = match shared
            .workers
            .get_mut(&id)
            .and_then(|entry| entry.queue.pop_front())
        {
            Some(job) => Some(job),
            None => shared.global.pop_front(),
        };

        if let Some(job) = job {
            drop(shared);
            job();
            shared = inner.shared.lock().unwrap();
            inner.fire_idle_hook();
            continue;
        }

        if shared.closing {
            return;
        }

        inner.fire_idle_hook();
        let wake = match shared.workers.get_mut(&id) {
            Some(entry) => {
                entry.idle = true;
                Arc::clone(&entry.wake)
            }
            None => return,
        };
        shared = wake.wait(shared).unwrap();
        if let Some(entry) = shared.workers.get_mut(&id) {
            entry.idle = false;
        }
    }
}

/// Claims one retirement permit if available and this worker's private queue
/// is empty, unregistering the worker entirely. A worker holding private work
/// leaves the permit for someone else; an affined task is never redirected.
fn try_retire(shared: &mut Shared, id: WorkerId) -> bool {
    if shared.retire_permits == 0 {
        return false;
    }

    let private_empty = shared.workers.get(&id).map_or(true, |e| e.queue.is_empty());
    if !private_empty {
        return false;
    }

    shared.retire_permits -= 1;
    // Dropping our own join handle detaches the thread; nothing joins a
    // retired worker.
    shared.workers.remove(&id);
    if let Some(pos) = shared.free_affinities.iter().position(|w| *w == id) {
        shared.free_affinities.remove(pos);
    }
    shared.size -= 1;

    true
}
