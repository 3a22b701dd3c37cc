//! Worker pool plus the notion of a single foreground (UI) thread.

use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

#[derive(Debug, Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

/// Decrements the in-flight count even when the task unwinds.
struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

pub struct Dispatcher {
    pool: ThreadPool,
    foreground: Mutex<Option<ThreadId>>,
    in_flight: Arc<InFlight>,
}

impl Dispatcher {
    /// Builds the pool. `worker_threads == 0` lets rayon pick.
    pub fn new(worker_threads: usize) -> Result<Self, ThreadPoolBuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(worker_threads)
            .thread_name(|index| format!("trace-blame-worker-{index}"))
            .panic_handler(|_| log::error!("Background task panicked"))
            .build()?;

        Ok(Self {
            pool,
            foreground: Mutex::new(None),
            in_flight: Arc::new(InFlight::default()),
        })
    }

    /// Marks the calling thread as the foreground context.
    pub fn register_foreground(&self) {
        *self.foreground.lock() = Some(thread::current().id());
    }

    pub fn is_foreground(&self) -> bool {
        *self.foreground.lock() == Some(thread::current().id())
    }

    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn spawn<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.in_flight.count.lock() += 1;
        let guard = InFlightGuard(Arc::clone(&self.in_flight));
        self.pool.spawn(move || {
            let _guard = guard;
            task();
        });
    }

    /// Runs `task` inline unless called from the foreground thread, in which
    /// case it is handed to a worker.
    pub fn run_off_foreground<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_foreground() {
            log::debug!("Redispatching work off the foreground thread");
            self.spawn(task);
        } else {
            task();
        }
    }

    /// Blocks until every spawned task has finished.
    pub fn wait_idle(&self) {
        let mut count = self.in_flight.count.lock();
        while *count > 0 {
            self.in_flight.idle.wait(&mut count);
        }
    }
}
