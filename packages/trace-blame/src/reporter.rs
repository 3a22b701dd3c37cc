//! Entry points the host calls when something goes wrong.
//!
//! A [`Reporter`] owns the shared state (dedup registry, pending queue, worker
//! pool) and hands finished records back through a [`HostChannel`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::chain::Failure;
use crate::config::Config;
use crate::dedup::DedupRegistry;
use crate::dispatch::Dispatcher;
use crate::engine::Engine;
use crate::error::ResolutionFailure;
use crate::queue::PendingQueue;
use crate::record::BugRecord;
use crate::report;
use crate::symbols::{ComponentRef, Inventory};

/// Key used when saving a report itself fails.
pub const SAVE_FAILURE_KEY: &str = "Error while saving bug report";

static GLOBAL: OnceCell<Reporter> = OnceCell::new();

/// Severity attached to a host log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Log,
    Warning,
    Error,
    Assert,
    Exception,
}

/// Where the reporter sends its results.
pub trait HostChannel: Send + Sync {
    /// A record finished resolving and can be shown.
    fn record_ready(&self, record: &Arc<BugRecord>);

    /// Resolution of `record` failed; it has already been dropped from the queue.
    fn report_failure(&self, record: &BugRecord, failure: &ResolutionFailure);
}

/// Host channel that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHost;

impl HostChannel for LoggingHost {
    fn record_ready(&self, record: &Arc<BugRecord>) {
        log::info!(
            "Bug report ready: {} ({} affected, {} candidates)",
            record.error_message(),
            record.affected().len(),
            record.affected_candidate().len()
        );
    }

    fn report_failure(&self, record: &BugRecord, failure: &ResolutionFailure) {
        log::error!("Failed to analyze {:?}: {failure}", record.error_message());
    }
}

#[derive(Clone)]
pub struct Reporter {
    engine: Arc<Engine>,
    registry: Arc<DedupRegistry>,
    queue: Arc<PendingQueue>,
    dispatcher: Arc<Dispatcher>,
    host: Arc<dyn HostChannel>,
    inventory: Arc<dyn Inventory>,
    config: Arc<Config>,
}

impl Reporter {
    pub fn new(
        engine: Engine,
        inventory: Arc<dyn Inventory>,
        host: Arc<dyn HostChannel>,
        config: Config,
    ) -> anyhow::Result<Self> {
        let dispatcher = Dispatcher::new(config.worker_threads)?;
        log::debug!(
            "Starting reporter with {} worker threads",
            dispatcher.worker_count()
        );

        Ok(Self {
            engine: Arc::new(engine),
            registry: Arc::new(DedupRegistry::new()),
            queue: Arc::new(PendingQueue::new()),
            dispatcher: Arc::new(dispatcher),
            host,
            inventory,
            config: Arc::new(config),
        })
    }

    pub fn registry(&self) -> &DedupRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &PendingQueue {
        &self.queue
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Log callback. Only `LogLevel::Exception` entries become records.
    pub fn on_log_received(
        &self,
        condition: &str,
        trace: &str,
        level: LogLevel,
    ) -> Option<Arc<BugRecord>> {
        if level != LogLevel::Exception {
            return None;
        }
        self.admit(BugRecord::from_log_line(condition, trace))
    }

    /// Explicit reporting path. `blamed` components are treated as affected
    /// regardless of what the trace says.
    pub fn report_exception(
        &self,
        key: Option<&str>,
        failure: Failure,
        blamed: Vec<ComponentRef>,
    ) -> Option<Arc<BugRecord>> {
        let record = BugRecord::from_exception(key.map(str::to_string), failure).with_blamed(blamed);
        self.admit(record)
    }

    fn admit(&self, record: BugRecord) -> Option<Arc<BugRecord>> {
        if !self.registry.admit_fingerprint(record.fingerprint()) {
            return None;
        }

        let record = Arc::new(record);
        self.queue.push(Arc::clone(&record));
        self.schedule(Arc::clone(&record));
        Some(record)
    }

    fn schedule(&self, record: Arc<BugRecord>) {
        let reporter = self.clone();
        self.dispatcher.spawn(move || reporter.resolve(&record));
    }

    /// Makes `record` ready, moving the work to a worker when called from
    /// the foreground thread. Already-ready records are left alone.
    pub fn ready(&self, record: &Arc<BugRecord>) {
        if record.is_ready() {
            return;
        }
        if self.dispatcher.is_foreground() {
            self.schedule(Arc::clone(record));
        } else {
            self.resolve(record);
        }
    }

    fn resolve(&self, record: &Arc<BugRecord>) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            record.ready(&self.engine).map(|_| ())
        }))
        .unwrap_or_else(|payload| Err(ResolutionFailure::panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(()) => self.host.record_ready(record),
            Err(failure) => {
                self.queue.remove(record);
                log::error!("Dropping bug record {}: {failure}", record.fingerprint());
                self.host.report_failure(record, &failure);
            }
        }
    }

    /// Next record to display, removed from the queue.
    pub fn take_next_ready(&self) -> Option<Arc<BugRecord>> {
        self.queue.take_next_ready()
    }

    pub fn compact_summary(&self, record: &BugRecord) -> String {
        record.compact_summary(&self.config.labels)
    }

    /// Writes the report for `record` without blocking the foreground thread.
    /// A failed save is itself reported as a new failure.
    pub fn save_report(&self, record: Arc<BugRecord>, path: PathBuf) {
        let reporter = self.clone();
        self.dispatcher.run_off_foreground(move || {
            if let Err(err) = report::save_report(&record, reporter.inventory.as_ref(), &path) {
                log::error!("{SAVE_FAILURE_KEY}: {err:#}");
                let failure = Failure::new("IOException", format!("{err:#}"), "");
                reporter.report_exception(Some(SAVE_FAILURE_KEY), failure, Vec::new());
            }
        });
    }

    /// Blocks until no background work is pending.
    pub fn wait_idle(&self) {
        self.dispatcher.wait_idle();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Installs the process-wide reporter used by host integration glue.
/// Returns the reporter back if one was already installed.
pub fn install(reporter: Reporter) -> Result<(), Reporter> {
    GLOBAL.set(reporter)
}

pub fn global() -> Option<&'static Reporter> {
    GLOBAL.get()
}
