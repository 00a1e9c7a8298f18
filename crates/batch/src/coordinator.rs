use crate::aggregate::{BatchResult, BatchStatus, ResultAggregator};
use crate::error::{Error, ErrorKind, Result};
use crate::intake::{WorkItem, WorkKind};
use crate::options::BatchOptions;
use ddforge_engine::{CancellationToken, Engine, EngineOutcome, EngineStatus};
use ddforge_manifest::ManifestSynchronizer;
use ddforge_package::{ContainerAdapter, naming};
use exn::ResultExt;
use std::fs;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use tracing::instrument;

/// Progress events sent by a running batch.
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started) exactly once, then `Progress(0)`.
/// 2. [`Progress`](Self::Progress) and [`ItemFinished`](Self::ItemFinished),
///    once per processed item.
/// 3. `Progress(100)` once every item is done, unless the last item already
///    reported it (never after cancellation).
/// 4. [`Removed`](Self::Removed) once per processed item. An item whose
///    engine run was cancelled was not processed and stays queued.
/// 5. [`Finished`](Self::Finished) exactly once; nothing follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    /// The batch has begun with this many items.
    Started(usize),
    /// Overall completion, 0 to 100.
    Progress(u8),
    /// An item has been processed; the status covers that item alone.
    ItemFinished { id: String, status: BatchStatus },
    /// The item is done and should leave the pending work list.
    Removed(String),
    Finished(BatchResult),
}

/// What a finished batch hands back to whoever joins it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub result: BatchResult,
    /// Ids of every item that was processed, in order.
    pub processed: Vec<String>,
    /// The batch stopped early because cancellation was requested.
    pub cancelled: bool,
}

/// A batch running on its worker thread.
pub struct BatchHandle {
    events: Receiver<BatchEvent>,
    cancel: CancellationToken,
    worker: JoinHandle<BatchReport>,
}

impl BatchHandle {
    pub fn events(&self) -> &Receiver<BatchEvent> {
        &self.events
    }

    /// Ask the batch to stop. An engine run in progress is killed; no further
    /// items or arrangements are started.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the worker to finish.
    pub fn join(self) -> Result<BatchReport> {
        match self.worker.join() {
            Ok(report) => Ok(report),
            Err(_) => exn::bail!(ErrorKind::Worker),
        }
    }
}

/// Clears the running flag when the worker ends, however it ends.
struct RunGuard(Arc<AtomicBool>);

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).ok().map(|_| Self(flag.clone()))
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs batches of work items, one at a time, on a dedicated worker thread.
///
/// Items, and the arrangements inside each container, are processed strictly
/// one after another: there is only ever one engine process.
#[derive(Clone)]
pub struct BatchCoordinator {
    engine: Arc<dyn Engine>,
    containers: ContainerAdapter,
    manifests: ManifestSynchronizer,
    running: Arc<AtomicBool>,
}

impl BatchCoordinator {
    pub fn new(engine: Arc<dyn Engine>, containers: ContainerAdapter) -> Self {
        Self { engine, containers, manifests: ManifestSynchronizer::new(), running: Arc::default() }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start processing `items` with `options`.
    ///
    /// Returns `None` without doing anything if a batch is already running.
    pub fn start(&self, items: Vec<WorkItem>, options: BatchOptions) -> Result<Option<BatchHandle>> {
        let Some(guard) = RunGuard::acquire(&self.running) else {
            tracing::warn!("A batch is already running; ignoring start request");
            return Ok(None);
        };
        let (sender, events) = mpsc::channel();
        let cancel = CancellationToken::new();
        let worker = Worker {
            engine: self.engine.clone(),
            containers: self.containers.clone(),
            manifests: self.manifests,
            options,
            cancel: cancel.clone(),
            events: sender,
        };
        let worker = thread::Builder::new()
            .name("ddforge-batch".to_string())
            .spawn(move || {
                let _guard = guard;
                worker.run(items)
            })
            .or_raise(|| ErrorKind::Worker)?;
        Ok(Some(BatchHandle { events, cancel, worker }))
    }

    /// Start a batch and block until it is done, discarding events.
    pub fn run(&self, items: Vec<WorkItem>, options: BatchOptions) -> Result<Option<BatchReport>> {
        match self.start(items, options)? {
            Some(handle) => handle.join().map(Some),
            None => Ok(None),
        }
    }
}

/// Per-item progress increment: `100 / count`, truncated.
///
/// Increments do not generally add up to 100; progress is clamped and pinned
/// to 100 once every item is done.
pub fn progress_step(count: usize) -> u8 {
    match count {
        0 => 100,
        n => u8::try_from(100 / n).unwrap_or(100),
    }
}

struct Worker {
    engine: Arc<dyn Engine>,
    containers: ContainerAdapter,
    manifests: ManifestSynchronizer,
    options: BatchOptions,
    cancel: CancellationToken,
    events: Sender<BatchEvent>,
}

impl Worker {
    fn emit(&self, event: BatchEvent) {
        // Nobody listening is fine; the report is still returned on join.
        _ = self.events.send(event);
    }

    #[instrument(skip_all, fields(items = items.len(), mode = ?self.options.mode))]
    fn run(self, items: Vec<WorkItem>) -> BatchReport {
        self.emit(BatchEvent::Started(items.len()));
        self.emit(BatchEvent::Progress(0));
        let step = progress_step(items.len());
        let mut progress: u8 = 0;
        let mut aggregator = ResultAggregator::new();
        let mut processed = Vec::with_capacity(items.len());

        for item in &items {
            if self.cancel.is_cancelled() {
                tracing::info!("Batch cancelled; remaining items skipped");
                break;
            }
            let mark = aggregator.mark();
            let completed = match item.kind {
                WorkKind::LooseArrangement => self.process_loose(item, &mut aggregator),
                WorkKind::PackagedContainer => match self.process_container(item, &mut aggregator) {
                    Ok(completed) => completed,
                    Err(err) => {
                        tracing::error!(id = %item.id, error = ?err, "Container processing failed");
                        aggregator.record(None, EngineOutcome::new(EngineStatus::SystemError, failure_text(item, &err)));
                        true
                    },
                },
                WorkKind::Unrecognized => {
                    tracing::warn!(id = %item.id, "Skipping unrecognized item");
                    continue;
                },
            };
            if !completed {
                tracing::info!(id = %item.id, "Item interrupted by cancellation; it stays queued");
                break;
            }
            progress = progress.saturating_add(step).min(100);
            self.emit(BatchEvent::Progress(progress));
            self.emit(BatchEvent::ItemFinished { id: item.id.clone(), status: aggregator.status_since(mark) });
            processed.push(item);
        }

        if !self.options.clean {
            for item in processed.iter().filter(|item| item.kind == WorkKind::LooseArrangement) {
                carry_showlights(&item.path);
            }
        }

        let cancelled = self.cancel.is_cancelled();
        if !cancelled && progress < 100 {
            self.emit(BatchEvent::Progress(100));
        }
        let result = aggregator.finish();
        tracing::info!(status = %result.status, processed = processed.len(), cancelled, "Batch finished");
        for item in &processed {
            self.emit(BatchEvent::Removed(item.id.clone()));
        }
        self.emit(BatchEvent::Finished(result.clone()));
        BatchReport { result, processed: processed.into_iter().map(|item| item.id.clone()).collect(), cancelled }
    }

    /// Returns `false` if the run was cancelled before the engine finished.
    #[instrument(skip_all, fields(id = %item.id))]
    fn process_loose(&self, item: &WorkItem, aggregator: &mut ResultAggregator) -> bool {
        let invocation = self.options.loose_invocation(&item.path);
        let run = self.engine.run(&invocation, &self.cancel).or_raise(|| ErrorKind::Engine(item.path.clone()));
        let outcome = match run {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(error = ?err, "Engine could not be run");
                EngineOutcome::new(EngineStatus::SystemError, failure_text(item, &err))
            },
        };
        let completed = outcome.status != EngineStatus::Cancelled;
        aggregator.record(None, outcome);
        completed
    }

    /// Unpack, run every arrangement, resync manifests, then repack unless a
    /// run was fatal. The scratch tree is dropped on every path out of here.
    ///
    /// Returns `false` if cancellation interrupted the container.
    #[instrument(skip_all, fields(id = %item.id))]
    fn process_container(&self, item: &WorkItem, aggregator: &mut ResultAggregator) -> Result<bool> {
        let unpack = || ErrorKind::Unpack(item.path.clone());
        let unpacked = self.containers.unpack(&item.path).or_raise(unpack)?;
        let arrangements = unpacked.arrangements().or_raise(unpack)?;
        if arrangements.is_empty() {
            tracing::warn!("Container holds no arrangements; leaving it untouched");
            unpacked.close().or_raise(|| ErrorKind::Cleanup(item.path.clone()))?;
            return Ok(true);
        }

        let (mut fatal, mut interrupted) = (false, false);
        for arrangement in &arrangements {
            if self.cancel.is_cancelled() {
                interrupted = true;
                break;
            }
            let invocation = self.options.inner_invocation(arrangement);
            let outcome =
                self.engine.run(&invocation, &self.cancel).or_raise(|| ErrorKind::Engine(arrangement.clone()))?;
            let status = outcome.status;
            if status.produced_output() {
                match unpacked.manifest_for(arrangement).or_raise(unpack)? {
                    Some(record) => {
                        self.manifests.resync(arrangement, &record).or_raise(|| ErrorKind::Resync(arrangement.clone()))?;
                    },
                    None => tracing::debug!(arrangement = %arrangement.display(), "No manifest to resync"),
                }
            }
            let name = arrangement.file_stem().map(|stem| stem.to_string_lossy());
            aggregator.record(name.as_deref(), outcome);
            if status == EngineStatus::Cancelled {
                interrupted = true;
                break;
            }
            if status.is_fatal() {
                tracing::warn!(arrangement = %arrangement.display(), %status, "Aborting container");
                fatal = true;
                break;
            }
        }

        if !fatal && !interrupted {
            let target = unpacked.derived_path(self.options.mode).or_raise(|| ErrorKind::Repack(item.path.clone()))?;
            self.containers.repack(&unpacked, &target).or_raise(|| ErrorKind::Repack(item.path.clone()))?;
            if self.options.clean && target != item.path {
                fs::remove_file(&item.path).or_raise(|| ErrorKind::Cleanup(item.path.clone()))?;
                tracing::info!(removed = %item.path.display(), "Original container removed");
            }
        }
        unpacked.close().or_raise(|| ErrorKind::Cleanup(item.path.clone()))?;
        Ok(!interrupted)
    }
}

fn failure_text(item: &WorkItem, err: &Error) -> String {
    format!("{}: {}", item.id, err.deref())
}

/// Give the processed copy of a loose arrangement its own showlights file,
/// unless one is already there.
fn carry_showlights(arrangement: &Path) {
    let processed = naming::processed_arrangement_path(arrangement);
    let source = naming::showlights_path(arrangement);
    let target = naming::processed_showlights_path(arrangement);
    if processed.is_file() && source.is_file() && !target.exists() {
        match fs::copy(&source, &target) {
            Ok(_) => tracing::debug!(target = %target.display(), "Showlights carried over"),
            Err(error) => tracing::warn!(%error, target = %target.display(), "Could not carry over showlights"),
        }
    }
}
