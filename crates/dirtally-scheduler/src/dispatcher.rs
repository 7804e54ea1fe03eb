use std::cell::Cell;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use std::thread::JoinHandle;

use dirtally_core::panic_payload_to_str;
use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::LaneLayout;

pub type JobError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type JobResult = Result<(), JobError>;

type Job = Box<dyn FnOnce() -> JobResult + Send + 'static>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("lane {lane} does not exist (dispatcher has {total} lanes)")]
    UnknownLane { lane: usize, total: usize },
    #[error("dispatcher is shut down")]
    ShutDown,
    #[error("failed to spawn worker for lane {lane}: {source}")]
    Spawn {
        lane: usize,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub layout: LaneLayout,
    /// Backlog size at which a lane starts logging warnings.
    pub high_water_mark: usize,
    pub thread_name_prefix: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            layout: LaneLayout::default(),
            high_water_mark: 100_000,
            thread_name_prefix: "dirtally-lane".to_owned(),
        }
    }
}

/// Snapshot of one lane's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneStats {
    /// Queued plus running jobs.
    pub pending: usize,
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
}

struct LaneState {
    queue: VecDeque<Job>,
    pending: usize,
    shutdown: bool,
    /// Backlog that triggers the next high-water warning.
    next_warn_at: usize,
    warned: bool,
    stats: LaneStats,
}

struct Lane {
    state: Mutex<LaneState>,
    not_empty: Condvar,
    now_empty: Condvar,
}

struct Inner {
    layout: LaneLayout,
    high_water_mark: usize,
    lanes: Vec<Lane>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

thread_local! {
    static CURRENT_LANE: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Fixed set of single-worker FIFO lanes.
#[derive(Clone)]
pub struct JobDispatcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDispatcher")
            .field("layout", &self.inner.layout)
            .field("high_water_mark", &self.inner.high_water_mark)
            .finish()
    }
}

impl JobDispatcher {
    /// Creates the lanes and starts one worker thread per lane.
    pub fn start(config: DispatcherConfig) -> Result<Self, SchedulerError> {
        let high_water_mark = config.high_water_mark.max(1);
        let lanes = (0..config.layout.total())
            .map(|_| Lane {
                state: Mutex::new(LaneState {
                    queue: VecDeque::new(),
                    pending: 0,
                    shutdown: false,
                    next_warn_at: high_water_mark,
                    warned: false,
                    stats: LaneStats::default(),
                }),
                not_empty: Condvar::new(),
                now_empty: Condvar::new(),
            })
            .collect();

        let inner = Arc::new(Inner {
            layout: config.layout,
            high_water_mark,
            lanes,
            workers: Mutex::new(Vec::new()),
        });
        let dispatcher = Self { inner };

        for lane in 0..config.layout.total() {
            let inner = dispatcher.inner.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("{}-{lane}", config.thread_name_prefix))
                .spawn(move || run_lane(inner, lane));
            match spawned {
                Ok(handle) => dispatcher.inner.workers.lock().push(handle),
                Err(source) => {
                    dispatcher.shutdown();
                    return Err(SchedulerError::Spawn { lane, source });
                }
            }
        }

        tracing::debug!(
            target = "dirtally.scheduler",
            lanes = config.layout.total(),
            sharded = config.layout.sharded(),
            "dispatcher started"
        );
        Ok(dispatcher)
    }

    pub fn layout(&self) -> LaneLayout {
        self.inner.layout
    }

    /// Enqueues `job` on `lane` and wakes the lane's worker.
    ///
    /// Never waits for the lane to make progress. A lane whose backlog passes
    /// the high-water mark is logged, not throttled.
    pub fn submit<F>(&self, lane: usize, job: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() -> JobResult + Send + 'static,
    {
        let target = self.lane(lane)?;
        let mut state = target.state.lock();
        if state.shutdown {
            return Err(SchedulerError::ShutDown);
        }
        state.queue.push_back(Box::new(job));
        state.pending += 1;

        let backlog = state.queue.len();
        if backlog >= state.next_warn_at {
            tracing::warn!(
                target = "dirtally.scheduler",
                lane,
                backlog,
                high_water_mark = self.inner.high_water_mark,
                "lane backlog above high-water mark"
            );
            state.next_warn_at = backlog + self.inner.high_water_mark;
            state.warned = true;
        }
        drop(state);

        target.not_empty.notify_one();
        Ok(())
    }

    /// Submits `job` on the sharded lane owning `path`.
    pub fn submit_for_path<F>(&self, path: &std::path::Path, job: F) -> Result<(), SchedulerError>
    where
        F: FnOnce() -> JobResult + Send + 'static,
    {
        let lane = self.inner.layout.lane_for_path(path);
        self.submit(lane, job)
    }

    /// Blocks until every lane in `lanes` has no queued or running job.
    ///
    /// When called from a lane worker, that worker's own lane is skipped
    /// because its running job would never drain.
    pub fn wait_idle(&self, lanes: Range<usize>) {
        let current = CURRENT_LANE.with(Cell::get);
        let end = lanes.end.min(self.inner.lanes.len());
        for index in lanes.start..end {
            if current == Some(index) {
                continue;
            }
            let lane = &self.inner.lanes[index];
            let mut state = lane.state.lock();
            while state.pending > 0 && !state.shutdown {
                lane.now_empty.wait(&mut state);
            }
        }
    }

    /// Blocks until every sharded lane is idle.
    pub fn wait_sharded_idle(&self) {
        self.wait_idle(self.inner.layout.sharded_range());
    }

    pub fn lane_stats(&self, lane: usize) -> Result<LaneStats, SchedulerError> {
        let state = self.lane(lane)?.state.lock();
        Ok(LaneStats {
            pending: state.pending,
            ..state.stats
        })
    }

    /// Total queued plus running jobs across all lanes.
    pub fn pending(&self) -> usize {
        self.inner
            .lanes
            .iter()
            .map(|lane| lane.state.lock().pending)
            .sum()
    }

    /// Stops accepting jobs, lets every lane drain its queue, and joins the
    /// workers.
    pub fn shutdown(&self) {
        for lane in &self.inner.lanes {
            lane.state.lock().shutdown = true;
            lane.not_empty.notify_all();
        }

        let current = std::thread::current().id();
        let workers = std::mem::take(&mut *self.inner.workers.lock());
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!(target = "dirtally.scheduler", "lane worker panicked on exit");
            }
        }

        for lane in &self.inner.lanes {
            lane.now_empty.notify_all();
        }
    }

    fn lane(&self, lane: usize) -> Result<&Lane, SchedulerError> {
        self.inner
            .lanes
            .get(lane)
            .ok_or(SchedulerError::UnknownLane {
                lane,
                total: self.inner.lanes.len(),
            })
    }
}

enum Outcome {
    Ok,
    Failed,
    Panicked,
}

fn run_lane(inner: Arc<Inner>, index: usize) {
    CURRENT_LANE.with(|current| current.set(Some(index)));
    let lane = &inner.lanes[index];

    loop {
        let job = {
            let mut state = lane.state.lock();
            loop {
                if let Some(job) = state.queue.pop_front() {
                    break job;
                }
                if state.shutdown {
                    return;
                }
                lane.not_empty.wait(&mut state);
            }
        };

        let outcome = run_job(index, job);

        let mut state = lane.state.lock();
        state.pending = state.pending.saturating_sub(1);
        match outcome {
            Outcome::Ok => state.stats.completed += 1,
            Outcome::Failed => state.stats.failed += 1,
            Outcome::Panicked => state.stats.panicked += 1,
        }

        if state.warned && state.queue.len() < inner.high_water_mark / 2 {
            tracing::info!(
                target = "dirtally.scheduler",
                lane = index,
                backlog = state.queue.len(),
                "lane backlog drained below high-water mark"
            );
            state.warned = false;
            state.next_warn_at = inner.high_water_mark;
        }

        if state.pending == 0 {
            lane.now_empty.notify_all();
        }
    }
}

fn run_job(lane: usize, job: Job) -> Outcome {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)) {
        Ok(Ok(())) => Outcome::Ok,
        Ok(Err(err)) => {
            tracing::warn!(
                target = "dirtally.scheduler",
                lane,
                error = %err,
                "job failed"
            );
            Outcome::Failed
        }
        Err(panic) => {
            let message = panic_payload_to_str(&*panic);
            tracing::error!(
                target = "dirtally.scheduler",
                lane,
                panic = %message,
                "job panicked"
            );
            Outcome::Panicked
        }
    }
}
