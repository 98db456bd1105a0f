use super::moves::{sample_instance, MoveContext, MoveStats};
use crate::corpus::TrainingInstance;
use crate::error::GrammarError;
use crate::model::RuleCounts;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error};

/// One sampling thread's private state: its random stream and counters.
/// Its count shard lives in `DistributedRuleCounts` at the same index.
pub struct Worker {
    pub id: usize,
    rng: fastrand::Rng,
    stats: MoveStats,
    failure: Option<GrammarError>,
}

/// The instances of one epoch, handed out one at a time.
pub(crate) struct WorkQueue<'a> {
    pub cells: Vec<Mutex<&'a mut TrainingInstance>>,
    pub order: &'a [usize],
    pub cursor: AtomicUsize,
    pub abort: AtomicBool,
}

impl<'a> WorkQueue<'a> {
    pub fn new(instances: &'a mut [TrainingInstance], order: &'a [usize]) -> Self {
        Self {
            cells: instances.iter_mut().map(Mutex::new).collect(),
            order,
            cursor: AtomicUsize::new(0),
            abort: AtomicBool::new(false),
        }
    }

    fn next(&self) -> Option<usize> {
        if self.abort.load(Ordering::Relaxed) {
            return None;
        }
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.order.get(slot).copied()
    }
}

impl Worker {
    pub fn new(id: usize, seed: Option<u64>) -> Self {
        let rng = if let Some(s) = seed {
            fastrand::Rng::with_seed(s)
        } else {
            fastrand::Rng::new()
        };
        Self {
            id,
            rng,
            stats: MoveStats::default(),
            failure: None,
        }
    }

    /// Samples instances from `queue` until it is empty, using only `shard`.
    /// The first error stops this worker and tells the others to stop.
    pub(crate) fn drain(&mut self, shard: &mut RuleCounts, queue: &WorkQueue, ctx: &MoveContext) {
        while let Some(index) = queue.next() {
            let mut guard = queue.cells[index].lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(e) = sample_instance(&mut **guard, shard, ctx, &mut self.rng, &mut self.stats) {
                error!("Worker {} failed on instance {}: {}", self.id, index, e);
                self.failure = Some(e);
                queue.abort.store(true, Ordering::Relaxed);
                return;
            }
        }
        debug!("Worker {} finished: {:?}", self.id, self.stats);
    }

    pub fn take_stats(&mut self) -> MoveStats {
        std::mem::take(&mut self.stats)
    }

    pub fn take_failure(&mut self) -> Option<GrammarError> {
        self.failure.take()
    }
}
