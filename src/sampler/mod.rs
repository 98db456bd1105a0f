pub mod moves;
pub mod select;
pub mod spans;
pub mod worker;

use self::moves::{MoveContext, MoveStats};
use self::worker::{WorkQueue, Worker};
use crate::config::Config;
use crate::corpus::TrainingInstance;
use crate::error::{GrammarError, GrammarResult};
use crate::model::{BaseMeasure, DistributedRuleCounts, RuleCounts};
use crate::stats::GrammarStats;
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};
use typed_builder::TypedBuilder;

pub use self::select::{select, Selection};

#[derive(Debug, Clone, TypedBuilder)]
pub struct SamplerOptions {
    #[builder(default = 1)]
    pub num_threads: usize,
    #[builder(default = 100)]
    pub epochs: usize,
    #[builder(default = 1.0)]
    pub alpha: f64,
    #[builder(default)]
    pub seed: Option<u64>,
    #[builder(default)]
    pub selection: Selection,
    #[builder(default = true)]
    pub swaps: bool,
    /// Only instances with index in `[start, end)` are resampled; the rest
    /// keep their seed derivation and still count.
    #[builder(default)]
    pub interval: Option<(usize, usize)>,
}

impl From<&Config> for SamplerOptions {
    fn from(cfg: &Config) -> Self {
        let interval = match (cfg.sampler.start_index, cfg.sampler.end_index) {
            (None, None) => None,
            (start, end) => Some((start.unwrap_or(0), end.unwrap_or(usize::MAX))),
        };
        Self {
            num_threads: cfg.sampler.threads,
            epochs: cfg.sampler.iterations,
            alpha: cfg.prior.alpha,
            seed: cfg.sampler.seed,
            selection: cfg.sampler.selection,
            swaps: !cfg.sampler.no_swaps,
            interval,
        }
    }
}

/// What one epoch did, reported after the barrier.
#[derive(Debug, Clone, Serialize)]
pub struct EpochReport {
    pub epoch: usize,
    pub moves: MoveStats,
    pub grammar: GrammarStats,
    pub sync_seconds: f64,
    pub epoch_seconds: f64,
}

/// Receives every epoch's report together with the synchronized counts and
/// the current annotations. An error aborts the run.
pub trait ProgressCallback: Send + Sync {
    fn on_epoch(&self, report: &EpochReport, counts: &RuleCounts, instances: &[TrainingInstance]) -> GrammarResult<()>;
}

/// Ignores every report.
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_epoch(&self, _: &EpochReport, _: &RuleCounts, _: &[TrainingInstance]) -> GrammarResult<()> {
        Ok(())
    }
}

/// Parallel Gibbs sampler over a corpus of annotated trees.
///
/// Each epoch, a fixed pool runs one task per worker; tasks pull instances
/// off a shared cursor and sample them against their private count shard.
/// After the barrier the shards are merged into the snapshot.
pub struct Sampler {
    instances: Vec<TrainingInstance>,
    active: Vec<usize>,
    counts: DistributedRuleCounts,
    base: BaseMeasure,
    options: SamplerOptions,
    workers: Vec<Worker>,
    pool: rayon::ThreadPool,
    rng: fastrand::Rng,
}

impl Sampler {
    /// Seeds the counts from the current annotations of `instances`.
    pub fn new(instances: Vec<TrainingInstance>, base: BaseMeasure, options: SamplerOptions) -> GrammarResult<Self> {
        let num_threads = options.num_threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("sampler-{}", i))
            .build()
            .map_err(|e| GrammarError::ThreadPool(e.to_string()))?;

        let (start, end) = options.interval.unwrap_or((0, usize::MAX));
        let active: Vec<usize> = (0..instances.len())
            .filter(|&i| i >= start && i < end && !instances[i].is_parse_failure())
            .collect();

        let derivations = instances
            .par_iter()
            .map(|i| i.rules())
            .collect::<GrammarResult<Vec<_>>>()?;
        let mut counts = DistributedRuleCounts::new(num_threads, options.alpha);
        counts.seed(derivations.iter().flatten());
        info!(
            "🌱 Seeded {} rules ({} distinct) from {} instances, {} to sample",
            counts.snapshot().total(),
            counts.snapshot().distinct_rules(),
            instances.len(),
            active.len()
        );

        let workers = (0..num_threads)
            .map(|i| Worker::new(i, options.seed.map(|s| s.wrapping_add(i as u64))))
            .collect();
        let rng = if let Some(s) = options.seed {
            fastrand::Rng::with_seed(s.wrapping_add(9999))
        } else {
            fastrand::Rng::new()
        };

        Ok(Self {
            instances,
            active,
            counts,
            base,
            options,
            workers,
            pool,
            rng,
        })
    }

    pub fn instances(&self) -> &[TrainingInstance] {
        &self.instances
    }

    pub fn into_instances(self) -> Vec<TrainingInstance> {
        self.instances
    }

    /// Corpus-wide counts as of the last synchronization.
    pub fn counts(&self) -> &RuleCounts {
        self.counts.snapshot()
    }

    pub fn distributed_counts(&self) -> &DistributedRuleCounts {
        &self.counts
    }

    pub fn base(&self) -> &BaseMeasure {
        &self.base
    }

    pub fn stats(&self) -> GrammarResult<GrammarStats> {
        GrammarStats::collect(self.counts.snapshot(), &self.base)
    }

    /// Runs every configured epoch, reporting after each one.
    pub fn run<CB: ProgressCallback>(&mut self, callback: &CB) -> GrammarResult<Vec<EpochReport>> {
        info!(
            "🚀 Sampling {} epochs on {} threads (alpha={}, selection={}, swaps={})",
            self.options.epochs,
            self.workers.len(),
            self.options.alpha,
            self.options.selection,
            self.options.swaps
        );
        let mut reports = Vec::with_capacity(self.options.epochs);
        for epoch in 1..=self.options.epochs {
            let report = self.run_epoch(epoch)?;
            info!(
                "Epoch {:>4} | log-likelihood {:.4} | {} rules | {:.2}s",
                epoch, report.grammar.log_likelihood, report.grammar.grammar_size, report.epoch_seconds
            );
            callback.on_epoch(&report, self.counts.snapshot(), &self.instances)?;
            reports.push(report);
        }
        Ok(reports)
    }

    /// One sweep over the active instances followed by synchronization.
    pub fn run_epoch(&mut self, epoch: usize) -> GrammarResult<EpochReport> {
        let started = Instant::now();
        let mut order = self.active.clone();
        self.rng.shuffle(&mut order);

        let ctx = MoveContext {
            base: &self.base,
            selection: self.options.selection,
            swaps: self.options.swaps,
        };
        {
            let queue = WorkQueue::new(&mut self.instances, &order);
            let shards = self.counts.shards_mut();
            let workers = &mut self.workers;
            self.pool.scope(|scope| {
                for (worker, shard) in workers.iter_mut().zip(shards.iter_mut()) {
                    let queue = &queue;
                    let ctx = &ctx;
                    scope.spawn(move |_| worker.drain(shard, queue, ctx));
                }
            });
        }

        let mut moves = MoveStats::default();
        for worker in &mut self.workers {
            if let Some(e) = worker.take_failure() {
                return Err(e);
            }
            moves.merge(&worker.take_stats());
        }

        let sync = self.counts.synchronize();
        debug!("Epoch {} moves: {:?}", epoch, moves);
        let grammar = GrammarStats::collect(self.counts.snapshot(), &self.base)?;

        Ok(EpochReport {
            epoch,
            moves,
            grammar,
            sync_seconds: sync.elapsed.as_secs_f64(),
            epoch_seconds: started.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriorParams;
    use crate::corpus::Corpus;
    use crate::dictionary::TokenDictionary;

    fn corpus(dict: &mut TokenDictionary) -> Corpus {
        Corpus::from_lines(
            &[
                "(S (NP (DT the) (NN dog)) (VP (VBZ barks)))",
                "(S (NP (DT the) (NN cat)) (VP (VBZ sleeps)))",
                "()",
            ],
            &["el perro ladra", "el gato duerme", "x"],
            &["0-0 1-1 2-2", "0-0 1-1 2-2", ""],
            dict,
        )
        .unwrap()
    }

    fn recount(instances: &[TrainingInstance]) -> RuleCounts {
        let mut counts = RuleCounts::new(1.0);
        for instance in instances {
            for rule in instance.rules().unwrap() {
                counts.increment(&rule);
            }
        }
        counts
    }

    #[test]
    fn test_snapshot_matches_derivations_after_each_epoch() {
        let mut dict = TokenDictionary::new();
        let corpus = corpus(&mut dict);
        let base = BaseMeasure::geometric(&corpus.instances, &PriorParams::default());
        let options = SamplerOptions::builder().num_threads(2).epochs(3).seed(Some(4)).build();
        let mut sampler = Sampler::new(corpus.instances, base, options).unwrap();
        for epoch in 1..=3 {
            let report = sampler.run_epoch(epoch).unwrap();
            assert_eq!(report.moves.instances, 2);
            assert_eq!(sampler.counts(), &recount(sampler.instances()));
            for i in 0..2 {
                assert_eq!(sampler.distributed_counts().shard(i), sampler.counts());
            }
        }
    }

    #[test]
    fn test_interval_limits_sampled_instances() {
        let mut dict = TokenDictionary::new();
        let corpus = corpus(&mut dict);
        let before = corpus.instances[1].tree.annotations();
        let base = BaseMeasure::geometric(&corpus.instances, &PriorParams::default());
        let options = SamplerOptions::builder().interval(Some((0, 1))).seed(Some(1)).build();
        let mut sampler = Sampler::new(corpus.instances, base, options).unwrap();
        let report = sampler.run_epoch(1).unwrap();
        assert_eq!(report.moves.instances, 1);
        assert_eq!(sampler.instances()[1].tree.annotations(), before);
    }
}
