use super::restaurant::{predictive_log_probability, RestaurantProcess};
use crate::dictionary::Symbol;
use crate::rule::Rule;
use fnv::FnvHashMap;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// One restaurant per root tag, created on first use. A tag nobody has
/// counted yet behaves like an empty restaurant.
#[derive(Debug, Clone)]
pub struct RuleCounts {
    alpha: f64,
    tables: FnvHashMap<Symbol, RestaurantProcess<Rule>>,
}

// An emptied restaurant is the same as one never created.
impl PartialEq for RuleCounts {
    fn eq(&self, other: &Self) -> bool {
        let occupied = |c: &RuleCounts| c.tables.values().filter(|r| !r.is_empty()).count();
        self.alpha == other.alpha
            && occupied(self) == occupied(other)
            && self
                .tables
                .iter()
                .filter(|(_, r)| !r.is_empty())
                .all(|(tag, r)| other.tables.get(tag) == Some(r))
    }
}

impl RuleCounts {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            tables: FnvHashMap::default(),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn restaurant(&self, tag: Symbol) -> Option<&RestaurantProcess<Rule>> {
        self.tables.get(&tag)
    }

    pub fn update(&mut self, rule: &Rule, delta: i64) {
        let alpha = self.alpha;
        self.tables
            .entry(rule.root_tag())
            .or_insert_with(|| RestaurantProcess::new(alpha))
            .update(rule, delta);
    }

    #[inline]
    pub fn increment(&mut self, rule: &Rule) {
        self.update(rule, 1);
    }

    #[inline]
    pub fn decrement(&mut self, rule: &Rule) {
        self.update(rule, -1);
    }

    pub fn count(&self, rule: &Rule) -> i64 {
        self.tables.get(&rule.root_tag()).map_or(0, |r| r.count(rule))
    }

    pub fn tag_total(&self, tag: Symbol) -> i64 {
        self.tables.get(&tag).map_or(0, |r| r.total())
    }

    pub fn log_probability(&self, rule: &Rule, log_p0: f64) -> f64 {
        self.log_probability_with_delta(rule, 0, 0, log_p0)
    }

    pub fn log_probability_with_delta(
        &self,
        rule: &Rule,
        delta_numerator: i64,
        delta_denominator: i64,
        log_p0: f64,
    ) -> f64 {
        match self.tables.get(&rule.root_tag()) {
            Some(r) => r.log_probability_with_delta(rule, delta_numerator, delta_denominator, log_p0),
            None => predictive_log_probability(self.alpha, delta_numerator, delta_denominator, log_p0),
        }
    }

    /// Tags in ascending id order.
    pub fn tags(&self) -> Vec<Symbol> {
        let mut tags: Vec<Symbol> = self.tables.keys().copied().collect();
        tags.sort_unstable();
        tags
    }

    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &RestaurantProcess<Rule>)> {
        self.tables.iter().map(|(&tag, r)| (tag, r))
    }

    /// Distinct rules with a non-zero count.
    pub fn distinct_rules(&self) -> usize {
        self.tables.values().map(|r| r.len()).sum()
    }

    pub fn total(&self) -> i64 {
        self.tables.values().map(|r| r.total()).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SyncReport {
    pub changed_rules: usize,
    pub elapsed: Duration,
}

/// Per-worker shards over one shared snapshot.
///
/// During an epoch worker `i` reads and writes only `shards[i]`. Every shard
/// starts the epoch equal to the snapshot, so at the barrier the exact corpus
/// count is `snapshot + Σ shards - T·snapshot`.
#[derive(Debug, Clone)]
pub struct DistributedRuleCounts {
    shards: Vec<RuleCounts>,
    snapshot: RuleCounts,
}

impl DistributedRuleCounts {
    pub fn new(num_shards: usize, alpha: f64) -> Self {
        Self {
            shards: vec![RuleCounts::new(alpha); num_shards.max(1)],
            snapshot: RuleCounts::new(alpha),
        }
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    pub fn snapshot(&self) -> &RuleCounts {
        &self.snapshot
    }

    pub fn shard(&self, i: usize) -> &RuleCounts {
        &self.shards[i]
    }

    pub fn shards_mut(&mut self) -> &mut [RuleCounts] {
        &mut self.shards
    }

    /// Loads initial counts straight into the snapshot and copies them out.
    pub fn seed<'a>(&mut self, rules: impl IntoIterator<Item = &'a Rule>) {
        for rule in rules {
            self.snapshot.increment(rule);
        }
        self.broadcast();
    }

    /// Merges the epoch's shard deltas into the snapshot, then resets every
    /// shard to it. Must only run while no worker holds a shard.
    pub fn synchronize(&mut self) -> SyncReport {
        let started = Instant::now();
        let factor = self.shards.len() as i64;

        let mut tags: Vec<Symbol> = self
            .shards
            .iter()
            .flat_map(|s| s.tables.keys().copied())
            .chain(self.snapshot.tables.keys().copied())
            .collect();
        tags.sort_unstable();
        tags.dedup();

        let shards = &self.shards;
        let snapshot = &self.snapshot;
        let deltas: Vec<(Rule, i64)> = tags
            .par_iter()
            .flat_map_iter(|&tag| {
                let mut delta: BTreeMap<&Rule, i64> = BTreeMap::new();
                for restaurant in shards.iter().filter_map(|s| s.restaurant(tag)) {
                    for (rule, count) in restaurant.iter() {
                        *delta.entry(rule).or_insert(0) += count;
                    }
                }
                if let Some(restaurant) = snapshot.restaurant(tag) {
                    for (rule, count) in restaurant.iter() {
                        *delta.entry(rule).or_insert(0) -= factor * count;
                    }
                }
                delta
                    .into_iter()
                    .filter(|&(_, d)| d != 0)
                    .map(|(rule, d)| (rule.clone(), d))
                    .collect::<Vec<_>>()
            })
            .collect();

        for (rule, delta) in &deltas {
            self.snapshot.update(rule, *delta);
        }
        self.broadcast();

        let report = SyncReport {
            changed_rules: deltas.len(),
            elapsed: started.elapsed(),
        };
        debug!(
            "Synchronized {} shards: {} rule deltas in {:.3}s",
            factor,
            report.changed_rules,
            report.elapsed.as_secs_f64()
        );
        report
    }

    fn broadcast(&mut self) {
        let snapshot = &self.snapshot;
        self.shards.par_iter_mut().for_each(|shard| shard.clone_from(snapshot));
    }
}
