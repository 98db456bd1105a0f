use crate::error::GrammarResult;
use crate::model::logspace::log_add;
use crate::model::{BaseMeasure, RuleCounts};
use crate::rule::Rule;
use crate::tree::ROOT;
use serde::Serialize;
use std::collections::BTreeMap;

/// Exact joint log probability of the counted derivations under the
/// Dirichlet process: per tag, `Σ_r Σ_{k<c_r} ln(k + α·p0(r)) − Σ_{n<N} ln(n + α)`.
pub fn log_likelihood(counts: &RuleCounts, base: &BaseMeasure) -> GrammarResult<f64> {
    let alpha = counts.alpha();
    let log_alpha = alpha.ln();
    let mut total = 0.0;
    for (_, restaurant) in counts.iter() {
        for (rule, count) in restaurant.iter() {
            let log_base = log_alpha + base.log_probability(rule)?;
            for k in 0..count.max(0) {
                total += log_add((k as f64).ln(), log_base);
            }
        }
        for n in 0..restaurant.total().max(0) {
            total -= (n as f64 + alpha).ln();
        }
    }
    Ok(total)
}

/// Fragment nodes that are neither the root nor a leaf.
pub fn interior_nodes(rule: &Rule) -> usize {
    rule.fragment
        .nodes()
        .iter()
        .enumerate()
        .filter(|(id, node)| *id != ROOT && !node.is_leaf())
        .count()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GrammarStats {
    pub log_likelihood: f64,
    pub grammar_size: usize,
    pub total_rules: i64,
    pub mean_interior_nodes: f64,
    /// count -> number of distinct rules with that count
    pub histogram: BTreeMap<i64, usize>,
}

impl GrammarStats {
    pub fn collect(counts: &RuleCounts, base: &BaseMeasure) -> GrammarResult<Self> {
        let mut histogram = BTreeMap::new();
        let mut interior = 0usize;
        for (_, restaurant) in counts.iter() {
            for (rule, count) in restaurant.iter() {
                *histogram.entry(count).or_insert(0) += 1;
                interior += interior_nodes(rule);
            }
        }
        let grammar_size = counts.distinct_rules();
        Ok(Self {
            log_likelihood: log_likelihood(counts, base)?,
            grammar_size,
            total_rules: counts.total(),
            mean_interior_nodes: if grammar_size == 0 {
                0.0
            } else {
                interior as f64 / grammar_size as f64
            },
            histogram,
        })
    }
}
