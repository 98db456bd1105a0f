use crate::corpus::TrainingInstance;
use crate::dictionary::Symbol;
use crate::error::{GrammarError, GrammarResult};
use crate::tree::{AnnotatedTree, NodeId};
use fnv::FnvHashMap;

/// Right-hand side of the production at `id`: the children's tags, or the
/// node's word for a preterminal. A bare variable leaf has an empty rhs.
pub fn production(tree: &AnnotatedTree, id: NodeId) -> Vec<Symbol> {
    let node = tree.node(id);
    if node.is_leaf() {
        node.word.into_iter().collect()
    } else {
        node.children().iter().map(|&c| tree.node(c).tag).collect()
    }
}

/// Maximum-likelihood PCFG read off the training trees.
#[derive(Debug, Clone, Default)]
pub struct PcfgTable {
    log_probs: FnvHashMap<Symbol, FnvHashMap<Vec<Symbol>, f64>>,
}

impl PcfgTable {
    pub fn from_corpus(instances: &[TrainingInstance]) -> Self {
        let mut counts: FnvHashMap<Symbol, FnvHashMap<Vec<Symbol>, f64>> = FnvHashMap::default();
        for instance in instances.iter().filter(|i| !i.is_parse_failure()) {
            let tree = &instance.tree;
            for id in 0..tree.len() {
                *counts
                    .entry(tree.node(id).tag)
                    .or_default()
                    .entry(production(tree, id))
                    .or_insert(0.0) += 1.0;
            }
        }

        for rhs_counts in counts.values_mut() {
            let total: f64 = rhs_counts.values().sum();
            for value in rhs_counts.values_mut() {
                *value = (*value / total).ln();
            }
        }
        Self { log_probs: counts }
    }

    /// Fails on a production never seen in training.
    pub fn log_probability(&self, lhs: Symbol, rhs: &[Symbol]) -> GrammarResult<f64> {
        self.log_probs
            .get(&lhs)
            .and_then(|table| table.get(rhs))
            .copied()
            .ok_or_else(|| GrammarError::UnseenProduction {
                lhs,
                rhs: rhs.to_vec(),
            })
    }

    pub fn len(&self) -> usize {
        self.log_probs.values().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.log_probs.is_empty()
    }
}
