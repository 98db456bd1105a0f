use crate::corpus::TrainingInstance;
use crate::dictionary::{Symbol, NULL_WORD_ID};
use crate::error::GrammarResult;
use crate::model::TranslationTable;
use crate::rule::Rule;
use std::collections::BTreeSet;
use std::sync::Arc;

/// A link between a fragment leaf position and a target position.
pub type Link = (usize, usize);

/// Derives word links inside rules from a pair of IBM Model 1 tables.
///
/// `forward` holds `t(target | source)`, `reverse` holds `t(source | target)`
/// keyed as `(target, source)`.
#[derive(Debug, Clone)]
pub struct LinkConstructor {
    forward: Arc<TranslationTable>,
    reverse: Arc<TranslationTable>,
}

/// Fragment leaves in order, paired with their source word when they are
/// terminals.
fn leaf_words(rule: &Rule) -> Vec<Option<Symbol>> {
    rule.fragment
        .leaves()
        .into_iter()
        .map(|id| {
            if rule.is_terminal_leaf(id) {
                rule.fragment.node(id).word
            } else {
                None
            }
        })
        .collect()
}

/// Position of the best candidate, provided it beats `floor`. Ties keep the
/// leftmost.
fn best_above(floor: f64, candidates: impl Iterator<Item = (usize, f64)>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (pos, p) in candidates {
        if p > floor && best.map_or(true, |(_, b)| p > b) {
            best = Some((pos, p));
        }
    }
    best.map(|(pos, _)| pos)
}

impl LinkConstructor {
    pub fn new(forward: Arc<TranslationTable>, reverse: Arc<TranslationTable>) -> Self {
        Self { forward, reverse }
    }

    /// Frontier variable `#k` (the k-th non-terminal leaf) to the target
    /// position of `#k`.
    pub fn nonterminal_links(&self, rule: &Rule) -> Vec<Link> {
        let variable_leaves: Vec<usize> = leaf_words(rule)
            .iter()
            .enumerate()
            .filter(|(_, word)| word.is_none())
            .map(|(pos, _)| pos)
            .collect();
        rule.target
            .iter()
            .enumerate()
            .filter_map(|(j, token)| {
                let k = token.var()?;
                variable_leaves.get(k).map(|&i| (i, j))
            })
            .collect()
    }

    /// Forward: every target terminal picks its most likely source leaf.
    /// Reverse: every source terminal picks its most likely target word.
    /// Either way the NULL word sets the bar to beat.
    pub fn terminal_links(&self, rule: &Rule, reverse: bool) -> Vec<Link> {
        let sources = leaf_words(rule);
        let mut links = Vec::new();
        if reverse {
            for (i, source) in sources.iter().enumerate() {
                let Some(s) = *source else { continue };
                let floor = self.reverse.probability(NULL_WORD_ID, s);
                let candidates = rule
                    .target
                    .iter()
                    .enumerate()
                    .filter_map(|(j, t)| t.word().map(|w| (j, self.reverse.probability(w, s))));
                if let Some(j) = best_above(floor, candidates) {
                    links.push((i, j));
                }
            }
        } else {
            for (j, token) in rule.target.iter().enumerate() {
                let Some(t) = token.word() else { continue };
                let floor = self.forward.probability(NULL_WORD_ID, t);
                let candidates = sources
                    .iter()
                    .enumerate()
                    .filter_map(|(i, s)| s.map(|s| (i, self.forward.probability(s, t))));
                if let Some(i) = best_above(floor, candidates) {
                    links.push((i, j));
                }
            }
        }
        links.sort_unstable();
        links
    }

    pub fn rule_links(&self, rule: &Rule, reverse: bool) -> Vec<Link> {
        let mut links = self.nonterminal_links(rule);
        links.extend(self.terminal_links(rule, reverse));
        links.sort_unstable();
        links.dedup();
        links
    }

    /// Word alignment induced by the current derivation of `instance`: the
    /// union of both directions' terminal links of every rule, in sentence
    /// positions.
    pub fn instance_alignment(&self, instance: &TrainingInstance) -> GrammarResult<Vec<Link>> {
        let mut alignment = BTreeSet::new();
        for rule in instance.rules()? {
            let leaves = rule.fragment.leaves();
            for reverse in [false, true] {
                for (i, j) in self.terminal_links(&rule, reverse) {
                    let source = rule.fragment.node(leaves[i]).word_index;
                    let target = rule.target[j].word_index();
                    if let (Some(s), Some(t)) = (source, target) {
                        alignment.insert((s, t));
                    }
                }
            }
        }
        Ok(alignment.into_iter().collect())
    }
}
