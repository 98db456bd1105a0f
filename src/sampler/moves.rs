//! Gibbs moves over one training instance.
//!
//! Both moves take their rules out of the counts, score every hypothesis
//! against what is left, commit one hypothesis and put its rules back. On
//! the "no change" hypothesis the saved annotations are written back as they
//! were, never recomputed.

use super::select::{select, Selection};
use super::spans::legal_spans;
use crate::corpus::TrainingInstance;
use crate::error::{GrammarError, GrammarResult};
use crate::model::{BaseMeasure, RuleCounts};
use crate::rule::Rule;
use crate::tree::{Annotation, NodeId, ROOT};
use serde::Serialize;

pub struct MoveContext<'a> {
    pub base: &'a BaseMeasure,
    pub selection: Selection,
    pub swaps: bool,
}

/// Counters for one worker over one epoch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MoveStats {
    pub instances: usize,
    pub span_moves: usize,
    pub span_changes: usize,
    pub swap_moves: usize,
    pub swaps_accepted: usize,
}

impl MoveStats {
    pub fn merge(&mut self, other: &MoveStats) {
        self.instances += other.instances;
        self.span_moves += other.span_moves;
        self.span_changes += other.span_changes;
        self.swap_moves += other.swap_moves;
        self.swaps_accepted += other.swaps_accepted;
    }
}

/// Joint log probability of rules drawn one after another: each rule sees
/// the earlier ones as extra customers.
pub fn score_rules(rules: &[&Rule], counts: &RuleCounts, base: &BaseMeasure) -> GrammarResult<f64> {
    let mut total = 0.0;
    for (i, rule) in rules.iter().enumerate() {
        let earlier = &rules[..i];
        let same_rule = earlier.iter().filter(|r| **r == *rule).count() as i64;
        let same_tag = earlier.iter().filter(|r| r.root_tag() == rule.root_tag()).count() as i64;
        let log_p0 = base.log_probability(rule)?;
        total += counts.log_probability_with_delta(rule, same_rule, same_tag, log_p0);
    }
    Ok(total)
}

/// Random order over the non-root nodes.
pub fn node_schedule(instance: &TrainingInstance, rng: &mut fastrand::Rng) -> Vec<NodeId> {
    let mut schedule: Vec<NodeId> = (1..instance.tree.len()).collect();
    rng.shuffle(&mut schedule);
    schedule
}

/// One full sweep: span resampling at every non-root node, then span swaps.
pub fn sample_instance(
    instance: &mut TrainingInstance,
    counts: &mut RuleCounts,
    ctx: &MoveContext,
    rng: &mut fastrand::Rng,
    stats: &mut MoveStats,
) -> GrammarResult<()> {
    if instance.is_parse_failure() {
        return Ok(());
    }
    let schedule = node_schedule(instance, rng);
    for &node in &schedule {
        resample_span(instance, node, counts, ctx, rng, stats)?;
    }
    if ctx.swaps {
        sample_swaps(instance, &schedule, counts, ctx, rng, stats)?;
    }
    stats.instances += 1;
    Ok(())
}

/// Resamples whether `node` is split and, if so, which target span it owns.
pub fn resample_span(
    instance: &mut TrainingInstance,
    node: NodeId,
    counts: &mut RuleCounts,
    ctx: &MoveContext,
    rng: &mut fastrand::Rng,
    stats: &mut MoveStats,
) -> GrammarResult<()> {
    let ancestor = instance
        .tree
        .split_ancestor(node)
        .ok_or_else(|| GrammarError::Invariant(format!("node {} has no split ancestor", node)))?;
    let saved = instance.tree.annotation(node);

    counts.decrement(&instance.rule_at(ancestor)?);
    if saved.split {
        counts.decrement(&instance.rule_at(node)?);
    }

    instance.tree.unsplit(node);
    let unsplit_rule = instance.rule_at(ancestor)?;
    let mut weights = vec![score_rules(&[&unsplit_rule], counts, ctx.base)?];

    // Marked split so that it is not counted among the ancestor's other
    // descendants; the span is filled in per hypothesis.
    instance.tree.set_annotation(node, Annotation { split: true, span: None });
    let spans = legal_spans(&instance.tree, node, ancestor)?;
    let mut hypotheses: Vec<(Rule, Rule)> = Vec::with_capacity(spans.len());
    for &span in &spans {
        instance.tree.set_split(node, span);
        let pair = (instance.rule_at(ancestor)?, instance.rule_at(node)?);
        weights.push(score_rules(&[&pair.0, &pair.1], counts, ctx.base)?);
        hypotheses.push(pair);
    }

    let choice = select(&weights, ctx.selection, rng)?;
    stats.span_moves += 1;
    if choice == 0 {
        if saved.split {
            instance.tree.unsplit(node);
        } else {
            instance.tree.set_annotation(node, saved);
        }
        counts.increment(&unsplit_rule);
    } else {
        instance.tree.set_split(node, spans[choice - 1]);
        let (ancestor_rule, node_rule) = &hypotheses[choice - 1];
        counts.increment(ancestor_rule);
        counts.increment(node_rule);
    }
    if instance.tree.annotation(node) != saved {
        stats.span_changes += 1;
    }
    Ok(())
}

/// For every split node (root first, then in schedule order), pairs up its
/// frontier split descendants at random and offers each pair a span swap.
pub fn sample_swaps(
    instance: &mut TrainingInstance,
    schedule: &[NodeId],
    counts: &mut RuleCounts,
    ctx: &MoveContext,
    rng: &mut fastrand::Rng,
    stats: &mut MoveStats,
) -> GrammarResult<()> {
    for &node in std::iter::once(&ROOT).chain(schedule) {
        if !instance.tree.is_split(node) {
            continue;
        }
        let mut frontier = instance.tree.frontier_split_descendants(node);
        if frontier.len() < 2 {
            continue;
        }
        rng.shuffle(&mut frontier);
        for pair in frontier.chunks_exact(2) {
            swap_spans(instance, node, pair[0], pair[1], counts, ctx, rng, stats)?;
        }
    }
    Ok(())
}

/// Offers `first` and `second` (frontier split descendants of `parent`)
/// each other's spans.
#[allow(clippy::too_many_arguments)]
pub fn swap_spans(
    instance: &mut TrainingInstance,
    parent: NodeId,
    first: NodeId,
    second: NodeId,
    counts: &mut RuleCounts,
    ctx: &MoveContext,
    rng: &mut fastrand::Rng,
    stats: &mut MoveStats,
) -> GrammarResult<()> {
    let saved_first = instance.tree.annotation(first);
    let saved_second = instance.tree.annotation(second);
    let (Some(first_span), Some(second_span)) = (saved_first.span, saved_second.span) else {
        return Err(GrammarError::Invariant(format!(
            "swap between {} and {} without spans",
            first, second
        )));
    };

    let current = [
        instance.rule_at(parent)?,
        instance.rule_at(first)?,
        instance.rule_at(second)?,
    ];
    for rule in &current {
        counts.decrement(rule);
    }
    let keep = score_rules(&[&current[0], &current[1], &current[2]], counts, ctx.base)?;

    instance.tree.set_split(first, second_span);
    instance.tree.set_split(second, first_span);
    let swapped = [
        instance.rule_at(parent)?,
        instance.rule_at(first)?,
        instance.rule_at(second)?,
    ];
    let swap = score_rules(&[&swapped[0], &swapped[1], &swapped[2]], counts, ctx.base)?;

    stats.swap_moves += 1;
    let committed = if select(&[keep, swap], ctx.selection, rng)? == 0 {
        instance.tree.set_annotation(first, saved_first);
        instance.tree.set_annotation(second, saved_second);
        &current
    } else {
        stats.swaps_accepted += 1;
        &swapped
    };
    for rule in committed {
        counts.increment(rule);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriorParams;
    use crate::corpus::Corpus;
    use crate::dictionary::TokenDictionary;
    use crate::tree::Span;

    fn setup(dict: &mut TokenDictionary) -> (Corpus, BaseMeasure, RuleCounts) {
        let corpus = Corpus::from_lines(
            &["(S (NP (DT the) (NN dog)) (VP (VBZ barks)))"],
            &["el perro ladra"],
            &["0-0 1-1 2-2"],
            dict,
        )
        .unwrap();
        let base = BaseMeasure::geometric(&corpus.instances, &PriorParams::default());
        let mut counts = RuleCounts::new(1.0);
        for rule in corpus.instances[0].rules().unwrap() {
            counts.increment(&rule);
        }
        (corpus, base, counts)
    }

    fn derivation_counts(instance: &TrainingInstance, alpha: f64) -> RuleCounts {
        let mut counts = RuleCounts::new(alpha);
        for rule in instance.rules().unwrap() {
            counts.increment(&rule);
        }
        counts
    }

    #[test]
    fn test_joint_scoring_counts_earlier_draws() {
        let mut dict = TokenDictionary::new();
        let (corpus, base, _) = setup(&mut dict);
        let rule = corpus.instances[0].rule_at(2).unwrap();
        let empty = RuleCounts::new(1.0);
        let p0 = base.log_probability(&rule).unwrap().exp();
        let joint = score_rules(&[&rule, &rule], &empty, &base).unwrap();
        // p0 * (1 + p0) / 2
        assert!((joint - (p0 * (1.0 + p0) / 2.0).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_resampling_keeps_counts_consistent() {
        let mut dict = TokenDictionary::new();
        let (mut corpus, base, mut counts) = setup(&mut dict);
        let ctx = MoveContext {
            base: &base,
            selection: Selection::Sample,
            swaps: true,
        };
        let mut rng = fastrand::Rng::with_seed(11);
        let mut stats = MoveStats::default();
        for _ in 0..50 {
            sample_instance(&mut corpus.instances[0], &mut counts, &ctx, &mut rng, &mut stats).unwrap();
            assert_eq!(counts, derivation_counts(&corpus.instances[0], 1.0));
            assert_eq!(corpus.instances[0].tree.span(ROOT), Some(Span::new(0, 3)));
        }
        assert_eq!(stats.instances, 50);
        assert_eq!(stats.span_moves, 50 * 5);
    }

    #[test]
    fn test_only_hypothesis_restores_annotation_exactly() {
        let mut dict = TokenDictionary::new();
        let (mut corpus, base, _) = setup(&mut dict);
        let instance = &mut corpus.instances[0];
        // NN owns all of NP's span, so DT has no legal span and H0 is the
        // only hypothesis.
        instance.tree.unsplit(2);
        instance.tree.set_split(3, Span::new(0, 2));
        let before = instance.tree.annotations();
        let mut counts = derivation_counts(instance, 1.0);

        let ctx = MoveContext {
            base: &base,
            selection: Selection::Sample,
            swaps: false,
        };
        let mut rng = fastrand::Rng::with_seed(5);
        let mut stats = MoveStats::default();
        resample_span(instance, 2, &mut counts, &ctx, &mut rng, &mut stats).unwrap();

        assert_eq!(instance.tree.annotations(), before);
        assert_eq!(stats.span_changes, 0);
        assert_eq!(counts, derivation_counts(instance, 1.0));
    }

    #[test]
    fn test_rejected_split_restores_annotation_exactly() {
        let mut dict = TokenDictionary::new();
        let (mut corpus, base, _) = setup(&mut dict);
        let instance = &mut corpus.instances[0];
        // NP and everything under it folds into the root rule.
        for id in 1..=3 {
            instance.tree.unsplit(id);
        }
        let before = instance.tree.annotations();

        let mut candidate = instance.tree.clone();
        candidate.set_annotation(1, Annotation { split: true, span: None });
        assert_eq!(legal_spans(&candidate, 1, ROOT).unwrap().len(), 3);

        // Heavy counts on the current root rule make "no split" the best
        // hypothesis.
        let mut counts = derivation_counts(instance, 1.0);
        let root_rule = instance.rule_at(ROOT).unwrap();
        for _ in 0..50 {
            counts.increment(&root_rule);
        }
        let counts_before = counts.clone();

        let ctx = MoveContext {
            base: &base,
            selection: Selection::Viterbi,
            swaps: false,
        };
        let mut rng = fastrand::Rng::with_seed(8);
        let mut stats = MoveStats::default();
        resample_span(instance, 1, &mut counts, &ctx, &mut rng, &mut stats).unwrap();

        assert_eq!(instance.tree.annotations(), before);
        assert_eq!(stats.span_moves, 1);
        assert_eq!(stats.span_changes, 0);
        assert_eq!(counts, counts_before);
    }

    #[test]
    fn test_rejected_swap_restores_annotations_exactly() {
        let mut dict = TokenDictionary::new();
        let corpus = Corpus::from_lines(
            &["(S (NP (NN dogs)) (VP (VBP bark)))"],
            &["hunde bellen"],
            &["0-0 1-1"],
            &mut dict,
        )
        .unwrap();
        let mut instance = corpus.instances[0].clone();
        let base = BaseMeasure::geometric(&corpus.instances, &PriorParams::default());
        instance.tree.unsplit(2);
        instance.tree.unsplit(4);
        let before = instance.tree.annotations();

        // The current derivation has been seen many times; the swapped one never.
        let mut counts = derivation_counts(&instance, 1.0);
        for rule in instance.rules().unwrap() {
            for _ in 0..20 {
                counts.increment(&rule);
            }
        }
        let counts_before = counts.clone();

        let ctx = MoveContext {
            base: &base,
            selection: Selection::Viterbi,
            swaps: true,
        };
        let mut rng = fastrand::Rng::with_seed(4);
        let mut stats = MoveStats::default();
        swap_spans(&mut instance, ROOT, 1, 3, &mut counts, &ctx, &mut rng, &mut stats).unwrap();

        assert_eq!(instance.tree.annotations(), before);
        assert_eq!(stats.swap_moves, 1);
        assert_eq!(stats.swaps_accepted, 0);
        assert_eq!(counts, counts_before);
    }

    #[test]
    fn test_swap_keeps_counts_consistent() {
        let mut dict = TokenDictionary::new();
        let corpus = Corpus::from_lines(
            &["(S (NP (NN dogs)) (VP (VBP bark)))"],
            &["hunde bellen"],
            &["0-0 1-1"],
            &mut dict,
        )
        .unwrap();
        let mut instance = corpus.instances[0].clone();
        let base = BaseMeasure::geometric(&corpus.instances, &PriorParams::default());
        let mut counts = derivation_counts(&instance, 1.0);
        let ctx = MoveContext {
            base: &base,
            selection: Selection::Sample,
            swaps: true,
        };
        let mut rng = fastrand::Rng::with_seed(2);
        let mut stats = MoveStats::default();
        for _ in 0..20 {
            // NP and VP are both frontier descendants of S once the
            // preterminals are merged into them.
            instance.tree.unsplit(2);
            instance.tree.unsplit(4);
            counts = derivation_counts(&instance, 1.0);
            swap_spans(&mut instance, ROOT, 1, 3, &mut counts, &ctx, &mut rng, &mut stats).unwrap();
            assert_eq!(counts, derivation_counts(&instance, 1.0));
            let a = instance.tree.span(1).unwrap();
            let b = instance.tree.span(3).unwrap();
            assert_ne!(a, b);
        }
        assert_eq!(stats.swap_moves, 20);
    }
}
