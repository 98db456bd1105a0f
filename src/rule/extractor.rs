use super::{Rule, TargetToken};
use crate::error::{GrammarError, GrammarResult};
use crate::tree::{AnnotatedTree, NodeId, ROOT};

/// Minimal rule rooted at split node `node`.
///
/// The target side walks the node's span; every maximal run of positions
/// owned by the same frontier variable collapses into one `Var(k)`, with `k`
/// the variable's position among the fragment's wordless leaves.
pub fn extract_rule(tree: &AnnotatedTree, target: &[TargetToken], node: NodeId) -> GrammarResult<Rule> {
    let span = match (tree.is_split(node), tree.span(node)) {
        (true, Some(span)) => span,
        _ => {
            return Err(GrammarError::Invariant(format!(
                "rule requested at node {} which has no split span",
                node
            )))
        }
    };
    if span.end > target.len() {
        return Err(GrammarError::Invariant(format!(
            "span {}..{} exceeds target length {}",
            span.start,
            span.end,
            target.len()
        )));
    }

    let fragment = tree.fragment(node);
    let mut frontier: Vec<Option<usize>> = vec![None; span.len()];
    let mut var_count = 0;
    for leaf in fragment.leaves() {
        if leaf == ROOT || fragment.node(leaf).word.is_some() {
            continue;
        }
        if !fragment.is_split(leaf) {
            // an unsplit variable leaf keeps its number but owns no target words
            var_count += 1;
            continue;
        }
        let leaf_span = fragment.span(leaf).ok_or_else(|| {
            GrammarError::Invariant(format!("frontier node under {} has no span", node))
        })?;
        for pos in leaf_span.positions() {
            if !span.contains(pos) {
                return Err(GrammarError::Invariant(format!(
                    "frontier span {}..{} escapes parent span {}..{}",
                    leaf_span.start, leaf_span.end, span.start, span.end
                )));
            }
            frontier[pos - span.start] = Some(var_count);
        }
        var_count += 1;
    }

    let mut target_side = Vec::with_capacity(span.len());
    for (offset, owner) in frontier.into_iter().enumerate() {
        match owner {
            None => target_side.push(target[span.start + offset]),
            Some(k) => {
                if target_side.last().and_then(TargetToken::var) != Some(k) {
                    target_side.push(TargetToken::Var(k));
                }
            }
        }
    }

    Ok(Rule::new(fragment, target_side))
}
