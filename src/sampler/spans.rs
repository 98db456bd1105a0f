use crate::error::{GrammarError, GrammarResult};
use crate::tree::{AnnotatedTree, NodeId, Span};

/// Every `[start, end)` inside `outer` that covers all of `include` and
/// touches none of `exclude`, ordered by start then end.
pub fn legal_spans_within(outer: Span, include: &[Span], exclude: &[Span]) -> Vec<Span> {
    let width = outer.len();
    let mut must_include = vec![false; width];
    let mut must_exclude = vec![false; width];
    for span in exclude {
        for pos in span.positions().filter(|&p| outer.contains(p)) {
            must_exclude[pos - outer.start] = true;
        }
    }
    let mut required = 0;
    for span in include {
        for pos in span.positions().filter(|&p| outer.contains(p)) {
            if !must_include[pos - outer.start] {
                must_include[pos - outer.start] = true;
                required += 1;
            }
        }
    }

    let mut spans = Vec::new();
    for start in 0..width {
        let mut covered = 0;
        for end in start + 1..=width {
            if must_exclude[end - 1] {
                break;
            }
            if must_include[end - 1] {
                covered += 1;
            }
            if covered == required {
                spans.push(Span::new(outer.start + start, outer.start + end));
            }
        }
    }
    spans
}

/// Spans `node` may take while `ancestor` stays its nearest split ancestor:
/// they must cover `node`'s own split descendants and avoid every other
/// split descendant of `ancestor`.
pub fn legal_spans(tree: &AnnotatedTree, node: NodeId, ancestor: NodeId) -> GrammarResult<Vec<Span>> {
    let outer = tree
        .span(ancestor)
        .ok_or_else(|| GrammarError::Invariant(format!("split ancestor {} has no span", ancestor)))?;
    let span_of = |id: NodeId| {
        tree.span(id)
            .ok_or_else(|| GrammarError::Invariant(format!("split node {} has no span", id)))
    };

    let include = tree
        .split_descendants(node)
        .into_iter()
        .map(span_of)
        .collect::<GrammarResult<Vec<_>>>()?;
    let exclude = tree
        .split_descendants(ancestor)
        .into_iter()
        .filter(|&d| d != node)
        .map(span_of)
        .collect::<GrammarResult<Vec<_>>>()?;
    Ok(legal_spans_within(outer, &include, &exclude))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_include_and_exclude() {
        let spans = legal_spans_within(Span::new(0, 4), &[Span::new(3, 4)], &[Span::new(1, 2)]);
        assert_eq!(spans, vec![Span::new(2, 4), Span::new(3, 4)]);
    }

    #[test]
    fn test_unconstrained_enumerates_all() {
        let spans = legal_spans_within(Span::new(2, 5), &[], &[]);
        assert_eq!(spans.len(), 6);
        assert_eq!(spans[0], Span::new(2, 3));
        assert_eq!(spans[5], Span::new(4, 5));
    }

    #[test]
    fn test_nothing_fits() {
        let spans = legal_spans_within(Span::new(0, 3), &[Span::new(0, 1), Span::new(2, 3)], &[Span::new(1, 2)]);
        assert!(spans.is_empty());
    }

    proptest! {
        #[test]
        fn prop_every_span_is_sound(
            width in 1usize..10,
            marks in prop::collection::vec(0u8..3, 10),
        ) {
            let outer = Span::new(0, width);
            let include: Vec<Span> = (0..width).filter(|&p| marks[p] == 1).map(|p| Span::new(p, p + 1)).collect();
            let exclude: Vec<Span> = (0..width).filter(|&p| marks[p] == 2).map(|p| Span::new(p, p + 1)).collect();
            let spans = legal_spans_within(outer, &include, &exclude);
            for span in &spans {
                prop_assert!(span.start >= outer.start && span.end <= outer.end && !span.is_empty());
                for inc in &include {
                    prop_assert!(span.contains(inc.start));
                }
                for exc in &exclude {
                    prop_assert!(!span.contains(exc.start));
                }
            }
            // and complete
            for start in 0..width {
                for end in start + 1..=width {
                    let candidate = Span::new(start, end);
                    let ok = include.iter().all(|s| candidate.contains(s.start))
                        && exclude.iter().all(|s| !candidate.contains(s.start));
                    prop_assert_eq!(ok, spans.contains(&candidate));
                }
            }
        }
    }
}
