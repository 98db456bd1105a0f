//! Seed segmentation from a word alignment.
//!
//! Every node gets the split/span annotation GHKM minimal-rule extraction
//! would give it: a node is split when its projected target interval is
//! non-empty and no target position inside it is aligned to a source word
//! outside the node.

use crate::error::{GrammarError, GrammarResult};
use crate::tree::{AnnotatedTree, Span, ROOT};

/// `(source word index, target position)` pairs, in file order.
pub type Alignment = Vec<(usize, usize)>;

/// Parses `i-j i-j ...`.
pub fn parse_alignment(line: &str, line_no: usize) -> GrammarResult<Alignment> {
    line.split_whitespace()
        .map(|token| {
            let (s, t) = token
                .split_once('-')
                .ok_or_else(|| GrammarError::parse(line_no, format!("bad alignment token '{}'", token)))?;
            let s = s
                .parse::<usize>()
                .map_err(|_| GrammarError::parse(line_no, format!("bad alignment token '{}'", token)))?;
            let t = t
                .parse::<usize>()
                .map_err(|_| GrammarError::parse(line_no, format!("bad alignment token '{}'", token)))?;
            Ok((s, t))
        })
        .collect()
}

pub fn format_links(links: &[(usize, usize)]) -> String {
    links
        .iter()
        .map(|(s, t)| format!("{}-{}", s, t))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Convex hull of a set of positions; empty until a point is added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Hull {
    lo: usize,
    hi: usize,
}

impl Hull {
    const EMPTY: Hull = Hull { lo: usize::MAX, hi: 0 };

    fn point(pos: usize) -> Self {
        Hull { lo: pos, hi: pos + 1 }
    }

    fn is_empty(&self) -> bool {
        self.lo >= self.hi
    }

    fn union(self, other: Hull) -> Hull {
        Hull {
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }

    fn within(&self, outer: &Hull) -> bool {
        self.is_empty() || (outer.lo <= self.lo && self.hi <= outer.hi)
    }
}

/// Annotates `tree` in place from `alignment`. Deterministic: the same input
/// always yields the same annotations. Parse failures are left untouched.
pub fn project(tree: &mut AnnotatedTree, target_len: usize, alignment: &[(usize, usize)]) -> GrammarResult<()> {
    if tree.is_parse_failure() {
        return Ok(());
    }

    let source_len = tree.word_count();
    let mut forward = vec![Hull::EMPTY; source_len];
    let mut backward = vec![Hull::EMPTY; target_len];
    for &(s, t) in alignment {
        if s >= source_len || t >= target_len {
            return Err(GrammarError::AlignmentOutOfRange {
                line: 0,
                source_index: s,
                target_index: t,
            });
        }
        forward[s] = forward[s].union(Hull::point(t));
        backward[t] = backward[t].union(Hull::point(s));
    }

    let mut source_hull = vec![Hull::EMPTY; tree.len()];
    let mut target_hull = vec![Hull::EMPTY; tree.len()];
    for id in tree.post_order() {
        let node = tree.node(id);
        let (source, target) = match node.word_index {
            Some(wi) => (Hull::point(wi), forward[wi]),
            None => node.children().iter().fold((Hull::EMPTY, Hull::EMPTY), |(s, t), &c| {
                (s.union(source_hull[c]), t.union(target_hull[c]))
            }),
        };
        source_hull[id] = source;
        target_hull[id] = target;

        let consistent = !target.is_empty() && (target.lo..target.hi).all(|pos| backward[pos].within(&source));
        if consistent {
            tree.set_split(id, Span::new(target.lo, target.hi));
        } else {
            tree.unsplit(id);
        }
    }

    tree.set_split(ROOT, Span::new(0, target_len));
    Ok(())
}
