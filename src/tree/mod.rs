pub mod fragment;
pub mod parse;

use crate::dictionary::{Symbol, TokenDictionary, NULL_WORD_ID};
use crate::error::GrammarResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

pub use self::parse::parse_tree;

/// Index of a node inside its tree's arena.
pub type NodeId = usize;

pub const ROOT: NodeId = 0;

/// Half-open interval `[start, end)` over target positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    #[inline]
    pub fn contains(&self, pos: usize) -> bool {
        self.start <= pos && pos < self.end
    }

    pub fn positions(&self) -> std::ops::Range<usize> {
        self.start..self.end
    }
}

/// The mutable part of a node: whether it roots a rule and which target
/// interval it covers. `span` is only meaningful while `split` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Annotation {
    pub split: bool,
    pub span: Option<Span>,
}

impl Annotation {
    pub const UNSPLIT: Annotation = Annotation {
        split: false,
        span: None,
    };

    pub fn split(span: Span) -> Self {
        Self {
            split: true,
            span: Some(span),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedNode {
    pub tag: Symbol,
    pub word: Option<Symbol>,
    pub word_index: Option<usize>,
    annotation: Annotation,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl AnnotatedNode {
    fn new(tag: Symbol, parent: Option<NodeId>) -> Self {
        Self {
            tag,
            word: None,
            word_index: None,
            annotation: Annotation::UNSPLIT,
            parent,
            children: Vec::new(),
        }
    }

    #[inline]
    pub fn is_split(&self) -> bool {
        self.annotation.split
    }

    #[inline]
    pub fn span(&self) -> Option<Span> {
        self.annotation.span
    }

    #[inline]
    pub fn annotation(&self) -> Annotation {
        self.annotation
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Ordered rooted tree stored as an arena.
///
/// Nodes are always appended in pre-order (depth first, left to right), so
/// arena order is pre-order and every child has a larger id than its parent.
/// Tag, word and word index are fixed once built; only annotations change.
#[derive(Debug, Clone)]
pub struct AnnotatedTree {
    nodes: Vec<AnnotatedNode>,
}

impl AnnotatedTree {
    pub fn new(root_tag: Symbol) -> Self {
        Self {
            nodes: vec![AnnotatedNode::new(root_tag, None)],
        }
    }

    /// Placeholder for a sentence the parser could not handle.
    pub fn parse_failure() -> Self {
        Self::new(NULL_WORD_ID)
    }

    /// Appends a child under `parent`. Callers must build in pre-order.
    pub fn add_child(&mut self, parent: NodeId, tag: Symbol) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(AnnotatedNode::new(tag, Some(parent)));
        self.nodes[parent].children.push(id);
        id
    }

    pub fn set_word(&mut self, id: NodeId, word: Symbol, word_index: usize) {
        let node = &mut self.nodes[id];
        node.word = Some(word);
        node.word_index = Some(word_index);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// A lone wordless node is what a failed parse leaves behind. A one-word
    /// sentence parsed as `(TAG word)` is a real tree.
    pub fn is_parse_failure(&self) -> bool {
        self.nodes.len() <= 1 && self.nodes.first().map_or(true, |n| n.word.is_none())
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &AnnotatedNode {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[AnnotatedNode] {
        &self.nodes
    }

    pub fn root_tag(&self) -> Symbol {
        self.nodes[ROOT].tag
    }

    #[inline]
    pub fn is_split(&self, id: NodeId) -> bool {
        self.nodes[id].annotation.split
    }

    #[inline]
    pub fn span(&self, id: NodeId) -> Option<Span> {
        self.nodes[id].annotation.span
    }

    #[inline]
    pub fn annotation(&self, id: NodeId) -> Annotation {
        self.nodes[id].annotation
    }

    #[inline]
    pub fn set_annotation(&mut self, id: NodeId, annotation: Annotation) {
        self.nodes[id].annotation = annotation;
    }

    #[inline]
    pub fn set_split(&mut self, id: NodeId, span: Span) {
        self.nodes[id].annotation = Annotation::split(span);
    }

    #[inline]
    pub fn unsplit(&mut self, id: NodeId) {
        self.nodes[id].annotation = Annotation::UNSPLIT;
    }

    /// Snapshot of every node's annotation, in arena order.
    pub fn annotations(&self) -> Vec<Annotation> {
        self.nodes.iter().map(|n| n.annotation).collect()
    }

    /// Number of source words (preterminals carrying a word).
    pub fn word_count(&self) -> usize {
        self.nodes
            .iter()
            .filter_map(|n| n.word_index)
            .max()
            .map_or(0, |m| m + 1)
    }

    /// Childless nodes in left-to-right order.
    pub fn leaves(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .filter(|&id| self.nodes[id].children.is_empty())
            .collect()
    }

    /// Children strictly before parents, siblings left to right.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(ROOT, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.nodes[id].children.iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// Bracketed form. Childless nodes without a word print as `#k`, numbered
    /// left to right.
    pub fn to_bracketed(&self, dict: &TokenDictionary) -> GrammarResult<String> {
        let mut out = String::new();
        let mut var_index = 0;
        self.write_node(ROOT, dict, &mut out, &mut var_index)?;
        Ok(out)
    }

    fn write_node(
        &self,
        id: NodeId,
        dict: &TokenDictionary,
        out: &mut String,
        var_index: &mut usize,
    ) -> GrammarResult<()> {
        let node = &self.nodes[id];
        out.push('(');
        out.push_str(dict.token(node.tag)?);
        if node.children.is_empty() {
            if let Some(word) = node.word {
                out.push(' ');
                out.push_str(dict.token(word)?);
            } else {
                out.push_str(&format!(" #{}", var_index));
                *var_index += 1;
            }
        } else {
            for &child in &node.children {
                out.push(' ');
                self.write_node(child, dict, out, var_index)?;
            }
        }
        out.push(')');
        Ok(())
    }
}

// Structural identity: shape, tags and words. Annotations and word indices are
// ignored so that equal fragments from different sentences are the same rule.
impl PartialEq for AnnotatedTree {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for AnnotatedTree {}

impl PartialOrd for AnnotatedTree {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AnnotatedTree {
    fn cmp(&self, other: &Self) -> Ordering {
        self.nodes.len().cmp(&other.nodes.len()).then_with(|| {
            for (a, b) in self.nodes.iter().zip(&other.nodes) {
                let ord = a
                    .children
                    .len()
                    .cmp(&b.children.len())
                    .then(a.tag.cmp(&b.tag))
                    .then(a.word.cmp(&b.word));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        })
    }
}
