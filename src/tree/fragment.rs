use super::{AnnotatedTree, NodeId, ROOT};

impl AnnotatedTree {
    /// Nearest split node strictly above `id`. `None` only for the root.
    pub fn split_ancestor(&self, id: NodeId) -> Option<NodeId> {
        let mut current = self.node(id).parent();
        while let Some(ancestor) = current {
            if self.is_split(ancestor) {
                return Some(ancestor);
            }
            current = self.node(ancestor).parent();
        }
        None
    }

    /// Nearest split nodes below `id`, in pre-order. The walk does not enter
    /// a split node, so the cost is bounded by the fragment rooted at `id`.
    pub fn split_descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.node(id).children().iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            if self.is_split(current) {
                found.push(current);
                continue;
            }
            stack.extend(self.node(current).children().iter().rev());
        }
        found
    }

    /// Split descendants that have no split descendants of their own.
    pub fn frontier_split_descendants(&self, id: NodeId) -> Vec<NodeId> {
        self.split_descendants(id)
            .into_iter()
            .filter(|&d| self.split_descendants(d).is_empty())
            .collect()
    }

    /// Copy of the minimal subtree under `id`. Split descendants become
    /// childless frontier leaves with their word cleared.
    pub fn fragment(&self, id: NodeId) -> AnnotatedTree {
        let source = self.node(id);
        let mut fragment = AnnotatedTree::new(source.tag);
        fragment.nodes[ROOT].word = source.word;
        fragment.nodes[ROOT].word_index = source.word_index;
        fragment.nodes[ROOT].annotation = source.annotation();
        self.copy_children(id, &mut fragment, ROOT);
        fragment
    }

    fn copy_children(&self, from: NodeId, fragment: &mut AnnotatedTree, to: NodeId) {
        for &child in self.node(from).children() {
            let source = self.node(child);
            let copy = fragment.add_child(to, source.tag);
            fragment.nodes[copy].annotation = source.annotation();
            if source.is_split() {
                continue;
            }
            fragment.nodes[copy].word = source.word;
            fragment.nodes[copy].word_index = source.word_index;
            self.copy_children(child, fragment, copy);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::dictionary::TokenDictionary;
    use crate::tree::{parse_tree, AnnotatedTree, Span};

    // (S (NP (DT the) (NN dog)) (VP (VBZ barks)))
    //  0   1   2        3         4   5
    fn annotated(dict: &mut TokenDictionary) -> AnnotatedTree {
        let mut tree = parse_tree("(S (NP (DT the) (NN dog)) (VP (VBZ barks)))", 1, dict).unwrap();
        tree.set_split(0, Span::new(0, 3));
        tree.set_split(1, Span::new(0, 2));
        tree.set_split(3, Span::new(1, 2));
        tree.set_split(5, Span::new(2, 3));
        tree
    }

    #[test]
    fn test_split_ancestor_skips_unsplit_nodes() {
        let mut dict = TokenDictionary::new();
        let tree = annotated(&mut dict);
        assert_eq!(tree.split_ancestor(5), Some(0));
        assert_eq!(tree.split_ancestor(4), Some(0));
        assert_eq!(tree.split_ancestor(3), Some(1));
        assert_eq!(tree.split_ancestor(0), None);
    }

    #[test]
    fn test_split_descendants_stop_at_nearest() {
        let mut dict = TokenDictionary::new();
        let tree = annotated(&mut dict);
        assert_eq!(tree.split_descendants(0), vec![1, 5]);
        assert_eq!(tree.split_descendants(1), vec![3]);
        assert!(tree.split_descendants(5).is_empty());
        assert_eq!(tree.frontier_split_descendants(0), vec![5]);
    }

    #[test]
    fn test_fragment_prunes_at_split_nodes() {
        let mut dict = TokenDictionary::new();
        let tree = annotated(&mut dict);
        let fragment = tree.fragment(0);
        assert_eq!(
            fragment.to_bracketed(&dict).unwrap(),
            "(S (NP #0) (VP (VBZ #1)))"
        );
        for id in 1..fragment.len() {
            let node = fragment.node(id);
            if node.is_split() {
                assert!(node.is_leaf());
                assert!(node.word.is_none());
            }
        }
    }

    #[test]
    fn test_fragment_of_preterminal_keeps_word() {
        let mut dict = TokenDictionary::new();
        let tree = annotated(&mut dict);
        let fragment = tree.fragment(5);
        assert_eq!(fragment.to_bracketed(&dict).unwrap(), "(VBZ barks)");
    }
}
