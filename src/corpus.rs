use crate::dictionary::TokenDictionary;
use crate::error::{GrammarError, GrammarResult};
use crate::ghkm::{self, Alignment};
use crate::rule::{extract_rule, parse_target, Rule, TargetString};
use crate::tree::{parse_tree, Annotation, AnnotatedTree, NodeId, Span, ROOT};
use rayon::prelude::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// A source tree paired with its target sentence. The tree's annotations are
/// the latent segmentation the sampler moves around.
#[derive(Debug, Clone)]
pub struct TrainingInstance {
    pub tree: AnnotatedTree,
    pub target: TargetString,
}

impl TrainingInstance {
    pub fn new(tree: AnnotatedTree, target: TargetString) -> Self {
        Self { tree, target }
    }

    pub fn is_parse_failure(&self) -> bool {
        self.tree.is_parse_failure()
    }

    pub fn rule_at(&self, node: NodeId) -> GrammarResult<Rule> {
        extract_rule(&self.tree, &self.target, node)
    }

    /// Split nodes in pre-order.
    pub fn split_nodes(&self) -> Vec<NodeId> {
        (0..self.tree.len()).filter(|&id| self.tree.is_split(id)).collect()
    }

    /// The derivation: one rule per split node. Empty for parse failures.
    pub fn rules(&self) -> GrammarResult<Vec<Rule>> {
        if self.is_parse_failure() {
            return Ok(Vec::new());
        }
        self.split_nodes().into_iter().map(|id| self.rule_at(id)).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub instances: Vec<TrainingInstance>,
}

fn read_lines(path: &Path) -> GrammarResult<Vec<String>> {
    let text = fs::read_to_string(path)?;
    Ok(text.lines().map(str::to_string).collect())
}

impl Corpus {
    /// Reads the three parallel files and projects the alignment onto every
    /// tree. Differing line counts are fatal.
    pub fn load(
        trees: impl AsRef<Path>,
        strings: impl AsRef<Path>,
        alignments: impl AsRef<Path>,
        dict: &mut TokenDictionary,
    ) -> GrammarResult<Self> {
        info!("📂 Loading corpus from '{}'", trees.as_ref().display());
        let tree_lines = read_lines(trees.as_ref())?;
        let string_lines = read_lines(strings.as_ref())?;
        let alignment_lines = read_lines(alignments.as_ref())?;
        Self::from_lines(&tree_lines, &string_lines, &alignment_lines, dict)
    }

    pub fn from_lines<S: AsRef<str>>(
        trees: &[S],
        strings: &[S],
        alignments: &[S],
        dict: &mut TokenDictionary,
    ) -> GrammarResult<Self> {
        if trees.len() != strings.len() || trees.len() != alignments.len() {
            return Err(GrammarError::MismatchedCorpus {
                trees: trees.len(),
                strings: strings.len(),
                alignments: alignments.len(),
            });
        }

        let mut instances = Vec::with_capacity(trees.len());
        let mut links: Vec<Alignment> = Vec::with_capacity(trees.len());
        for (i, ((tree, string), alignment)) in trees.iter().zip(strings).zip(alignments).enumerate() {
            let tree = parse_tree(tree.as_ref(), i + 1, dict)?;
            let target = parse_target(string.as_ref(), dict);
            links.push(ghkm::parse_alignment(alignment.as_ref(), i + 1)?);
            instances.push(TrainingInstance::new(tree, target));
        }

        instances
            .par_iter_mut()
            .zip(links.par_iter())
            .enumerate()
            .try_for_each(|(i, (instance, alignment))| {
                ghkm::project(&mut instance.tree, instance.target.len(), alignment).map_err(|e| e.at_line(i + 1))
            })?;

        let corpus = Self { instances };
        let failures = corpus.parse_failures();
        if failures > 0 {
            warn!("⚠️  {} of {} trees are parse failures and will be skipped", failures, corpus.len());
        }
        info!("   -> {} training instances", corpus.len());
        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn parse_failures(&self) -> usize {
        self.instances.iter().filter(|i| i.is_parse_failure()).count()
    }

    /// Writes every node's annotation: `# tree <i>` then `TAG start end` per
    /// node in pre-order, `-1 -1` for unsplit nodes.
    pub fn write_state<W: Write>(instances: &[TrainingInstance], out: &mut W, dict: &TokenDictionary) -> GrammarResult<()> {
        for (i, instance) in instances.iter().enumerate() {
            writeln!(out, "# tree {}", i)?;
            for node in instance.tree.nodes() {
                let tag = dict.token(node.tag)?;
                match (node.is_split(), node.span()) {
                    (true, Some(span)) => writeln!(out, "{} {} {}", tag, span.start, span.end)?,
                    _ => writeln!(out, "{} -1 -1", tag)?,
                }
            }
        }
        Ok(())
    }

    /// Restores annotations written by [`Corpus::write_state`]. Each tree's
    /// annotations must form a derivation: the root owns the whole target and
    /// every split span sits inside its split ancestor's, disjoint from its
    /// siblings'.
    pub fn apply_state(&mut self, text: &str, dict: &TokenDictionary) -> GrammarResult<()> {
        let mut lines = text.lines().enumerate();
        for (i, instance) in self.instances.iter_mut().enumerate() {
            let (line_no, header) = lines
                .next()
                .ok_or_else(|| GrammarError::parse(0, format!("state ends before tree {}", i)))?;
            if header.trim() != format!("# tree {}", i) {
                return Err(GrammarError::parse(line_no + 1, format!("expected header for tree {}", i)));
            }
            let first_node_line = line_no + 2;
            let target_len = instance.target.len();
            for id in 0..instance.tree.len() {
                let (line_no, line) = lines
                    .next()
                    .ok_or_else(|| GrammarError::parse(0, format!("state ends inside tree {}", i)))?;
                let tag = dict.token(instance.tree.node(id).tag)?;
                let annotation = parse_state_line(line, line_no + 1, tag, target_len)?;
                instance.tree.set_annotation(id, annotation);
            }
            check_derivation(&instance.tree, target_len, first_node_line)?;
        }
        info!("♻️  Restored annotations for {} trees", self.instances.len());
        Ok(())
    }

    pub fn load_state(&mut self, path: impl AsRef<Path>, dict: &TokenDictionary) -> GrammarResult<()> {
        let text = fs::read_to_string(path)?;
        self.apply_state(&text, dict)
    }
}

fn parse_state_line(line: &str, line_no: usize, expected_tag: &str, target_len: usize) -> GrammarResult<Annotation> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let [tag, start, end] = fields[..] else {
        return Err(GrammarError::parse(line_no, "expected 'TAG start end'"));
    };
    if tag != expected_tag {
        return Err(GrammarError::parse(
            line_no,
            format!("tag '{}' does not match tree tag '{}'", tag, expected_tag),
        ));
    }
    if start == "-1" && end == "-1" {
        return Ok(Annotation::UNSPLIT);
    }
    let start = start
        .parse::<usize>()
        .map_err(|_| GrammarError::parse(line_no, format!("bad span start '{}'", start)))?;
    let end = end
        .parse::<usize>()
        .map_err(|_| GrammarError::parse(line_no, format!("bad span end '{}'", end)))?;
    if start >= end || end > target_len {
        return Err(GrammarError::parse(
            line_no,
            format!("span {}..{} is empty or exceeds target length {}", start, end, target_len),
        ));
    }
    Ok(Annotation::split(Span::new(start, end)))
}

/// `first_line` is the state line of node 0; node `id` sits `id` lines below.
fn check_derivation(tree: &AnnotatedTree, target_len: usize, first_line: usize) -> GrammarResult<()> {
    if tree.is_parse_failure() {
        return match (0..tree.len()).find(|&id| tree.is_split(id)) {
            Some(id) => Err(GrammarError::parse(first_line + id, "parse failure cannot be split")),
            None => Ok(()),
        };
    }
    if tree.span(ROOT) != Some(Span::new(0, target_len)) || !tree.is_split(ROOT) {
        return Err(GrammarError::parse(
            first_line,
            format!("root must be split over 0..{}", target_len),
        ));
    }
    for id in (0..tree.len()).filter(|&id| tree.is_split(id)) {
        let Some(outer) = tree.span(id) else {
            return Err(GrammarError::parse(first_line + id, "split node without a span"));
        };
        let mut taken = vec![false; target_len];
        for child in tree.frontier_split_descendants(id) {
            let Some(inner) = tree.span(child) else {
                return Err(GrammarError::parse(first_line + child, "split node without a span"));
            };
            if inner.start < outer.start || inner.end > outer.end {
                return Err(GrammarError::parse(
                    first_line + child,
                    format!(
                        "span {}..{} escapes its ancestor's {}..{}",
                        inner.start, inner.end, outer.start, outer.end
                    ),
                ));
            }
            for pos in inner.positions() {
                if std::mem::replace(&mut taken[pos], true) {
                    return Err(GrammarError::parse(
                        first_line + child,
                        format!("span {}..{} overlaps a sibling's", inner.start, inner.end),
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn small_corpus(dict: &mut TokenDictionary) -> Corpus {
        Corpus::from_lines(
            &["(S (NP (DT the) (NN dog)) (VP (VBZ barks)))", "()"],
            &["el perro ladra", "nada"],
            &["0-0 1-1 2-2", ""],
            dict,
        )
        .unwrap()
    }

    #[test]
    fn test_mismatched_line_counts_are_fatal() {
        let mut dict = TokenDictionary::new();
        let err = Corpus::from_lines(&["(S (A a))"], &["a", "b"], &["0-0"], &mut dict).unwrap_err();
        assert!(matches!(
            err,
            GrammarError::MismatchedCorpus {
                trees: 1,
                strings: 2,
                alignments: 1
            }
        ));
    }

    #[test]
    fn test_parse_failures_are_kept_in_place() {
        let mut dict = TokenDictionary::new();
        let corpus = small_corpus(&mut dict);
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.parse_failures(), 1);
        assert!(corpus.instances[1].rules().unwrap().is_empty());
    }

    #[test]
    fn test_derivation_has_one_rule_per_split_node() {
        let mut dict = TokenDictionary::new();
        let corpus = small_corpus(&mut dict);
        let instance = &corpus.instances[0];
        assert_eq!(instance.rules().unwrap().len(), instance.split_nodes().len());
    }

    #[test]
    fn test_alignment_errors_carry_line_numbers() {
        let mut dict = TokenDictionary::new();
        let err = Corpus::from_lines(&["(S (A a))", "(S (A a) (B b))"], &["x", "x y"], &["0-0", "0-5"], &mut dict)
            .unwrap_err();
        assert!(matches!(err, GrammarError::AlignmentOutOfRange { line: 2, .. }));
    }

    #[test]
    fn test_state_round_trip_restores_annotations() {
        let mut dict = TokenDictionary::new();
        let mut corpus = small_corpus(&mut dict);
        let before: Vec<_> = corpus.instances.iter().map(|i| i.tree.annotations()).collect();

        let mut buffer = Vec::new();
        Corpus::write_state(&corpus.instances, &mut buffer, &dict).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.starts_with("# tree 0\nS 0 3\n"));

        for instance in &mut corpus.instances {
            for id in 0..instance.tree.len() {
                instance.tree.unsplit(id);
            }
        }
        corpus.apply_state(&text, &dict).unwrap();
        let after: Vec<_> = corpus.instances.iter().map(|i| i.tree.annotations()).collect();
        assert_eq!(before, after);
    }

    fn corrupt(text: &str, line: usize, replacement: &str) -> String {
        text.lines()
            .enumerate()
            .map(|(i, l)| if i + 1 == line { replacement } else { l })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // state lines for tree 0: 1 header, 2 S, 3 NP, 4 DT, 5 NN, 6 VP, 7 VBZ
    #[rstest]
    #[case::root_unsplit(2, "S -1 -1", 2)]
    #[case::root_short(2, "S 0 2", 2)]
    #[case::inverted_span(3, "NP 2 1", 3)]
    #[case::span_past_target(6, "VP 2 9", 6)]
    #[case::escapes_ancestor(5, "NN 1 3", 5)]
    #[case::overlapping_siblings(6, "VP 1 3", 6)]
    #[case::split_parse_failure(9, "__NULL__ 0 1", 9)]
    fn test_corrupt_state_is_rejected(#[case] line: usize, #[case] replacement: &str, #[case] reported: usize) {
        let mut dict = TokenDictionary::new();
        let mut corpus = small_corpus(&mut dict);
        let mut buffer = Vec::new();
        Corpus::write_state(&corpus.instances, &mut buffer, &dict).unwrap();
        let text = String::from_utf8(buffer).unwrap();

        let err = corpus.apply_state(&corrupt(&text, line, replacement), &dict).unwrap_err();
        assert!(
            matches!(err, GrammarError::Parse { line: l, .. } if l == reported),
            "{:?}",
            err
        );
    }

    #[test]
    fn test_state_tag_mismatch_is_rejected() {
        let mut dict = TokenDictionary::new();
        let mut corpus = small_corpus(&mut dict);
        let err = corpus.apply_state("# tree 0\nX 0 3\n", &dict).unwrap_err();
        assert!(matches!(err, GrammarError::Parse { line: 2, .. }));
    }
}
