pub mod extractor;

use crate::dictionary::{Symbol, TokenDictionary};
use crate::error::GrammarResult;
use crate::tree::parse::variable_index;
use crate::tree::{AnnotatedTree, ROOT};
use itertools::Itertools;
use std::cmp::Ordering;

pub use self::extractor::extract_rule;

/// One element of a target string: a word (with its position among the
/// sentence's words) or a reference to the `k`-th frontier variable.
#[derive(Debug, Clone, Copy)]
pub enum TargetToken {
    Word { word: Symbol, index: usize },
    Var(usize),
}

impl TargetToken {
    pub fn word(&self) -> Option<Symbol> {
        match *self {
            TargetToken::Word { word, .. } => Some(word),
            TargetToken::Var(_) => None,
        }
    }

    pub fn word_index(&self) -> Option<usize> {
        match *self {
            TargetToken::Word { index, .. } => Some(index),
            TargetToken::Var(_) => None,
        }
    }

    pub fn var(&self) -> Option<usize> {
        match *self {
            TargetToken::Var(k) => Some(k),
            TargetToken::Word { .. } => None,
        }
    }

    fn key(&self) -> (Option<Symbol>, Option<usize>) {
        (self.word(), self.var())
    }
}

// Word positions are bookkeeping, not identity.
impl PartialEq for TargetToken {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TargetToken {}

impl PartialOrd for TargetToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TargetToken {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

pub type TargetString = Vec<TargetToken>;

/// Whitespace-separated target sentence; `#<n>` is a variable reference.
pub fn parse_target(line: &str, dict: &mut TokenDictionary) -> TargetString {
    let mut index = 0;
    line.split_whitespace()
        .map(|token| match variable_index(token) {
            Some(k) => TargetToken::Var(k),
            None => {
                let word = dict.index(token);
                index += 1;
                TargetToken::Word {
                    word,
                    index: index - 1,
                }
            }
        })
        .collect()
}

pub fn write_target(target: &[TargetToken], dict: &TokenDictionary) -> GrammarResult<String> {
    let tokens = target
        .iter()
        .map(|t| match *t {
            TargetToken::Word { word, .. } => dict.token(word).map(str::to_string),
            TargetToken::Var(k) => Ok(format!("#{}", k)),
        })
        .collect::<GrammarResult<Vec<_>>>()?;
    Ok(tokens.iter().join(" "))
}

/// A tree-to-string rule. Ordering is structural: fragment first, then the
/// target side.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rule {
    pub fragment: AnnotatedTree,
    pub target: TargetString,
}

impl Rule {
    pub fn new(fragment: AnnotatedTree, target: TargetString) -> Self {
        Self { fragment, target }
    }

    /// Selects the restaurant the rule is counted in.
    #[inline]
    pub fn root_tag(&self) -> Symbol {
        self.fragment.root_tag()
    }

    pub fn variable_count(&self) -> usize {
        self.target.iter().filter(|t| t.var().is_some()).count()
    }

    pub fn terminal_count(&self) -> usize {
        self.target.iter().filter(|t| t.word().is_some()).count()
    }

    /// Whether fragment leaf `id` is a source terminal (as opposed to a
    /// frontier variable). The root of a preterminal rule keeps its word.
    pub fn is_terminal_leaf(&self, id: usize) -> bool {
        let node = self.fragment.node(id);
        node.word.is_some() && (id == ROOT || !node.is_split())
    }

    /// `TAG ||| (TAG ... #k ...) ||| target`
    pub fn to_stsg(&self, dict: &TokenDictionary) -> GrammarResult<String> {
        Ok(format!(
            "{} ||| {} ||| {}",
            dict.token(self.root_tag())?,
            self.fragment.to_bracketed(dict)?,
            write_target(&self.target, dict)?
        ))
    }

    /// `TAG ||| leaf sequence ||| target`, frontier leaves written as tags.
    pub fn to_scfg(&self, dict: &TokenDictionary) -> GrammarResult<String> {
        let source = self
            .fragment
            .leaves()
            .into_iter()
            .map(|id| {
                let node = self.fragment.node(id);
                match node.word {
                    Some(word) if self.is_terminal_leaf(id) => dict.token(word),
                    _ => dict.token(node.tag),
                }
            })
            .collect::<GrammarResult<Vec<_>>>()?;
        Ok(format!(
            "{} ||| {} ||| {}",
            dict.token(self.root_tag())?,
            source.iter().join(" "),
            write_target(&self.target, dict)?
        ))
    }
}
