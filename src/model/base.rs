use super::pcfg::{production, PcfgTable};
use super::translation::TranslationTable;
use crate::config::PriorParams;
use crate::corpus::TrainingInstance;
use crate::dictionary::{Symbol, NULL_WORD_ID};
use crate::error::{GrammarError, GrammarResult};
use crate::rule::Rule;
use crate::tree::ROOT;
use clap::ValueEnum;
use fnv::{FnvHashMap, FnvHashSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FragmentPriorKind {
    #[default]
    Geometric,
    Pcfg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StringPriorKind {
    #[default]
    Geometric,
    Ibm1,
}

#[derive(Debug, Clone)]
enum FragmentPrior {
    Geometric,
    Pcfg(PcfgTable),
}

#[derive(Debug, Clone)]
enum StringPrior {
    Geometric,
    Ibm1 { table: Arc<TranslationTable>, weight: f64 },
}

#[derive(Debug, Clone, Copy)]
struct Bernoulli {
    yes: f64,
    no: f64,
}

impl Bernoulli {
    fn new(p: f64) -> Self {
        Self {
            yes: p.ln(),
            no: (1.0 - p).ln(),
        }
    }
}

/// The prior `p0` over rules: a generative story for the fragment times one
/// for the target string.
#[derive(Debug, Clone)]
pub struct BaseMeasure {
    fragment: FragmentPrior,
    string: StringPrior,
    expand: Bernoulli,
    expand_by_tag: FnvHashMap<Symbol, Bernoulli>,
    child: Bernoulli,
    term: Bernoulli,
    log_nonterminal: f64,
    log_source_word: f64,
    log_target_word: f64,
    target_vocabulary: f64,
}

fn log_uniform(size: usize) -> f64 {
    -(size.max(1) as f64).ln()
}

impl BaseMeasure {
    /// Geometric priors with vocabularies taken from `instances`.
    pub fn geometric(instances: &[TrainingInstance], params: &PriorParams) -> Self {
        let mut nonterminals = FnvHashSet::default();
        let mut source_words = FnvHashSet::default();
        let mut target_words = FnvHashSet::default();
        for instance in instances.iter().filter(|i| !i.is_parse_failure()) {
            for node in instance.tree.nodes() {
                nonterminals.insert(node.tag);
                if let Some(word) = node.word {
                    source_words.insert(word);
                }
            }
            target_words.extend(instance.target.iter().filter_map(|t| t.word()));
        }

        Self {
            fragment: FragmentPrior::Geometric,
            string: StringPrior::Geometric,
            expand: Bernoulli::new(params.pexpand),
            expand_by_tag: FnvHashMap::default(),
            child: Bernoulli::new(params.pchild),
            term: Bernoulli::new(params.pterm),
            log_nonterminal: log_uniform(nonterminals.len()),
            log_source_word: log_uniform(source_words.len()),
            log_target_word: log_uniform(target_words.len()),
            target_vocabulary: target_words.len().max(1) as f64,
        }
    }

    /// Base measure as configured. `translation` is required for the IBM
    /// Model 1 string prior.
    pub fn from_params(
        instances: &[TrainingInstance],
        params: &PriorParams,
        translation: Option<Arc<TranslationTable>>,
    ) -> GrammarResult<Self> {
        let mut base = Self::geometric(instances, params);
        if params.fragment_prior == FragmentPriorKind::Pcfg {
            base = base.with_pcfg(PcfgTable::from_corpus(instances));
        }
        if params.smart_expand {
            base = base.with_tag_expansion(instances);
        }
        if params.string_prior == StringPriorKind::Ibm1 {
            let table = translation.ok_or_else(|| {
                GrammarError::Config(
                    "the ibm1 string prior needs a forward translation table".to_string(),
                )
            })?;
            base = base.with_ibm1(table, params.ibm1_weight);
        }
        Ok(base)
    }

    pub fn with_pcfg(mut self, table: PcfgTable) -> Self {
        self.fragment = FragmentPrior::Pcfg(table);
        self
    }

    pub fn with_ibm1(mut self, table: Arc<TranslationTable>, weight: f64) -> Self {
        self.string = StringPrior::Ibm1 { table, weight };
        self
    }

    /// Replaces the global expansion probability by each tag's split rate in
    /// the current annotations of `instances`.
    pub fn with_tag_expansion(mut self, instances: &[TrainingInstance]) -> Self {
        let mut seen: FnvHashMap<Symbol, (usize, usize)> = FnvHashMap::default();
        for instance in instances.iter().filter(|i| !i.is_parse_failure()) {
            for (id, node) in instance.tree.nodes().iter().enumerate().skip(1) {
                let entry = seen.entry(node.tag).or_insert((0, 0));
                entry.1 += 1;
                if instance.tree.is_split(id) {
                    entry.0 += 1;
                }
            }
        }
        self.expand_by_tag = seen
            .into_iter()
            .map(|(tag, (split, total))| {
                let rate = (split as f64 / total as f64).clamp(0.01, 0.99);
                (tag, Bernoulli::new(rate))
            })
            .collect();
        self
    }

    pub fn log_probability(&self, rule: &Rule) -> GrammarResult<f64> {
        let (fragment, variables) = self.fragment_log_probability(rule)?;
        Ok(fragment + self.string_log_probability(rule, variables))
    }

    fn fragment_log_probability(&self, rule: &Rule) -> GrammarResult<(f64, usize)> {
        let tree = &rule.fragment;
        let mut total = 0.0;
        let mut variables = 0;
        for (id, node) in tree.nodes().iter().enumerate() {
            if id != ROOT {
                let expand = self.expand_by_tag.get(&node.tag).unwrap_or(&self.expand);
                total += self.log_nonterminal;
                if node.is_split() {
                    total += expand.yes;
                    variables += 1;
                } else {
                    total += expand.no;
                }
            }
            if id != ROOT && node.is_split() {
                continue;
            }
            total += match &self.fragment {
                FragmentPrior::Pcfg(table) => table.log_probability(node.tag, &production(tree, id))?,
                FragmentPrior::Geometric if node.word.is_some() => self.log_source_word,
                FragmentPrior::Geometric => {
                    let children = node.children().len() as f64;
                    (children - 1.0) * self.child.no + self.child.yes
                }
            };
        }
        Ok((total, variables))
    }

    fn string_log_probability(&self, rule: &Rule, variables: usize) -> f64 {
        let terminals = rule.target.len().saturating_sub(variables);
        let mut total = self.term.yes + terminals as f64 * self.term.no;
        for i in 1..=variables {
            total -= ((terminals + i) as f64).ln();
        }

        match &self.string {
            StringPrior::Geometric => total + terminals as f64 * self.log_target_word,
            StringPrior::Ibm1 { table, weight } => {
                let mut sources: Vec<Symbol> = (0..rule.fragment.len())
                    .filter(|&id| rule.is_terminal_leaf(id))
                    .filter_map(|id| rule.fragment.node(id).word)
                    .collect();
                sources.push(NULL_WORD_ID);
                let uniform = 1.0 / self.target_vocabulary;
                for target in rule.target.iter().filter_map(|t| t.word()) {
                    let p_ibm = sources.iter().map(|&s| table.probability(s, target)).sum::<f64>()
                        / sources.len() as f64;
                    total += (weight * p_ibm + (1.0 - weight) * uniform).ln();
                }
                total
            }
        }
    }
}
