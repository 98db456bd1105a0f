use crate::dictionary::TokenDictionary;
use crate::error::GrammarResult;
use crate::model::RuleCounts;
use crate::rule::Rule;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OutputFormat {
    /// Synchronous tree substitution: the full source fragment.
    #[default]
    Stsg,
    /// Synchronous context-free: only the fragment's leaves.
    Scfg,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrammarEntry {
    pub rule: Rule,
    pub count: i64,
    /// Relative frequency within the rule's root tag.
    pub probability: f64,
}

impl GrammarEntry {
    pub fn to_line(&self, format: OutputFormat, dict: &TokenDictionary) -> GrammarResult<String> {
        let rule = match format {
            OutputFormat::Stsg => self.rule.to_stsg(dict)?,
            OutputFormat::Scfg => self.rule.to_scfg(dict)?,
        };
        Ok(format!("{} ||| {}", rule, self.probability))
    }
}

/// A serializable view of one counts snapshot.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    pub entries: Vec<GrammarEntry>,
}

impl Grammar {
    /// Keeps every rule counted at least `min_count` times (and at least
    /// once). Ordered by tag name, then by descending count.
    pub fn from_counts(counts: &RuleCounts, min_count: i64, dict: &TokenDictionary) -> GrammarResult<Self> {
        let mut tagged = Vec::new();
        for (tag, restaurant) in counts.iter() {
            let total = restaurant.total();
            for (rule, count) in restaurant.iter() {
                if count < min_count.max(1) {
                    continue;
                }
                tagged.push((
                    dict.token(tag)?,
                    GrammarEntry {
                        rule: rule.clone(),
                        count,
                        probability: count as f64 / total as f64,
                    },
                ));
            }
        }
        tagged.sort_by(|(ta, a), (tb, b)| {
            ta.cmp(tb)
                .then_with(|| b.count.cmp(&a.count))
                .then_with(|| a.rule.cmp(&b.rule))
        });
        Ok(Self {
            entries: tagged.into_iter().map(|(_, e)| e).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GrammarEntry> {
        self.entries.iter()
    }

    pub fn write<W: Write>(&self, out: &mut W, format: OutputFormat, dict: &TokenDictionary) -> GrammarResult<()> {
        for entry in &self.entries {
            writeln!(out, "{}", entry.to_line(format, dict)?)?;
        }
        Ok(())
    }

    pub fn to_string(&self, format: OutputFormat, dict: &TokenDictionary) -> GrammarResult<String> {
        let mut buf = Vec::new();
        self.write(&mut buf, format, dict)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// SHA-256 of the serialized grammar, hex encoded.
    pub fn fingerprint(&self, format: OutputFormat, dict: &TokenDictionary) -> GrammarResult<String> {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            hasher.update(entry.to_line(format, dict)?.as_bytes());
            hasher.update(b"\n");
        }
        Ok(hex::encode(hasher.finalize()))
    }
}
