use crate::dictionary::{Symbol, TokenDictionary, NULL_WORD_ID};
use crate::error::GrammarResult;
use fnv::FnvHashMap;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

/// Token used for the empty word in IBM Model 1 tables.
pub const TABLE_NULL_TOKEN: &str = "NULL";

/// Lexical translation probabilities `t(target | source)`.
#[derive(Debug, Clone)]
pub struct TranslationTable {
    table: FnvHashMap<(Symbol, Symbol), f64>,
    null_fallback: f64,
}

impl TranslationTable {
    pub fn new(null_fallback: f64) -> Self {
        Self {
            table: FnvHashMap::default(),
            null_fallback,
        }
    }

    pub fn insert(&mut self, source: Symbol, target: Symbol, probability: f64) {
        self.table.insert((source, target), probability);
    }

    /// Reads `source target probability` rows separated by whitespace.
    /// Rows that do not parse are skipped and counted.
    pub fn load(path: impl AsRef<Path>, dict: &mut TokenDictionary, null_fallback: f64) -> GrammarResult<Self> {
        let path = path.as_ref();
        info!("📖 Loading translation table from '{}'", path.display());
        let file = File::open(path)?;
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b' ')
            .has_headers(false)
            .quoting(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut table = Self::new(null_fallback);
        let mut skipped = 0;
        for result in rdr.records() {
            let rec = result?;
            let fields: Vec<&str> = rec.iter().filter(|f| !f.is_empty()).collect();
            let [source, target, prob] = fields[..] else {
                skipped += 1;
                continue;
            };
            let Ok(prob) = prob.parse::<f64>() else {
                skipped += 1;
                continue;
            };
            let source = Self::intern(source, dict);
            let target = Self::intern(target, dict);
            table.insert(source, target, prob);
        }

        if skipped > 0 {
            warn!("⚠️  Skipped {} malformed rows in '{}'", skipped, path.display());
        }
        info!("   -> {} entries", table.len());
        Ok(table)
    }

    fn intern(token: &str, dict: &mut TokenDictionary) -> Symbol {
        if token == TABLE_NULL_TOKEN {
            NULL_WORD_ID
        } else {
            dict.index(token)
        }
    }

    /// The stored entry; otherwise the NULL fallback for the empty source
    /// word, and zero for anything else.
    pub fn probability(&self, source: Symbol, target: Symbol) -> f64 {
        match self.table.get(&(source, target)) {
            Some(&p) => p,
            None if source == NULL_WORD_ID => self.null_fallback,
            None => 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
