pub mod extract;
pub mod sample;

use clap::Args;
use ruleforge::dictionary::TokenDictionary;
use ruleforge::error::GrammarResult;
use ruleforge::links::LinkConstructor;
use ruleforge::model::TranslationTable;
use std::path::PathBuf;
use std::sync::Arc;

/// The three line-aligned input files.
#[derive(Args, Debug, Clone)]
pub struct CorpusArgs {
    /// One bracketed source tree per line.
    #[arg(long)]
    pub trees: PathBuf,
    /// One target sentence per line.
    #[arg(long)]
    pub strings: PathBuf,
    /// One line of `source-target` word links per sentence.
    #[arg(long)]
    pub alignments: PathBuf,
}

/// IBM Model 1 tables, `source target probability` per line.
#[derive(Args, Debug, Clone)]
pub struct TableArgs {
    /// t(target | source). Enables the ibm1 string prior.
    #[arg(long)]
    pub ibm1_forward: Option<PathBuf>,
    /// t(source | target). Together with the forward table enables rule links.
    #[arg(long)]
    pub ibm1_reverse: Option<PathBuf>,
}

pub struct Tables {
    pub forward: Option<Arc<TranslationTable>>,
    pub links: Option<LinkConstructor>,
}

fn read_table(
    path: Option<&PathBuf>,
    dict: &mut TokenDictionary,
    null_fallback: f64,
) -> GrammarResult<Option<Arc<TranslationTable>>> {
    match path {
        Some(p) => Ok(Some(Arc::new(TranslationTable::load(p, dict, null_fallback)?))),
        None => Ok(None),
    }
}

impl TableArgs {
    pub fn load(&self, dict: &mut TokenDictionary, null_fallback: f64) -> GrammarResult<Tables> {
        let forward = read_table(self.ibm1_forward.as_ref(), dict, null_fallback)?;
        let reverse = read_table(self.ibm1_reverse.as_ref(), dict, null_fallback)?;
        let links = match (&forward, reverse) {
            (Some(f), Some(r)) => Some(LinkConstructor::new(Arc::clone(f), r)),
            _ => None,
        };
        Ok(Tables { forward, links })
    }
}
