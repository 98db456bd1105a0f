use super::{CorpusArgs, TableArgs};
use crate::reports;
use clap::Args;
use rayon::prelude::*;
use ruleforge::config::Config;
use ruleforge::corpus::Corpus;
use ruleforge::dictionary::TokenDictionary;
use ruleforge::error::GrammarResult;
use ruleforge::grammar::Grammar;
use ruleforge::model::RuleCounts;
use ruleforge::output::OutputDir;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[command(flatten)]
    pub tables: TableArgs,

    #[command(flatten)]
    pub config: Config,
}

/// Writes the minimal GHKM grammar of the corpus without sampling.
pub fn run(args: ExtractArgs, config: Config) -> GrammarResult<()> {
    config.validate()?;

    let mut dict = TokenDictionary::new();
    let corpus = Corpus::load(&args.corpus.trees, &args.corpus.strings, &args.corpus.alignments, &mut dict)?;
    let tables = args.tables.load(&mut dict, config.prior.null_fallback)?;

    let derivations = corpus
        .instances
        .par_iter()
        .map(|i| i.rules())
        .collect::<GrammarResult<Vec<_>>>()?;
    let mut counts = RuleCounts::new(config.prior.alpha);
    for rule in derivations.iter().flatten() {
        counts.increment(rule);
    }
    info!("⛏️  Extracted {} minimal rules ({} distinct)", counts.total(), counts.distinct_rules());

    let out = OutputDir::create(&config.output.output)?;
    let grammar = Grammar::from_counts(&counts, config.output.min_rule_count, &dict)?;
    out.write_grammar(&grammar, config.output.format, &dict, None)?;
    if let Some(links) = &tables.links {
        out.write_links(&grammar, links, None)?;
        if config.output.align {
            out.write_alignments(&corpus.instances, links, None)?;
        }
    }
    out.write_state(&corpus.instances, &dict, None)?;

    let fingerprint = grammar.fingerprint(config.output.format, &dict)?;
    if config.output.stats {
        reports::print_top_rules(&grammar, &dict)?;
    }
    reports::print_grammar_summary(&grammar, config.output.format, &fingerprint);
    Ok(())
}
