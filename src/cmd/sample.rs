use super::{CorpusArgs, TableArgs};
use crate::reports;
use clap::Args;
use ruleforge::config::Config;
use ruleforge::corpus::{Corpus, TrainingInstance};
use ruleforge::dictionary::TokenDictionary;
use ruleforge::error::{GrammarError, GrammarResult};
use ruleforge::grammar::Grammar;
use ruleforge::links::LinkConstructor;
use ruleforge::model::{BaseMeasure, RuleCounts};
use ruleforge::output::OutputDir;
use ruleforge::sampler::{EpochReport, ProgressCallback, Sampler, SamplerOptions};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

#[derive(Args, Debug, Clone)]
pub struct SampleArgs {
    #[command(flatten)]
    pub corpus: CorpusArgs,

    #[command(flatten)]
    pub tables: TableArgs,

    /// Start from a previously written `.state` file instead of the GHKM
    /// derivations.
    #[arg(long)]
    pub resume: Option<PathBuf>,

    #[command(flatten)]
    pub config: Config,
}

/// Writes the per-epoch outputs: a JSON line per epoch, optional tables and
/// periodic snapshots.
struct EpochReporter<'a> {
    config: &'a Config,
    dict: &'a TokenDictionary,
    out: &'a OutputDir,
    links: Option<&'a LinkConstructor>,
    stats: Mutex<BufWriter<File>>,
}

impl EpochReporter<'_> {
    fn write_outputs(
        &self,
        counts: &RuleCounts,
        instances: &[TrainingInstance],
        epoch: Option<usize>,
    ) -> GrammarResult<Grammar> {
        let grammar = Grammar::from_counts(counts, self.config.output.min_rule_count, self.dict)?;
        self.out.write_grammar(&grammar, self.config.output.format, self.dict, epoch)?;
        if let Some(links) = self.links {
            self.out.write_links(&grammar, links, epoch)?;
            if self.config.output.align {
                self.out.write_alignments(instances, links, epoch)?;
            }
        }
        self.out.write_state(instances, self.dict, epoch)?;
        Ok(grammar)
    }
}

impl ProgressCallback for EpochReporter<'_> {
    fn on_epoch(&self, report: &EpochReport, counts: &RuleCounts, instances: &[TrainingInstance]) -> GrammarResult<()> {
        {
            let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
            serde_json::to_writer(&mut *stats, report)?;
            writeln!(stats)?;
            stats.flush()?;
        }

        if self.config.output.stats {
            reports::print_epoch_report(report);
            reports::print_histogram(report);
        }

        let freq = self.config.sampler.log_freq;
        if freq > 0 && report.epoch % freq == 0 {
            info!("📸 Snapshot at epoch {}", report.epoch);
            self.write_outputs(counts, instances, Some(report.epoch))?;
        }
        Ok(())
    }
}

pub fn run(args: SampleArgs, config: Config) -> GrammarResult<()> {
    config.validate()?;

    let mut dict = TokenDictionary::new();
    let mut corpus = Corpus::load(&args.corpus.trees, &args.corpus.strings, &args.corpus.alignments, &mut dict)?;
    if let Some(state) = &args.resume {
        info!("♻️  Resuming from '{}'", state.display());
        corpus.load_state(state, &dict)?;
    }

    let tables = args.tables.load(&mut dict, config.prior.null_fallback)?;
    if config.output.align && tables.links.is_none() {
        return Err(GrammarError::Config(
            "--align needs both --ibm1-forward and --ibm1-reverse".to_string(),
        ));
    }

    let base = BaseMeasure::from_params(&corpus.instances, &config.prior, tables.forward.clone())?;
    let out = OutputDir::create(&config.output.output)?;
    let mut sampler = Sampler::new(corpus.instances, base, SamplerOptions::from(&config))?;

    let reporter = EpochReporter {
        config: &config,
        dict: &dict,
        out: &out,
        links: tables.links.as_ref(),
        stats: Mutex::new(out.stats_writer()?),
    };
    sampler.run(&reporter)?;

    let grammar = reporter.write_outputs(sampler.counts(), sampler.instances(), None)?;
    let fingerprint = grammar.fingerprint(config.output.format, &dict)?;
    info!("✅ Done. Grammar fingerprint {}", fingerprint);
    if config.output.stats {
        reports::print_top_rules(&grammar, &dict)?;
    }
    reports::print_grammar_summary(&grammar, config.output.format, &fingerprint);
    Ok(())
}
