use crate::error::{GrammarError, GrammarResult};
use crate::grammar::OutputFormat;
use crate::model::{FragmentPriorKind, StringPriorKind};
use crate::sampler::Selection;
use clap::{parser::ValueSource, ArgMatches, Args};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Args, Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    #[command(flatten)]
    pub sampler: SamplerParams,
    #[command(flatten)]
    pub prior: PriorParams,
    #[command(flatten)]
    pub output: OutputParams,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerParams {
    #[arg(long, default_value_t = 100)]
    pub iterations: usize,
    #[arg(long, default_value_t = 1)]
    pub threads: usize,
    /// Entropy-seeded when absent.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Write a grammar snapshot every N epochs (0 = only at the end).
    #[arg(long, default_value_t = 0)]
    pub log_freq: usize,
    #[arg(long, value_enum, default_value_t = Selection::Sample)]
    pub selection: Selection,
    #[arg(long, default_value_t = false)]
    pub no_swaps: bool,
    #[arg(long)]
    pub start_index: Option<usize>,
    #[arg(long)]
    pub end_index: Option<usize>,
}

impl Default for SamplerParams {
    fn default() -> Self {
        Self {
            iterations: 100,
            threads: 1,
            seed: None,
            log_freq: 0,
            selection: Selection::Sample,
            no_swaps: false,
            start_index: None,
            end_index: None,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorParams {
    /// Dirichlet process concentration.
    #[arg(long, default_value_t = 1.0)]
    pub alpha: f64,
    #[arg(long, default_value_t = 0.5)]
    pub pexpand: f64,
    #[arg(long, default_value_t = 0.5)]
    pub pchild: f64,
    #[arg(long, default_value_t = 0.5)]
    pub pterm: f64,
    #[arg(long, value_enum, default_value_t = FragmentPriorKind::Geometric)]
    pub fragment_prior: FragmentPriorKind,
    #[arg(long, value_enum, default_value_t = StringPriorKind::Geometric)]
    pub string_prior: StringPriorKind,
    /// Estimate pexpand per tag from the seed derivations.
    #[arg(long, default_value_t = false)]
    pub smart_expand: bool,
    #[arg(long, default_value_t = 0.9)]
    pub ibm1_weight: f64,
    /// t(target | NULL) for pairs missing from the forward table.
    #[arg(long, default_value_t = 1e-3)]
    pub null_fallback: f64,
}

impl Default for PriorParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            pexpand: 0.5,
            pchild: 0.5,
            pterm: 0.5,
            fragment_prior: FragmentPriorKind::Geometric,
            string_prior: StringPriorKind::Geometric,
            smart_expand: false,
            ibm1_weight: 0.9,
            null_fallback: 1e-3,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputParams {
    #[arg(long, default_value = "output")]
    pub output: String,
    #[arg(long, value_enum, default_value_t = OutputFormat::Stsg)]
    pub format: OutputFormat,
    #[arg(long, default_value_t = 0)]
    pub min_rule_count: i64,
    /// Write the derivation-induced word alignment of every instance.
    #[arg(long, default_value_t = false)]
    pub align: bool,
    /// Print statistics tables after every epoch.
    #[arg(long, default_value_t = false)]
    pub stats: bool,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            output: "output".to_string(),
            format: OutputFormat::Stsg,
            min_rule_count: 0,
            align: false,
            stats: false,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> GrammarResult<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Overwrites fields with the values given explicitly on the command
    /// line; defaults filled in by clap do not count.
    pub fn merge_from_cli(&mut self, cli: &Config, matches: &ArgMatches) {
        macro_rules! update_if_present {
            ($group:ident . $field:ident) => {
                if matches.value_source(stringify!($field)) == Some(ValueSource::CommandLine) {
                    self.$group.$field = cli.$group.$field.clone();
                }
            };
        }

        update_if_present!(sampler.iterations);
        update_if_present!(sampler.threads);
        update_if_present!(sampler.seed);
        update_if_present!(sampler.log_freq);
        update_if_present!(sampler.selection);
        update_if_present!(sampler.no_swaps);
        update_if_present!(sampler.start_index);
        update_if_present!(sampler.end_index);

        update_if_present!(prior.alpha);
        update_if_present!(prior.pexpand);
        update_if_present!(prior.pchild);
        update_if_present!(prior.pterm);
        update_if_present!(prior.fragment_prior);
        update_if_present!(prior.string_prior);
        update_if_present!(prior.smart_expand);
        update_if_present!(prior.ibm1_weight);
        update_if_present!(prior.null_fallback);

        update_if_present!(output.output);
        update_if_present!(output.format);
        update_if_present!(output.min_rule_count);
        update_if_present!(output.align);
        update_if_present!(output.stats);
    }

    pub fn validate(&self) -> GrammarResult<()> {
        let fail = |msg: String| Err(GrammarError::Config(msg));
        if !(self.prior.alpha > 0.0) {
            return fail(format!("alpha must be positive, got {}", self.prior.alpha));
        }
        for (name, p) in [
            ("pexpand", self.prior.pexpand),
            ("pchild", self.prior.pchild),
            ("pterm", self.prior.pterm),
        ] {
            if !(p > 0.0 && p < 1.0) {
                return fail(format!("{} must lie in (0, 1), got {}", name, p));
            }
        }
        if !(0.0..=1.0).contains(&self.prior.ibm1_weight) {
            return fail(format!("ibm1_weight must lie in [0, 1], got {}", self.prior.ibm1_weight));
        }
        if !(self.prior.null_fallback >= 0.0) {
            return fail(format!("null_fallback must be non-negative, got {}", self.prior.null_fallback));
        }
        if self.sampler.threads == 0 {
            return fail("threads must be at least 1".to_string());
        }
        if let (Some(start), Some(end)) = (self.sampler.start_index, self.sampler.end_index) {
            if start >= end {
                return fail(format!("empty sampling interval [{}, {})", start, end));
            }
        }
        Ok(())
    }
}
