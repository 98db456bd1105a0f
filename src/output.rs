use crate::corpus::{Corpus, TrainingInstance};
use crate::dictionary::TokenDictionary;
use crate::error::GrammarResult;
use crate::ghkm::format_links;
use crate::grammar::{Grammar, OutputFormat};
use crate::links::LinkConstructor;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const STEM: &str = "output";

/// The directory every artifact of a run is written to. Snapshot files carry
/// the epoch between stem and extension: `output.25.grammar`.
#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    pub fn create(root: impl AsRef<Path>) -> GrammarResult<Self> {
        let root = root.as_ref().to_path_buf();
        if root.exists() {
            warn!("⚠️  Output directory '{}' exists, files will be overwritten", root.display());
        }
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, epoch: Option<usize>, extension: &str) -> PathBuf {
        let name = match epoch {
            Some(e) => format!("{}.{}.{}", STEM, e, extension),
            None => format!("{}.{}", STEM, extension),
        };
        self.root.join(name)
    }

    fn create_file(&self, epoch: Option<usize>, extension: &str) -> GrammarResult<(PathBuf, BufWriter<File>)> {
        let path = self.path(epoch, extension);
        let file = File::create(&path)?;
        Ok((path, BufWriter::new(file)))
    }

    pub fn write_grammar(
        &self,
        grammar: &Grammar,
        format: OutputFormat,
        dict: &TokenDictionary,
        epoch: Option<usize>,
    ) -> GrammarResult<PathBuf> {
        let (path, mut out) = self.create_file(epoch, "grammar")?;
        grammar.write(&mut out, format, dict)?;
        out.flush()?;
        info!("💾 Wrote {} rules to '{}'", grammar.len(), path.display());
        Ok(path)
    }

    /// Forward and reverse links, one line per grammar entry.
    pub fn write_links(&self, grammar: &Grammar, links: &LinkConstructor, epoch: Option<usize>) -> GrammarResult<()> {
        for (extension, reverse) in [("fwd_links", false), ("rev_links", true)] {
            let (_, mut out) = self.create_file(epoch, extension)?;
            for entry in grammar.iter() {
                writeln!(out, "{}", format_links(&links.rule_links(&entry.rule, reverse)))?;
            }
            out.flush()?;
        }
        Ok(())
    }

    pub fn write_alignments(
        &self,
        instances: &[TrainingInstance],
        links: &LinkConstructor,
        epoch: Option<usize>,
    ) -> GrammarResult<()> {
        let (_, mut out) = self.create_file(epoch, "alignments")?;
        for instance in instances {
            writeln!(out, "{}", format_links(&links.instance_alignment(instance)?))?;
        }
        out.flush()?;
        Ok(())
    }

    pub fn write_state(
        &self,
        instances: &[TrainingInstance],
        dict: &TokenDictionary,
        epoch: Option<usize>,
    ) -> GrammarResult<PathBuf> {
        let (path, mut out) = self.create_file(epoch, "state")?;
        Corpus::write_state(instances, &mut out, dict)?;
        out.flush()?;
        Ok(path)
    }

    /// Opens `output.stats.jsonl`, truncated once per run; each epoch adds a
    /// line.
    pub fn stats_writer(&self) -> GrammarResult<BufWriter<File>> {
        Ok(self.create_file(None, "stats.jsonl")?.1)
    }
}
