use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrammarError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV Parsing Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Parse Error (line {line}): {message}")]
    Parse { line: usize, message: String },

    #[error(
        "Parallel corpus mismatch: {trees} trees, {strings} target strings, {alignments} alignments"
    )]
    MismatchedCorpus {
        trees: usize,
        strings: usize,
        alignments: usize,
    },

    #[error("Alignment link {source_index}-{target_index} out of range (line {line})")]
    AlignmentOutOfRange {
        line: usize,
        source_index: usize,
        target_index: usize,
    },

    #[error("Unknown symbol id: {0}")]
    UnknownSymbol(u32),

    #[error("PCFG production never observed: {lhs} -> {rhs:?}")]
    UnseenProduction { lhs: u32, rhs: Vec<u32> },

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Thread Pool Error: {0}")]
    ThreadPool(String),
}

impl GrammarError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Attaches the input line number to errors raised below the readers.
    pub fn at_line(self, line: usize) -> Self {
        match self {
            Self::Parse { message, .. } => Self::Parse { line, message },
            Self::AlignmentOutOfRange {
                source_index,
                target_index,
                ..
            } => Self::AlignmentOutOfRange {
                line,
                source_index,
                target_index,
            },
            other => other,
        }
    }
}

pub type GrammarResult<T> = Result<T, GrammarError>;
