use thiserror::Error;

/// Failures raised by the catalog/query loaders and the dataset builder.
///
/// Every input-derived variant carries the source name and the 1-based line
/// number so the operator can fix the upstream file and rerun.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema violation in {source_name} line {line}: no known gender marker in {record:?}")]
    SchemaViolation {
        source_name: String,
        line: usize,
        record: String,
    },

    #[error("malformed record in {source_name} line {line}: {reason}")]
    MalformedRecord {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("category {key} is not registered")]
    UnregisteredCategory { key: String },

    #[error("no resolved sessions left to build a dataset from")]
    EmptyDataset,

    #[error("vectorizer learned an empty vocabulary")]
    EmptyVocabulary,

    #[error("vectorizer returned {rows} rows for {documents} queries")]
    VectorizerRowMismatch { documents: usize, rows: usize },
}

impl DataError {
    pub fn malformed(source_name: &str, line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            source_name: source_name.to_string(),
            line,
            reason: reason.into(),
        }
    }
}

pub type DataResult<T> = std::result::Result<T, DataError>;
