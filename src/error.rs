//src/error.rs

use thiserror::Error;

/// Everything that can abort an A-matrix build. None of these are
/// recoverable: the input is static, so the caller reports and stops.
#[derive(Error, Debug)]
pub enum AMatrixError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line} has {found} rank column(s), expected 7")]
    MissingRanks { line: usize, found: usize },

    #[error("Feature at row {row} has an empty identifier")]
    EmptyIdentifier { row: usize },

    #[error("Label '{label}' at row {row} contains the lineage delimiter")]
    DelimiterInLabel { row: usize, label: String },

    #[error("Feature table contains no features")]
    EmptyTable,

    #[error("Features '{first}' and '{second}' share the lineage '{lineage}'")]
    DuplicateLineage {
        lineage: String,
        first: String,
        second: String,
    },

    #[error("Invalid lineage: {0}")]
    InvalidLineage(String),

    #[error("Leaf '{key}' is not reachable from the root")]
    UnreachableLeaf { key: String },

    #[error("Node '{parent}' has two children keyed '{key}'")]
    DuplicateChild { parent: String, key: String },

    #[error("Node '{key}' is listed under '{parent}' but its parent link points elsewhere")]
    BrokenLink { parent: String, key: String },

    #[error("Two nodes share the key '{key}'")]
    AmbiguousKey { key: String },

    #[error("Leaf '{key}' carries no feature column")]
    MissingFeature { key: String },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, AMatrixError>;
