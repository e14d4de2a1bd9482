use thiserror::Error;

/// Row-local failures. Rows missing a protein or DNA change are not errors
/// at all; the parser drops them before a record is materialized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    #[error("invalid affected-case count '{0}': expected a non-negative integer")]
    BadCaseCount(String),
    #[error("chromosome '{0}' is not a recognized human chromosome")]
    UnknownChromosome(String),
}
