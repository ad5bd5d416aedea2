use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds for indexing, storage and search.
#[derive(Debug, Error)]
pub enum Error {
    /// IO failure enumerating files.
    #[error("walk error: {0}")]
    Walk(#[from] ignore::Error),

    /// An extractor could not parse a source file.
    #[error("parse error in {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// The search filter could not be built.
    #[error("filter build error: {0}")]
    FilterBuild(String),

    /// A schema or filter write failed.
    #[error("serialize error: {0}")]
    Serialize(String),

    /// A schema or filter file on disk is corrupt.
    #[error("decode error: {0}")]
    Decode(String),

    /// Project, page or language lookup missed.
    #[error("not found: {0}")]
    NotFound(String),

    /// A project name that would escape the index directory.
    #[error("invalid project name: {0:?}")]
    InvalidProjectName(String),

    /// The operation's cancellation token fired; nothing was committed.
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Several failures from one pipeline run. Extractor errors are
    /// collected here while the successful extractors' output is still
    /// written.
    #[error("{0}")]
    Aggregate(Aggregate),
}

impl Error {
    /// True if this error should surface as a 404 rather than a 500.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Error::Serialize(err.to_string())
        } else {
            Error::Decode(err.to_string())
        }
    }
}

/// Collects errors from concurrent pipeline stages.
#[derive(Debug, Default)]
pub struct Aggregate(pub Vec<Error>);

impl Aggregate {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, err: Error) {
        self.0.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Ok if nothing was collected, otherwise the combined error. A single
    /// collected error is returned as itself.
    pub fn into_result(self) -> Result<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.into_iter().next().unwrap()),
            _ => Err(Error::Aggregate(self)),
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred:", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n\t* {}", err)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_empty_is_ok() {
        assert!(Aggregate::new().into_result().is_ok());
    }

    #[test]
    fn test_aggregate_single_unwraps() {
        let mut agg = Aggregate::new();
        agg.push(Error::NotFound("x".to_string()));
        let err = agg.into_result().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_aggregate_many_lists_all() {
        let mut agg = Aggregate::new();
        agg.push(Error::NotFound("a".to_string()));
        agg.push(Error::FilterBuild("b".to_string()));
        let err = agg.into_result().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("2 errors occurred"));
        assert!(msg.contains("not found: a"));
        assert!(msg.contains("filter build error: b"));
    }
}
