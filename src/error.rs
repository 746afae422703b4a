/// Error types for the indexing engine.
use std::path::PathBuf;

use thiserror::Error;

use crate::chunk::Chunk;

/// Errors produced while indexing source trees.
///
/// Only [`IndexError::RootNotFound`] and [`IndexError::Cancelled`] ever escape
/// [`crate::indexer::Indexer::index`]; the other variants are per-unit and get
/// logged and counted instead.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("root path does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("grammar error: {0}")]
    Grammar(#[from] tree_sitter::LanguageError),

    #[error("indexing cancelled after {} chunks", partial.len())]
    Cancelled { partial: Vec<Chunk> },
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error aborts the whole run rather than a single unit.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::RootNotFound(_) | Self::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
