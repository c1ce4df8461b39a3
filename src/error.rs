//! Error types for loading, emitting and the end-to-end build step.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::ast::Location;

/// Failures while reading, parsing or linking a document.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Malformed input.
    #[error("{location}: {message}")]
    Parse { location: Location, message: String },
    /// A type name that is not declared anywhere in the document.
    #[error("{location}: unknown type `{name}`")]
    UnresolvedReference { name: String, location: Location },
    /// Two declarations, or two members of one owner, share a name.
    #[error("{location}: `{name}` is already declared at {previous}")]
    DuplicateDeclaration {
        name: String,
        location: Location,
        previous: Location,
    },
    /// Composite types containing each other by value.
    #[error("circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LoadError {
    pub(crate) fn parse(location: Location, message: impl Into<String>) -> Self {
        LoadError::Parse {
            location,
            message: message.into(),
        }
    }

    /// The source location, when the error points into the document.
    pub fn location(&self) -> Option<Location> {
        match self {
            LoadError::Parse { location, .. }
            | LoadError::UnresolvedReference { location, .. }
            | LoadError::DuplicateDeclaration { location, .. } => Some(*location),
            LoadError::CircularDependency { .. } | LoadError::Io { .. } => None,
        }
    }
}

/// Failures while writing a generated artifact.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("no document is bound to the generator")]
    Unbound,
    #[error("cannot write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EmitError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EmitError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A build-step failure, tagged with the phase that failed.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("failed to load {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: LoadError,
    },
    #[error("header emission failed: {0}")]
    Header(#[source] EmitError),
    #[error("source emission failed: {0}")]
    Source(#[source] EmitError),
    /// Both artifacts rendered but replacing the outputs failed.
    #[error("writing outputs failed: {0}")]
    Write(#[source] EmitError),
}
