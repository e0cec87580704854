//! Error Types
//!
//! A single error enum covers the three failure families of graph
//! assembly: configuration errors, graph consistency errors and
//! export/planning errors. All of them are fatal; nothing is retried.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Sample list '{}' is unreadable: {source}", .path.display())]
    SampleListUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Reference genome '{}' cannot be resolved: {source}", .path.display())]
    ReferenceGenomeUnresolvable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Repetition count must be a positive integer (got {0})")]
    InvalidRepetitions(usize),

    #[error("Configuration file '{}' is unreadable: {source}", .path.display())]
    ConfigUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Configuration file '{}' is invalid: {message}", .path.display())]
    ConfigInvalid { path: PathBuf, message: String },

    #[error("File '{file}' is already produced by job {existing}; job {attempted} cannot also produce it")]
    DuplicateProducer {
        file: String,
        existing: String,
        attempted: String,
    },

    #[error("Transformation '{0}' is already registered")]
    DuplicateTransformation(String),

    #[error("Transformation '{0}' is not registered")]
    UnknownTransformation(String),

    #[error("Container '{0}' is already registered")]
    DuplicateContainer(String),

    #[error("Transformation '{transformation}' uses unregistered container '{container}'")]
    UnknownContainer {
        transformation: String,
        container: String,
    },

    #[error("Job {job} references {file}, which is not in the file registry")]
    UnknownFile { job: String, file: String },

    #[error("Job {job} reads '{file}', which no job produces and no replica provides")]
    MissingReplica { job: String, file: String },

    #[error("Site '{0}' is not part of the site topology")]
    UnknownSite(String),

    #[error("Workflow graph contains a dependency cycle")]
    CyclicDependency,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to serialize {0}")]
    Serialization(String),

    #[error("Workflow planning failed")]
    PlanningFailed { output: String },
}

impl GraphError {
    /// Wraps an I/O error with a short description of what was attempted.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Returns the planner's diagnostic payload for planning failures.
    pub fn planner_output(&self) -> Option<&str> {
        match self {
            Self::PlanningFailed { output } => Some(output),
            _ => None,
        }
    }
}
