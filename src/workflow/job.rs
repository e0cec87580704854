//! Job Model
//!
//! A job is one invocation of a registered transformation. Its argument
//! list is kept as typed tokens so file references can be checked
//! structurally and rendered to names only when the graph is exported.
//!
//! # Example
//!
//! ```
//! use variantflow::workflow::{FileRegistry, JobSpec};
//!
//! let mut files = FileRegistry::new();
//! let variants = files.intern("i0-SRR2584863_variants.bcf");
//! let final_variants = files.intern("i0-SRR2584863_final_variants.bcf");
//!
//! let spec = JobSpec::new("vcfutils", "variant_calling")
//!     .arg("varFilter")
//!     .file_arg(variants)
//!     .input(variants)
//!     .stdout(final_variants);
//!
//! assert_eq!(spec.outputs, vec![final_variants]);
//! ```

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::file::{FileId, FileRegistry};
use super::transformation::{ResourceKind, ResourceProfile};

/// Handle to a job inside a [`WorkflowGraph`](super::WorkflowGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(usize);

impl JobId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID{:07}", self.0 + 1)
    }
}

/// One token of a job's command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    Literal(String),
    File(FileId),
}

impl Argument {
    /// Renders the token, replacing file handles with logical names.
    pub fn render(&self, files: &FileRegistry) -> String {
        match self {
            Self::Literal(text) => text.clone(),
            Self::File(id) => files.name_of(*id),
        }
    }
}

/// Declaration of a job before it is added to the graph.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub transformation: String,
    pub label: String,
    pub arguments: Vec<Argument>,
    pub inputs: Vec<FileId>,
    pub outputs: Vec<FileId>,
    pub stdout: Option<FileId>,
    pub resources: ResourceProfile,
    pub category: Option<String>,
}

impl JobSpec {
    pub fn new(transformation: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            transformation: transformation.into(),
            label: label.into(),
            arguments: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            stdout: None,
            resources: ResourceProfile::new(),
            category: None,
        }
    }

    /// Appends a literal argument.
    pub fn arg(mut self, text: impl Into<String>) -> Self {
        self.arguments.push(Argument::Literal(text.into()));
        self
    }

    /// Appends an argument that refers to a logical file.
    pub fn file_arg(mut self, file: FileId) -> Self {
        self.arguments.push(Argument::File(file));
        self
    }

    pub fn input(mut self, file: FileId) -> Self {
        push_unique(&mut self.inputs, file);
        self
    }

    pub fn inputs(mut self, files: impl IntoIterator<Item = FileId>) -> Self {
        for file in files {
            push_unique(&mut self.inputs, file);
        }
        self
    }

    pub fn output(mut self, file: FileId) -> Self {
        push_unique(&mut self.outputs, file);
        self
    }

    pub fn outputs(mut self, files: impl IntoIterator<Item = FileId>) -> Self {
        for file in files {
            push_unique(&mut self.outputs, file);
        }
        self
    }

    /// Declares `file` as the job's standard output. The file also becomes
    /// one of the job's outputs.
    pub fn stdout(mut self, file: FileId) -> Self {
        self.stdout = Some(file);
        push_unique(&mut self.outputs, file);
        self
    }

    /// Overrides one resource request of the transformation defaults.
    pub fn resource(mut self, kind: ResourceKind, amount: impl Into<String>) -> Self {
        self.resources.set(kind, amount);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Every file handle the declaration mentions.
    pub(crate) fn referenced_files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .copied()
            .chain(self.arguments.iter().filter_map(|a| match a {
                Argument::File(id) => Some(*id),
                Argument::Literal(_) => None,
            }))
    }
}

fn push_unique(files: &mut Vec<FileId>, file: FileId) {
    if !files.contains(&file) {
        files.push(file);
    }
}

/// A job accepted into the graph.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,

    /// Executable reference, resolved in the transformation registry
    pub transformation: String,

    /// Diagnostic label, not unique
    pub label: String,

    pub arguments: Vec<Argument>,
    pub inputs: Vec<FileId>,
    pub outputs: Vec<FileId>,

    /// Output captured from the process's standard output
    pub stdout: Option<FileId>,

    /// Transformation defaults merged with per-job overrides
    pub resources: ResourceProfile,

    /// Execution-limit category
    pub category: Option<String>,

    /// Setup file sourced before the job's command runs
    pub env_source: Option<PathBuf>,
}

impl Job {
    pub(crate) fn from_spec(id: JobId, spec: JobSpec) -> Self {
        Self {
            id,
            transformation: spec.transformation,
            label: spec.label,
            arguments: spec.arguments,
            inputs: spec.inputs,
            outputs: spec.outputs,
            stdout: spec.stdout,
            resources: spec.resources,
            category: spec.category,
            env_source: None,
        }
    }

    pub fn render_arguments(&self, files: &FileRegistry) -> Vec<String> {
        self.arguments.iter().map(|a| a.render(files)).collect()
    }

    /// Human-readable command line, including stdout redirection.
    pub fn command_line(&self, files: &FileRegistry) -> String {
        let mut parts = vec![self.transformation.clone()];
        parts.extend(self.render_arguments(files));
        if let Some(stdout) = self.stdout {
            parts.push(format!("> {}", files.name_of(stdout)));
        }
        parts.join(" ")
    }
}
