//! Workflow Graph Module
//!
//! Data structures and assembly logic for the job-dependency graph.
//!
//! # Structure
//!
//! - [`file`]: Logical file registry with producer/consumer links
//! - [`transformation`]: Executable catalog and resource profiles
//! - [`job`]: Job declarations and argument tokens
//! - [`graph`]: Graph builder and dependency queries
//! - [`staging`]: Durable-staging decisions per file role
//! - [`replication`]: Iterated assembly of the variant calling pipeline

pub mod file;
pub mod graph;
pub mod job;
pub mod replication;
pub mod staging;
pub mod transformation;

pub use file::{FileId, FileRegistry, LogicalFile};
pub use graph::{GraphBuilder, WorkflowGraph};
pub use job::{Argument, Job, JobId, JobSpec};
pub use replication::{Assembly, AssemblyRequest, ReplicationController};
pub use staging::{FileRole, StagingPolicy};
pub use transformation::{
    Container, ContainerFormat, ResourceKind, ResourceProfile, Transformation,
    TransformationRegistry,
};
