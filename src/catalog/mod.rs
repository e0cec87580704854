//! Deployment Catalogs
//!
//! Static, per-deployment descriptions handed to the planner alongside the
//! workflow graph.
//!
//! - [`tools`]: The pipeline's containers and transformations
//! - [`site`]: Execution and storage sites
//! - [`replica`]: Physical locations of externally supplied files

pub mod replica;
pub mod site;
pub mod tools;

pub use replica::{ReplicaCatalog, ReplicaEntry};
pub use site::{Directory, DirectoryKind, FileServer, Operation, Site, SiteTopology, LOCAL_SITE};
pub use tools::default_transformations;
