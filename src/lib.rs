//! VariantFlow - Variant Calling Workflow Generator
//!
//! Assembles the job-dependency graph of a replicated variant calling
//! pipeline and hands it to a grid workflow planner for submission.
//! Dependencies are never declared by hand: they are inferred from the
//! files each job reads and writes.
//!
//! # Architecture
//!
//! The library is organized into four main modules:
//!
//! - [`workflow`]: File registry, job graph and iterated pipeline assembly
//! - [`catalog`]: Executables, replica bindings and site topology
//! - [`export`]: Consistency checks, planner documents and submission
//! - [`config`]: Per-deployment YAML configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use variantflow::catalog::tools::default_transformations;
//! use variantflow::config::DeploymentConfig;
//! use variantflow::export::{export, DryRunPlanner, PlanOptions};
//! use variantflow::workflow::{AssemblyRequest, ReplicationController};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DeploymentConfig::default();
//!     let registry = default_transformations(&config)?;
//!
//!     let controller =
//!         ReplicationController::new(&config.workflow_name, &registry, &config.staging);
//!     let assembly = controller.assemble(&AssemblyRequest {
//!         sample_list: "sra_ids.txt".into(),
//!         reference_genome: "ecoli_rel606.fasta".into(),
//!         repetitions: 2,
//!         job_env_file: None,
//!     })?;
//!
//!     let sites = config.site_topology(Path::new("/data/run"));
//!     let handle = export(
//!         &assembly.graph,
//!         &registry,
//!         &assembly.replicas,
//!         &sites,
//!         &PlanOptions::from_config(&config)?,
//!         &DryRunPlanner::new("generated"),
//!     )?;
//!     println!("{}", handle.workflow_file.display());
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod export;
pub mod workflow;

// Re-export commonly used types
pub use config::{load_config, DeploymentConfig};
pub use error::{GraphError, Result};
pub use export::{export, Planner, SubmissionHandle};
pub use workflow::{GraphBuilder, JobSpec, ReplicationController, WorkflowGraph};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "VariantFlow";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "VariantFlow");
    }

    #[test]
    fn test_module_exports_graph() {
        let graph = WorkflowGraph::new("variant-calling");
        assert!(graph.is_empty());
        assert_eq!(graph.name(), "variant-calling");
    }

    #[test]
    fn test_module_exports_job_spec() {
        let spec = JobSpec::new("bwa", "ref_genome_index").arg("index");
        assert_eq!(spec.transformation, "bwa");
        assert_eq!(spec.label, "ref_genome_index");
    }

    #[test]
    fn test_version_format() {
        let parts: Vec<&str> = VERSION.split('.').collect();
        assert!(parts.len() >= 2, "Version should have at least major.minor");
        for part in parts {
            assert!(part.parse::<u32>().is_ok(), "Version components should be numeric");
        }
    }
}
