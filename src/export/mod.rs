//! Graph Export Interface
//!
//! Runs a final consistency pass over the assembled graph and hands it,
//! together with the catalogs, to a [`Planner`]. Planning failures are
//! surfaced verbatim and never retried.
//!
//! # Structure
//!
//! - [`render`]: Planner document layout
//! - [`planner`]: Command-line and dry-run planner back-ends

pub mod planner;
pub mod render;

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::catalog::replica::ReplicaCatalog;
use crate::catalog::site::SiteTopology;
use crate::config::DeploymentConfig;
use crate::error::{GraphError, Result};
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::transformation::TransformationRegistry;

pub use planner::{CommandPlanner, DryRunPlanner};
pub use render::{PlanDocuments, WrittenDocuments};

/// Planner options that accompany the documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    pub execution_site: String,
    /// Execution site -> staging site
    pub staging_sites: BTreeMap<String, String>,
    pub output_site: String,
    pub properties: BTreeMap<String, String>,
    pub notification_hook: Option<String>,
}

impl PlanOptions {
    pub fn from_config(config: &DeploymentConfig) -> Result<Self> {
        Ok(Self {
            execution_site: config.execution_site.clone(),
            staging_sites: config.staging_sites.clone(),
            output_site: config.output_site.clone(),
            properties: config.properties.clone(),
            notification_hook: config.resolved_notification_hook()?,
        })
    }
}

impl Default for PlanOptions {
    fn default() -> Self {
        let config = DeploymentConfig::default();
        Self {
            execution_site: config.execution_site,
            staging_sites: config.staging_sites,
            output_site: config.output_site,
            properties: config.properties,
            notification_hook: None,
        }
    }
}

/// Opaque record of a planned workflow, owned by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionHandle {
    pub workflow_name: String,
    pub documents_dir: PathBuf,
    pub workflow_file: PathBuf,
    /// Planner submit directory; `None` when nothing was submitted
    pub submit_dir: Option<PathBuf>,
    pub planner_output: String,
    pub submitted: bool,
    pub created_at: DateTime<Utc>,
}

impl SubmissionHandle {
    pub fn new(
        workflow_name: &str,
        written: &WrittenDocuments,
        submit_dir: Option<PathBuf>,
        planner_output: String,
        submitted: bool,
    ) -> Self {
        Self {
            workflow_name: workflow_name.to_string(),
            documents_dir: written.dir.clone(),
            workflow_file: written.workflow.clone(),
            submit_dir,
            planner_output,
            submitted,
            created_at: Utc::now(),
        }
    }
}

/// External planning/submission service.
pub trait Planner {
    fn plan(&self, documents: &PlanDocuments, options: &PlanOptions) -> Result<SubmissionHandle>;
}

/// Verifies that the graph and catalogs are internally consistent.
///
/// Checks, in order: every executable resolves, every file a job
/// references is registered, every input is either produced by a job or
/// bound by a replica, every site the planner is pointed at exists, and
/// the graph is acyclic.
pub fn check_consistency(
    graph: &WorkflowGraph,
    registry: &TransformationRegistry,
    replicas: &ReplicaCatalog,
    sites: &SiteTopology,
    options: &PlanOptions,
) -> Result<()> {
    let files = graph.files();

    for job in graph.jobs() {
        registry.lookup(&job.transformation)?;

        let referenced = job.inputs.iter().chain(job.outputs.iter()).chain(job.stdout.iter());
        for file in referenced {
            if !files.contains(*file) {
                return Err(GraphError::UnknownFile {
                    job: job.id.to_string(),
                    file: file.to_string(),
                });
            }
        }

        for input in &job.inputs {
            let name = files.name_of(*input);
            let external = files.get(*input).map_or(true, |f| f.is_external());
            if external && !replicas.contains(&name) {
                return Err(GraphError::MissingReplica {
                    job: job.id.to_string(),
                    file: name,
                });
            }
        }
    }

    let mut required_sites: Vec<&str> = replicas.entries().iter().map(|e| e.site.as_str()).collect();
    required_sites.extend(options.staging_sites.values().map(String::as_str));
    required_sites.push(&options.output_site);
    if let Some(missing) = required_sites.into_iter().find(|s| !sites.contains(s)) {
        return Err(GraphError::UnknownSite(missing.to_string()));
    }

    if let Some(output) = sites.get(&options.output_site) {
        if !output.has_durable_storage() {
            warn!(
                "Output site '{}' has no storage directory; durable files cannot be staged out",
                output.name
            );
        }
    }

    graph.topological_order()?;

    debug!("Consistency check passed for {} jobs", graph.len());
    Ok(())
}

/// Validates the graph, renders the documents and forwards them to
/// `planner`.
pub fn export(
    graph: &WorkflowGraph,
    registry: &TransformationRegistry,
    replicas: &ReplicaCatalog,
    sites: &SiteTopology,
    options: &PlanOptions,
    planner: &dyn Planner,
) -> Result<SubmissionHandle> {
    check_consistency(graph, registry, replicas, sites, options)?;

    let documents = PlanDocuments {
        workflow: render::render_workflow(graph, options.notification_hook.as_deref()),
        transformations: render::render_transformations(registry),
        replicas: render::render_replicas(replicas),
        sites: render::render_sites(sites),
        properties: options.properties.clone(),
    };

    info!(
        "Exporting workflow '{}' ({} jobs, {} dependencies)",
        graph.name(),
        graph.len(),
        documents
            .workflow
            .job_dependencies
            .iter()
            .map(|d| d.children.len())
            .sum::<usize>()
    );

    planner.plan(&documents, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::site::LOCAL_SITE;
    use crate::workflow::graph::GraphBuilder;
    use crate::workflow::job::JobSpec;
    use crate::workflow::transformation::Transformation;
    use std::cell::RefCell;
    use std::path::Path;

    /// Records what it was asked to plan and replies with a fixed outcome.
    struct RecordingPlanner {
        fail_with: Option<String>,
        jobs_seen: RefCell<Option<usize>>,
    }

    impl RecordingPlanner {
        fn new(fail_with: Option<&str>) -> Self {
            Self {
                fail_with: fail_with.map(str::to_string),
                jobs_seen: RefCell::new(None),
            }
        }
    }

    impl Planner for RecordingPlanner {
        fn plan(&self, documents: &PlanDocuments, _options: &PlanOptions) -> Result<SubmissionHandle> {
            *self.jobs_seen.borrow_mut() = Some(documents.workflow.jobs.len());
            if let Some(output) = &self.fail_with {
                return Err(GraphError::PlanningFailed {
                    output: output.clone(),
                });
            }
            let written = WrittenDocuments {
                dir: PathBuf::from("/out"),
                workflow: PathBuf::from("/out/workflow.yml"),
                transformations: PathBuf::from("/out/transformations.yml"),
                replicas: PathBuf::from("/out/replicas.yml"),
                sites: PathBuf::from("/out/sites.yml"),
                properties: PathBuf::from("/out/pegasus.properties"),
            };
            Ok(SubmissionHandle::new(
                &documents.workflow.name,
                &written,
                None,
                String::new(),
                true,
            ))
        }
    }

    fn registry() -> TransformationRegistry {
        let mut registry = TransformationRegistry::new();
        registry
            .register(Transformation::new("bwa", "incontainer", "/opt/bwa"))
            .unwrap();
        registry
    }

    fn indexed_graph(registry: &TransformationRegistry) -> WorkflowGraph {
        let mut builder = GraphBuilder::new("variant-calling", registry);
        let genome = builder.intern("i0-ref.fa");
        let index = builder.intern("i0-ref.fa.bwt");
        builder
            .add_job(
                JobSpec::new("bwa", "ref_genome_index")
                    .arg("index")
                    .file_arg(genome)
                    .input(genome)
                    .output(index),
            )
            .unwrap();
        builder.finish()
    }

    fn replicas() -> ReplicaCatalog {
        let mut replicas = ReplicaCatalog::new();
        replicas.add(LOCAL_SITE, "i0-ref.fa", "/data/ref.fa");
        replicas
    }

    fn sites() -> SiteTopology {
        SiteTopology::default_for(Path::new("/srv/run"))
    }

    #[test]
    fn test_export_forwards_to_planner() {
        let registry = registry();
        let graph = indexed_graph(&registry);
        let planner = RecordingPlanner::new(None);

        let handle = export(
            &graph,
            &registry,
            &replicas(),
            &sites(),
            &PlanOptions::default(),
            &planner,
        )
        .unwrap();

        assert!(handle.submitted);
        assert_eq!(handle.workflow_name, "variant-calling");
        assert_eq!(*planner.jobs_seen.borrow(), Some(1));
    }

    #[test]
    fn test_planning_failure_is_surfaced() {
        let registry = registry();
        let graph = indexed_graph(&registry);
        let planner = RecordingPlanner::new(Some("ERROR: no compute site"));

        let result = export(
            &graph,
            &registry,
            &replicas(),
            &sites(),
            &PlanOptions::default(),
            &planner,
        );

        let err = result.unwrap_err();
        assert_eq!(err.planner_output(), Some("ERROR: no compute site"));
    }

    #[test]
    fn test_missing_replica_blocks_export() {
        let registry = registry();
        let graph = indexed_graph(&registry);
        let planner = RecordingPlanner::new(None);

        let result = export(
            &graph,
            &registry,
            &ReplicaCatalog::new(),
            &sites(),
            &PlanOptions::default(),
            &planner,
        );

        assert!(matches!(result, Err(GraphError::MissingReplica { file, .. }) if file == "i0-ref.fa"));
        assert!(planner.jobs_seen.borrow().is_none());
    }

    #[test]
    fn test_unresolvable_executable_blocks_export() {
        let registry = registry();
        let graph = indexed_graph(&registry);

        let result = check_consistency(
            &graph,
            &TransformationRegistry::new(),
            &replicas(),
            &sites(),
            &PlanOptions::default(),
        );
        assert!(matches!(result, Err(GraphError::UnknownTransformation(_))));
    }

    #[test]
    fn test_unknown_staging_site() {
        let registry = registry();
        let graph = indexed_graph(&registry);
        let mut options = PlanOptions::default();
        options
            .staging_sites
            .insert("condorpool".to_string(), "bucket".to_string());

        let result = check_consistency(&graph, &registry, &replicas(), &sites(), &options);
        assert!(matches!(result, Err(GraphError::UnknownSite(site)) if site == "bucket"));
    }

    #[test]
    fn test_plan_options_from_config() {
        let config = DeploymentConfig {
            output_site: "archive".to_string(),
            ..DeploymentConfig::default()
        };
        let options = PlanOptions::from_config(&config).unwrap();
        assert_eq!(options.output_site, "archive");
        assert_eq!(options.execution_site, "condorpool");
        assert!(options.notification_hook.is_none());
    }
}
