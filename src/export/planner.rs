//! Planner Back-ends
//!
//! [`CommandPlanner`] writes the documents and runs the external planner
//! program; [`DryRunPlanner`] only writes the documents.

use std::path::PathBuf;
use std::process::Command;

use log::{debug, error, info};

use super::render::{PlanDocuments, WrittenDocuments};
use super::{PlanOptions, Planner, SubmissionHandle};
use crate::error::{GraphError, Result};

/// Name of the planner's submit directory inside the output directory.
pub const SUBMIT_DIR: &str = "submit";

/// Invokes an external planner program and submits the workflow.
#[derive(Debug, Clone)]
pub struct CommandPlanner {
    program: String,
    extra_args: Vec<String>,
    output_dir: PathBuf,
}

impl CommandPlanner {
    pub fn new(program: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            extra_args: Vec::new(),
            output_dir: output_dir.into(),
        }
    }

    /// Arguments placed before the generated ones.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    fn command(&self, documents: &WrittenDocuments, options: &PlanOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.extra_args)
            .arg("--conf")
            .arg(&documents.properties)
            .arg("--dir")
            .arg(self.output_dir.join(SUBMIT_DIR))
            .arg("--sites")
            .arg(&options.execution_site);

        for (execution, staging) in &options.staging_sites {
            cmd.arg("--staging-site")
                .arg(format!("{}={}", execution, staging));
        }

        cmd.arg("--output-sites")
            .arg(&options.output_site)
            .arg("--verbose")
            .arg("--submit")
            .arg(&documents.workflow);
        cmd
    }
}

impl Planner for CommandPlanner {
    fn plan(&self, documents: &PlanDocuments, options: &PlanOptions) -> Result<SubmissionHandle> {
        let written = documents.write_to(&self.output_dir)?;
        let mut cmd = self.command(&written, options);
        debug!("Running planner: {:?}", cmd);

        let output = cmd
            .output()
            .map_err(|e| GraphError::io(format!("Failed to run planner '{}'", self.program), e))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            error!("Planner exited with {}", output.status);
            return Err(GraphError::PlanningFailed {
                output: format!("{}{}", stdout, stderr),
            });
        }

        info!("Planner accepted workflow '{}'", documents.workflow.name);
        Ok(SubmissionHandle::new(
            &documents.workflow.name,
            &written,
            Some(self.output_dir.join(SUBMIT_DIR)),
            stdout,
            true,
        ))
    }
}

/// Writes the planner documents without planning or submitting.
#[derive(Debug, Clone)]
pub struct DryRunPlanner {
    output_dir: PathBuf,
}

impl DryRunPlanner {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl Planner for DryRunPlanner {
    fn plan(&self, documents: &PlanDocuments, _options: &PlanOptions) -> Result<SubmissionHandle> {
        let written = documents.write_to(&self.output_dir)?;
        info!("Dry run: workflow written to {}", written.workflow.display());
        Ok(SubmissionHandle::new(
            &documents.workflow.name,
            &written,
            None,
            String::new(),
            false,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::replica::ReplicaCatalog;
    use crate::catalog::site::SiteTopology;
    use crate::export::render::{
        render_replicas, render_sites, render_transformations, render_workflow,
    };
    use crate::workflow::graph::WorkflowGraph;
    use crate::workflow::transformation::TransformationRegistry;
    use std::collections::BTreeMap;
    use std::path::Path;
    use tempfile::tempdir;

    fn documents() -> PlanDocuments {
        PlanDocuments {
            workflow: render_workflow(&WorkflowGraph::new("variant-calling"), None),
            transformations: render_transformations(&TransformationRegistry::new()),
            replicas: render_replicas(&ReplicaCatalog::new()),
            sites: render_sites(&SiteTopology::default_for(Path::new("/srv/run"))),
            properties: BTreeMap::new(),
        }
    }

    #[test]
    fn test_dry_run_writes_documents_only() {
        let temp_dir = tempdir().unwrap();
        let planner = DryRunPlanner::new(temp_dir.path());

        let handle = planner.plan(&documents(), &PlanOptions::default()).unwrap();

        assert!(!handle.submitted);
        assert!(handle.submit_dir.is_none());
        assert!(handle.workflow_file.exists());
        assert!(!temp_dir.path().join(SUBMIT_DIR).exists());
    }

    #[test]
    fn test_successful_planner_yields_handle() {
        let temp_dir = tempdir().unwrap();
        let planner = CommandPlanner::new("true", temp_dir.path());

        let handle = planner.plan(&documents(), &PlanOptions::default()).unwrap();

        assert!(handle.submitted);
        assert_eq!(handle.workflow_name, "variant-calling");
        assert_eq!(handle.submit_dir, Some(temp_dir.path().join(SUBMIT_DIR)));
    }

    #[test]
    fn test_failing_planner_output_is_verbatim() {
        let temp_dir = tempdir().unwrap();
        let planner = CommandPlanner::new("sh", temp_dir.path()).with_args(vec![
            "-c".to_string(),
            "echo 'planning...'; echo 'ERROR: site condorpool has no directories' >&2; exit 3"
                .to_string(),
            "planner".to_string(),
        ]);

        let result = planner.plan(&documents(), &PlanOptions::default());

        match result {
            Err(GraphError::PlanningFailed { output }) => {
                assert_eq!(output, "planning...\nERROR: site condorpool has no directories\n");
            }
            other => panic!("expected PlanningFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_planner_program() {
        let temp_dir = tempdir().unwrap();
        let planner = CommandPlanner::new("/nonexistent/pegasus-plan", temp_dir.path());

        let result = planner.plan(&documents(), &PlanOptions::default());
        assert!(matches!(result, Err(GraphError::Io { .. })));
    }

    #[test]
    fn test_command_arguments() {
        let temp_dir = tempdir().unwrap();
        let written = documents().write_to(temp_dir.path()).unwrap();
        let planner = CommandPlanner::new("pegasus-plan", temp_dir.path());

        let cmd = planner.command(&written, &PlanOptions::default());
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert_eq!(cmd.get_program(), "pegasus-plan");
        assert!(args.windows(2).any(|w| w[0] == "--sites" && w[1] == "condorpool"));
        assert!(args.windows(2).any(|w| w[0] == "--staging-site" && w[1] == "condorpool=osn"));
        assert!(args.windows(2).any(|w| w[0] == "--output-sites" && w[1] == "local"));
        assert_eq!(args.last().map(String::as_str), written.workflow.to_str());
    }
}
