//! Planner Documents
//!
//! Serialisable views of the graph and catalogs in the planner's YAML
//! layout. Job dependencies are written out here, resolved from each
//! job's inputs to their registered producers.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Serialize;

use crate::catalog::replica::ReplicaCatalog;
use crate::catalog::site::{DirectoryKind, Operation, SiteTopology, ENV_SOURCE_PROFILE};
use crate::error::{GraphError, Result};
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::job::Job;
use crate::workflow::transformation::{
    ContainerFormat, ResourceKind, ResourceProfile, TransformationRegistry,
};

/// Schema version of the generated documents.
pub const DOCUMENT_VERSION: &str = "5.0";

pub const WORKFLOW_FILE: &str = "workflow.yml";
pub const TRANSFORMATIONS_FILE: &str = "transformations.yml";
pub const REPLICAS_FILE: &str = "replicas.yml";
pub const SITES_FILE: &str = "sites.yml";
pub const PROPERTIES_FILE: &str = "pegasus.properties";

type Profiles = BTreeMap<&'static str, BTreeMap<String, String>>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDocument {
    pub pegasus: &'static str,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hooks: Option<HooksDocument>,
    pub jobs: Vec<JobDocument>,
    pub job_dependencies: Vec<DependencyDocument>,
}

#[derive(Debug, Serialize)]
pub struct HooksDocument {
    pub shell: Vec<ShellHookDocument>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellHookDocument {
    #[serde(rename = "_on")]
    pub on: &'static str,
    pub cmd: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDocument {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub id: String,
    pub node_label: String,
    pub arguments: Vec<String>,
    pub uses: Vec<UseDocument>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: Profiles,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseDocument {
    pub lfn: String,
    #[serde(rename = "type")]
    pub link: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_out: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_replica: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DependencyDocument {
    pub id: String,
    pub children: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TransformationCatalogDocument {
    pub pegasus: &'static str,
    pub transformations: Vec<TransformationDocument>,
    pub containers: Vec<ContainerDocument>,
}

#[derive(Debug, Serialize)]
pub struct TransformationDocument {
    pub name: String,
    pub sites: Vec<TransformationSiteDocument>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: Profiles,
}

#[derive(Debug, Serialize)]
pub struct TransformationSiteDocument {
    pub name: String,
    pub pfn: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContainerDocument {
    pub name: String,
    #[serde(rename = "type")]
    pub format: &'static str,
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct ReplicaCatalogDocument {
    pub pegasus: &'static str,
    pub replicas: Vec<ReplicaDocument>,
}

#[derive(Debug, Serialize)]
pub struct ReplicaDocument {
    pub lfn: String,
    pub pfns: Vec<PfnDocument>,
}

#[derive(Debug, Serialize)]
pub struct PfnDocument {
    pub site: String,
    pub pfn: String,
}

#[derive(Debug, Serialize)]
pub struct SiteCatalogDocument {
    pub pegasus: &'static str,
    pub sites: Vec<SiteDocument>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDocument {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(rename = "os.type", skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    pub directories: Vec<DirectoryDocument>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: Profiles,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryDocument {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub path: String,
    pub file_servers: Vec<FileServerDocument>,
}

#[derive(Debug, Serialize)]
pub struct FileServerDocument {
    pub url: String,
    pub operation: &'static str,
}

/// Everything the planner needs, rendered and ready to write.
#[derive(Debug)]
pub struct PlanDocuments {
    pub workflow: WorkflowDocument,
    pub transformations: TransformationCatalogDocument,
    pub replicas: ReplicaCatalogDocument,
    pub sites: SiteCatalogDocument,
    pub properties: BTreeMap<String, String>,
}

/// Paths of the documents written to disk.
#[derive(Debug, Clone)]
pub struct WrittenDocuments {
    pub dir: PathBuf,
    pub workflow: PathBuf,
    pub transformations: PathBuf,
    pub replicas: PathBuf,
    pub sites: PathBuf,
    pub properties: PathBuf,
}

impl PlanDocuments {
    /// Writes all documents into `dir`, creating it if needed.
    ///
    /// The properties file points the planner at the catalog files.
    pub fn write_to(&self, dir: &Path) -> Result<WrittenDocuments> {
        fs::create_dir_all(dir)
            .map_err(|e| GraphError::io(format!("Failed to create {}", dir.display()), e))?;

        let written = WrittenDocuments {
            dir: dir.to_path_buf(),
            workflow: dir.join(WORKFLOW_FILE),
            transformations: dir.join(TRANSFORMATIONS_FILE),
            replicas: dir.join(REPLICAS_FILE),
            sites: dir.join(SITES_FILE),
            properties: dir.join(PROPERTIES_FILE),
        };

        write_yaml(&written.workflow, &self.workflow)?;
        write_yaml(&written.transformations, &self.transformations)?;
        write_yaml(&written.replicas, &self.replicas)?;
        write_yaml(&written.sites, &self.sites)?;

        let mut properties = self.properties.clone();
        for (kind, path) in [
            ("transformation", &written.transformations),
            ("replica", &written.replicas),
            ("site", &written.sites),
        ] {
            properties
                .entry(format!("pegasus.catalog.{}.file", kind))
                .or_insert_with(|| path.display().to_string());
        }
        write_file(&written.properties, &render_properties(&properties))?;

        info!("Wrote planner documents to {}", dir.display());
        Ok(written)
    }
}

fn write_yaml<T: Serialize>(path: &Path, document: &T) -> Result<()> {
    let yaml = serde_yaml::to_string(document)
        .map_err(|e| GraphError::Serialization(format!("{}: {}", path.display(), e)))?;
    write_file(path, &yaml)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content)
        .map_err(|e| GraphError::io(format!("Failed to write {}", path.display()), e))?;
    debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(())
}

/// Renders `key = value` lines.
pub fn render_properties(properties: &BTreeMap<String, String>) -> String {
    properties
        .iter()
        .map(|(k, v)| format!("{} = {}\n", k, v))
        .collect()
}

/// Groups resource requests and the execution-limit category by profile
/// namespace.
fn resource_profiles(resources: &ResourceProfile, category: Option<&str>) -> Profiles {
    let mut profiles = Profiles::new();

    for (kind, amount) in resources.iter() {
        let (namespace, key) = match kind {
            ResourceKind::Memory => ("condor", "request_memory"),
            ResourceKind::Disk => ("condor", "request_disk"),
            ResourceKind::Cores => ("pegasus", "cores"),
        };
        profiles
            .entry(namespace)
            .or_default()
            .insert(key.to_string(), amount.to_string());
    }

    if let Some(category) = category {
        profiles
            .entry("dagman")
            .or_default()
            .insert("category".to_string(), category.to_string());
    }

    profiles
}

fn job_profiles(job: &Job) -> Profiles {
    let mut profiles = resource_profiles(&job.resources, job.category.as_deref());

    if let Some(env_source) = &job.env_source {
        profiles
            .entry("pegasus")
            .or_default()
            .insert(ENV_SOURCE_PROFILE.to_string(), env_source.display().to_string());
    }

    profiles
}

pub fn render_workflow(graph: &WorkflowGraph, hook: Option<&str>) -> WorkflowDocument {
    let files = graph.files();

    let jobs = graph
        .jobs()
        .iter()
        .map(|job| {
            let inputs = job.inputs.iter().map(|id| UseDocument {
                lfn: files.name_of(*id),
                link: "input",
                stage_out: None,
                register_replica: None,
            });
            let outputs = job.outputs.iter().map(|id| {
                let stage_out = files.get(*id).map(|f| f.stage_out).unwrap_or(false);
                UseDocument {
                    lfn: files.name_of(*id),
                    link: "output",
                    stage_out: Some(stage_out),
                    register_replica: Some(stage_out),
                }
            });

            JobDocument {
                kind: "job",
                name: job.transformation.clone(),
                id: job.id.to_string(),
                node_label: job.label.clone(),
                arguments: job.render_arguments(files),
                uses: inputs.chain(outputs).collect(),
                profiles: job_profiles(job),
                stdout: job.stdout.map(|id| files.name_of(id)),
            }
        })
        .collect();

    let job_dependencies = graph
        .jobs()
        .iter()
        .filter_map(|job| {
            let children = graph.dependents(job.id);
            if children.is_empty() {
                return None;
            }
            Some(DependencyDocument {
                id: job.id.to_string(),
                children: children.iter().map(|c| c.to_string()).collect(),
            })
        })
        .collect();

    let hooks = hook.map(|cmd| HooksDocument {
        shell: vec![ShellHookDocument {
            on: "all",
            cmd: cmd.to_string(),
        }],
    });

    WorkflowDocument {
        pegasus: DOCUMENT_VERSION,
        name: graph.name().to_string(),
        hooks,
        jobs,
        job_dependencies,
    }
}

pub fn render_transformations(registry: &TransformationRegistry) -> TransformationCatalogDocument {
    let transformations = registry
        .transformations()
        .map(|t| {
            TransformationDocument {
                name: t.name.clone(),
                sites: vec![TransformationSiteDocument {
                    name: t.site.clone(),
                    pfn: t.pfn.clone(),
                    kind: if t.is_stageable { "stageable" } else { "installed" },
                    container: t.container.clone(),
                }],
                profiles: resource_profiles(&t.resources, t.category.as_deref()),
            }
        })
        .collect();

    let containers = registry
        .containers()
        .map(|c| ContainerDocument {
            name: c.name.clone(),
            format: match c.format {
                ContainerFormat::Singularity => "singularity",
                ContainerFormat::Docker => "docker",
                ContainerFormat::Shifter => "shifter",
            },
            image: c.image.clone(),
        })
        .collect();

    TransformationCatalogDocument {
        pegasus: DOCUMENT_VERSION,
        transformations,
        containers,
    }
}

pub fn render_replicas(replicas: &ReplicaCatalog) -> ReplicaCatalogDocument {
    ReplicaCatalogDocument {
        pegasus: DOCUMENT_VERSION,
        replicas: replicas
            .entries()
            .iter()
            .map(|e| ReplicaDocument {
                lfn: e.lfn.clone(),
                pfns: vec![PfnDocument {
                    site: e.site.clone(),
                    pfn: e.pfn.display().to_string(),
                }],
            })
            .collect(),
    }
}

pub fn render_sites(topology: &SiteTopology) -> SiteCatalogDocument {
    let sites = topology
        .sites()
        .iter()
        .map(|site| {
            let directories = site
                .directories
                .iter()
                .map(|d| DirectoryDocument {
                    kind: match d.kind {
                        DirectoryKind::SharedScratch => "sharedScratch",
                        DirectoryKind::SharedStorage => "sharedStorage",
                        DirectoryKind::LocalStorage => "localStorage",
                    },
                    path: d.path.clone(),
                    file_servers: d
                        .file_servers
                        .iter()
                        .map(|server| FileServerDocument {
                            url: server.url.clone(),
                            operation: match server.operation {
                                Operation::All => "all",
                                Operation::Get => "get",
                                Operation::Put => "put",
                            },
                        })
                        .collect(),
                })
                .collect();

            let mut profiles = Profiles::new();
            if !site.profiles.is_empty() {
                profiles.insert("pegasus", site.profiles.clone());
            }

            SiteDocument {
                name: site.name.clone(),
                arch: site.arch.clone(),
                os_type: site.os_type.clone(),
                directories,
                profiles,
            }
        })
        .collect();

    SiteCatalogDocument {
        pegasus: DOCUMENT_VERSION,
        sites,
    }
}
