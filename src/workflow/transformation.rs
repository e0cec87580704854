//! Transformation Registry
//!
//! Maps executable names to the metadata the planner needs to invoke them:
//! site, container, physical location, staging mode and default resource
//! requests. Every job's executable is resolved here before the job is
//! accepted, so a misspelt tool name fails at assembly time.

use std::collections::BTreeMap;
use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Kind of resource a job can request from the execution substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Memory request, e.g. "2 GB"
    Memory,
    /// Number of cores
    Cores,
    /// Scratch disk request
    Disk,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Memory => "memory",
            Self::Cores => "cores",
            Self::Disk => "disk",
        };
        f.write_str(name)
    }
}

/// Requested amount per resource kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceProfile(BTreeMap<ResourceKind, String>);

impl ResourceProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ResourceKind, amount: impl Into<String>) -> Self {
        self.set(kind, amount);
        self
    }

    pub fn set(&mut self, kind: ResourceKind, amount: impl Into<String>) {
        self.0.insert(kind, amount.into());
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&str> {
        self.0.get(&kind).map(String::as_str)
    }

    /// Returns this profile with every key of `overrides` replacing the
    /// corresponding value here.
    pub fn merged_with(&self, overrides: &ResourceProfile) -> ResourceProfile {
        let mut merged = self.clone();
        for (kind, amount) in &overrides.0 {
            merged.0.insert(*kind, amount.clone());
        }
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, &str)> {
        self.0.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Image packaging format understood by the execution substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Singularity,
    Docker,
    Shifter,
}

/// A container image shared by one or more transformations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Container {
    pub name: String,
    pub format: ContainerFormat,
    /// Pull location, e.g. `docker://pegasus/variant-calling:latest`
    pub image: String,
}

impl Container {
    pub fn new(name: impl Into<String>, format: ContainerFormat, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            format,
            image: image.into(),
        }
    }
}

/// Reusable description of an executable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transformation {
    /// Executable reference used by jobs
    pub name: String,

    /// Site the executable lives on
    pub site: String,

    /// Container the executable runs in, if any
    pub container: Option<String>,

    /// Physical location of the executable
    pub pfn: String,

    /// Whether the binary must be shipped to the execution site
    pub is_stageable: bool,

    /// Resource requests applied to every job invoking this executable
    pub resources: ResourceProfile,

    /// Execution-limit category shared by every job of this executable
    pub category: Option<String>,
}

impl Transformation {
    pub fn new(name: impl Into<String>, site: impl Into<String>, pfn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            site: site.into(),
            container: None,
            pfn: pfn.into(),
            is_stageable: false,
            resources: ResourceProfile::new(),
            category: None,
        }
    }

    pub fn stageable(mut self, is_stageable: bool) -> Self {
        self.is_stageable = is_stageable;
        self
    }

    pub fn in_container(mut self, container: impl Into<String>) -> Self {
        self.container = Some(container.into());
        self
    }

    pub fn with_resource(mut self, kind: ResourceKind, amount: impl Into<String>) -> Self {
        self.resources.set(kind, amount);
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Deployment-wide catalog of containers and transformations.
///
/// Populated once before assembly and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct TransformationRegistry {
    containers: BTreeMap<String, Container>,
    transformations: BTreeMap<String, Transformation>,
}

impl TransformationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_container(&mut self, container: Container) -> Result<()> {
        if self.containers.contains_key(&container.name) {
            return Err(GraphError::DuplicateContainer(container.name));
        }
        debug!("Registered container '{}' ({})", container.name, container.image);
        self.containers.insert(container.name.clone(), container);
        Ok(())
    }

    /// Registers a transformation.
    ///
    /// Fails if the name is taken or if the transformation names a
    /// container that was not registered first.
    pub fn register(&mut self, transformation: Transformation) -> Result<()> {
        if self.transformations.contains_key(&transformation.name) {
            return Err(GraphError::DuplicateTransformation(transformation.name));
        }

        if let Some(container) = &transformation.container {
            if !self.containers.contains_key(container) {
                return Err(GraphError::UnknownContainer {
                    transformation: transformation.name.clone(),
                    container: container.clone(),
                });
            }
        }

        debug!(
            "Registered transformation '{}' at {} (site {})",
            transformation.name, transformation.pfn, transformation.site
        );
        self.transformations
            .insert(transformation.name.clone(), transformation);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&Transformation> {
        self.transformations
            .get(name)
            .ok_or_else(|| GraphError::UnknownTransformation(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.transformations.contains_key(name)
    }

    /// Iterates transformations sorted by name.
    pub fn transformations(&self) -> impl Iterator<Item = &Transformation> {
        self.transformations.values()
    }

    pub fn containers(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn len(&self) -> usize {
        self.transformations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container() -> Container {
        Container::new(
            "variant-calling",
            ContainerFormat::Singularity,
            "docker://pegasus/variant-calling:latest",
        )
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = TransformationRegistry::new();
        registry.add_container(container()).unwrap();
        registry
            .register(
                Transformation::new("bwa", "incontainer", "/opt/software/install/bwa/default/bwa")
                    .in_container("variant-calling")
                    .with_resource(ResourceKind::Memory, "1 GB"),
            )
            .unwrap();

        let bwa = registry.lookup("bwa").unwrap();
        assert_eq!(bwa.site, "incontainer");
        assert!(!bwa.is_stageable);
        assert_eq!(bwa.resources.get(ResourceKind::Memory), Some("1 GB"));
    }

    #[test]
    fn test_duplicate_transformation_rejected() {
        let mut registry = TransformationRegistry::new();
        registry
            .register(Transformation::new("samtools", "local", "/tools/samtools_wrapper"))
            .unwrap();

        let result = registry.register(Transformation::new("samtools", "local", "/other"));
        assert!(matches!(result, Err(GraphError::DuplicateTransformation(name)) if name == "samtools"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_transformation() {
        let registry = TransformationRegistry::new();
        assert!(matches!(
            registry.lookup("bwa-mem2"),
            Err(GraphError::UnknownTransformation(name)) if name == "bwa-mem2"
        ));
    }

    #[test]
    fn test_transformation_requires_registered_container() {
        let mut registry = TransformationRegistry::new();
        let result = registry.register(
            Transformation::new("bcftools", "incontainer", "/opt/bcftools").in_container("missing"),
        );
        assert!(matches!(result, Err(GraphError::UnknownContainer { .. })));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_duplicate_container_rejected() {
        let mut registry = TransformationRegistry::new();
        registry.add_container(container()).unwrap();
        assert!(matches!(
            registry.add_container(container()),
            Err(GraphError::DuplicateContainer(_))
        ));
    }

    #[test]
    fn test_override_wins_per_key() {
        let defaults = ResourceProfile::new()
            .with(ResourceKind::Memory, "1 GB")
            .with(ResourceKind::Cores, "1");
        let overrides = ResourceProfile::new().with(ResourceKind::Cores, "3");

        let merged = defaults.merged_with(&overrides);
        assert_eq!(merged.get(ResourceKind::Memory), Some("1 GB"));
        assert_eq!(merged.get(ResourceKind::Cores), Some("3"));
        assert_eq!(defaults.get(ResourceKind::Cores), Some("1"));
    }

    #[test]
    fn test_transformations_iterate_sorted() {
        let mut registry = TransformationRegistry::new();
        registry.register(Transformation::new("vcfutils", "incontainer", "/v")).unwrap();
        registry.register(Transformation::new("bcftools", "incontainer", "/b")).unwrap();

        let names: Vec<_> = registry.transformations().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["bcftools", "vcfutils"]);
    }
}
