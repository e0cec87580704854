//! Site Topology
//!
//! Execution and storage locations handed to the planner. Each site has
//! directories, and each directory exposes one or more file servers.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, Result};

/// Site name used for the submit host and for replica bindings.
pub const LOCAL_SITE: &str = "local";

/// Site name for executables that are already installed in the container.
pub const IN_CONTAINER_SITE: &str = "incontainer";

/// Profile key naming the setup file sourced before every job.
pub const ENV_SOURCE_PROFILE: &str = "pegasus_lite_env_source";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryKind {
    /// Ephemeral per-workflow scratch space
    SharedScratch,
    /// Durable storage on a shared file system
    SharedStorage,
    /// Durable storage local to the site
    LocalStorage,
}

impl DirectoryKind {
    pub fn is_durable(self) -> bool {
        !matches!(self, DirectoryKind::SharedScratch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    #[default]
    All,
    Get,
    Put,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileServer {
    pub url: String,
    #[serde(default)]
    pub operation: Operation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Directory {
    pub kind: DirectoryKind,
    pub path: String,
    #[serde(default)]
    pub file_servers: Vec<FileServer>,
}

impl Directory {
    pub fn new(kind: DirectoryKind, path: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            file_servers: Vec::new(),
        }
    }

    pub fn with_file_server(mut self, url: impl Into<String>, operation: Operation) -> Self {
        self.file_servers.push(FileServer {
            url: url.into(),
            operation,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Site {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    #[serde(default)]
    pub directories: Vec<Directory>,
    /// Execution profiles applied to every job running on this site
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, String>,
}

impl Site {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arch: None,
            os_type: None,
            directories: Vec::new(),
            profiles: BTreeMap::new(),
        }
    }

    pub fn with_platform(mut self, arch: impl Into<String>, os_type: impl Into<String>) -> Self {
        self.arch = Some(arch.into());
        self.os_type = Some(os_type.into());
        self
    }

    pub fn with_directory(mut self, directory: Directory) -> Self {
        self.directories.push(directory);
        self
    }

    pub fn has_durable_storage(&self) -> bool {
        self.directories.iter().any(|d| d.kind.is_durable())
    }
}

/// The set of sites known to one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteTopology {
    sites: Vec<Site>,
}

impl SiteTopology {
    pub fn new(sites: Vec<Site>) -> Self {
        Self { sites }
    }

    /// Topology of the stock deployment: the submit host with scratch and
    /// storage directories under `base_dir`, plus an S3 staging bucket.
    pub fn default_for(base_dir: &Path) -> Self {
        let scratch = base_dir.join("work").display().to_string();
        let storage = base_dir.join("storage").display().to_string();

        let osn = Site::new("osn")
            .with_platform("x86_64", "linux")
            .with_directory(
                Directory::new(
                    DirectoryKind::SharedScratch,
                    "/asc190064-bucket01/pegasus-workflows/variant",
                )
                .with_file_server(
                    "s3://vahi@osn/asc190064-bucket01/pegasus-workflows/variant",
                    Operation::All,
                ),
            );

        let local = Site::new(LOCAL_SITE)
            .with_directory(
                Directory::new(DirectoryKind::SharedScratch, scratch.clone())
                    .with_file_server(format!("file://{}", scratch), Operation::All),
            )
            .with_directory(
                Directory::new(DirectoryKind::LocalStorage, storage.clone())
                    .with_file_server(format!("file://{}", storage), Operation::All),
            );

        Self::new(vec![osn, local])
    }

    pub fn get(&self, name: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets an execution profile on an existing site.
    pub fn set_profile(
        &mut self,
        site: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        let site = self
            .sites
            .iter_mut()
            .find(|s| s.name == site)
            .ok_or_else(|| GraphError::UnknownSite(site.to_string()))?;
        site.profiles.insert(key.into(), value.into());
        Ok(())
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}
