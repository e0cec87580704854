//! Deployment Configuration
//!
//! Everything that is static per deployment (container image, sites,
//! staging overrides, planner properties) lives in one optional YAML file.
//! Missing keys fall back to the stock deployment.
//!
//! # Example
//!
//! ```yaml
//! workflow_name: variant-calling
//! tools_dir: /srv/pipeline/tools
//! execution_site: condorpool
//! staging_sites:
//!   condorpool: osn
//! staging:
//!   sorted_alignment: true
//! properties:
//!   pegasus.data.configuration: nonsharedfs
//! notify_by_email: true
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::catalog::site::{Site, SiteTopology};
use crate::error::{GraphError, Result};
use crate::workflow::staging::StagingPolicy;
use crate::workflow::transformation::{Container, ContainerFormat};

/// Installation prefix of the planner, derived from the location of
/// `pegasus-version` on the PATH.
pub static PLANNER_HOME: Lazy<Option<PathBuf>> = Lazy::new(|| {
    let output = Command::new("which").arg("pegasus-version").output().ok()?;
    if !output.status.success() {
        warn!("pegasus-version not found on PATH");
        return None;
    }

    let path = PathBuf::from(String::from_utf8_lossy(&output.stdout).trim());
    let home = path.parent()?.parent()?.to_path_buf();
    info!("Using planner installation: {}", home.display());
    Some(home)
});

/// Planner invocation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlannerConfig {
    /// Planner executable
    pub program: String,
    /// Extra arguments placed before the generated ones
    pub args: Vec<String>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            program: "pegasus-plan".to_string(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeploymentConfig {
    pub workflow_name: String,
    pub container: Container,

    /// Host directory holding the stageable wrapper scripts
    pub tools_dir: PathBuf,

    /// Site topology; the stock topology is used when absent
    pub sites: Option<Vec<Site>>,

    pub execution_site: String,

    /// Execution site -> staging site
    pub staging_sites: BTreeMap<String, String>,

    /// Site receiving durable outputs
    pub output_site: String,

    pub staging: StagingPolicy,

    /// Planner properties
    pub properties: BTreeMap<String, String>,

    /// Shell command run by the planner on every workflow event
    pub notification_hook: Option<String>,

    /// Use the planner's bundled e-mail notifier as the hook
    pub notify_by_email: bool,

    pub planner: PlannerConfig,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        let mut staging_sites = BTreeMap::new();
        staging_sites.insert("condorpool".to_string(), "osn".to_string());

        let mut properties = BTreeMap::new();
        properties.insert(
            "pegasus.data.configuration".to_string(),
            "nonsharedfs".to_string(),
        );

        Self {
            workflow_name: "variant-calling".to_string(),
            container: Container::new(
                "variant-calling",
                ContainerFormat::Singularity,
                "docker://pegasus/variant-calling:latest",
            ),
            tools_dir: PathBuf::from("/tools"),
            sites: None,
            execution_site: "condorpool".to_string(),
            staging_sites,
            output_site: "local".to_string(),
            staging: StagingPolicy::default(),
            properties,
            notification_hook: None,
            notify_by_email: false,
            planner: PlannerConfig::default(),
        }
    }
}

impl DeploymentConfig {
    /// Site topology for this deployment.
    pub fn site_topology(&self, base_dir: &Path) -> SiteTopology {
        match &self.sites {
            Some(sites) => SiteTopology::new(sites.clone()),
            None => SiteTopology::default_for(base_dir),
        }
    }

    /// Shell hook command, resolving the e-mail notifier if requested.
    pub fn resolved_notification_hook(&self) -> Result<Option<String>> {
        if let Some(hook) = &self.notification_hook {
            return Ok(Some(hook.clone()));
        }
        if !self.notify_by_email {
            return Ok(None);
        }

        let home = PLANNER_HOME.as_ref().ok_or_else(|| GraphError::ConfigInvalid {
            path: PathBuf::from("notify_by_email"),
            message: "e-mail notification requested but the planner installation was not found"
                .to_string(),
        })?;
        Ok(Some(
            home.join("share/pegasus/notification/email")
                .display()
                .to_string(),
        ))
    }
}

/// Loads a deployment configuration file.
pub fn load_config(path: &Path) -> Result<DeploymentConfig> {
    info!("Loading deployment configuration from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|source| GraphError::ConfigUnreadable {
        path: path.to_path_buf(),
        source,
    })?;

    debug!("Configuration loaded ({} bytes)", content.len());

    let config: DeploymentConfig =
        serde_yaml::from_str(&content).map_err(|e| GraphError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(config)
}
