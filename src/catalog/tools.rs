//! Pipeline Tools
//!
//! The container and the five executables the variant calling pipeline
//! invokes.

use log::info;

use super::site::{IN_CONTAINER_SITE, LOCAL_SITE};
use crate::config::DeploymentConfig;
use crate::error::Result;
use crate::workflow::transformation::{ResourceKind, Transformation, TransformationRegistry};

pub const FASTERQ_DUMP: &str = "fasterq-dump";
pub const BWA: &str = "bwa";
pub const SAMTOOLS: &str = "samtools";
pub const BCFTOOLS: &str = "bcftools";
pub const VCFUTILS: &str = "vcfutils";

/// Builds the transformation registry for a deployment.
///
/// The two wrapper scripts are staged from `tools_dir`; the remaining
/// tools are already installed in the container image.
pub fn default_transformations(config: &DeploymentConfig) -> Result<TransformationRegistry> {
    let mut registry = TransformationRegistry::new();
    let container = config.container.name.clone();
    registry.add_container(config.container.clone())?;

    let wrapper = |name: &str| config.tools_dir.join(name).display().to_string();

    registry.register(
        Transformation::new(FASTERQ_DUMP, LOCAL_SITE, wrapper("fasterq_dump_wrapper"))
            .in_container(&container)
            .stageable(true)
            .with_resource(ResourceKind::Memory, "1 GB")
            // caps the number of concurrent downloads
            .with_category(FASTERQ_DUMP),
    )?;

    registry.register(
        Transformation::new(BWA, IN_CONTAINER_SITE, "/opt/software/install/bwa/default/bwa")
            .in_container(&container)
            .with_resource(ResourceKind::Memory, "1 GB"),
    )?;

    // converts to BAM, then sorts and indexes it
    registry.register(
        Transformation::new(SAMTOOLS, LOCAL_SITE, wrapper("samtools_wrapper"))
            .in_container(&container)
            .stageable(true)
            .with_resource(ResourceKind::Memory, "2 GB"),
    )?;

    registry.register(
        Transformation::new(
            BCFTOOLS,
            IN_CONTAINER_SITE,
            "/opt/software/install/bcftools/default/bin/bcftools",
        )
        .in_container(&container)
        .with_resource(ResourceKind::Memory, "1 GB"),
    )?;

    registry.register(
        Transformation::new(
            VCFUTILS,
            IN_CONTAINER_SITE,
            "/opt/software/install/bcftools/default/bin/vcfutils.pl",
        )
        .in_container(&container)
        .with_resource(ResourceKind::Memory, "1 GB"),
    )?;

    info!(
        "Registered {} transformations in container '{}'",
        registry.len(),
        container
    );
    Ok(registry)
}
