//! Staging Policy
//!
//! Decides per file role whether an output is copied to durable storage.
//! Durability costs storage, so the default table can be overridden per
//! deployment through the `staging` section of the configuration file:
//!
//! ```yaml
//! staging:
//!   sorted_alignment: true
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Role a file plays in the variant calling pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileRole {
    /// Index artifacts of the reference genome (amb, ann, bwt, pac, sa)
    ReferenceIndex,
    /// Paired-end reads fetched by the download job
    RawReads,
    /// SAM alignment written by the aligner
    Alignment,
    /// Unsorted BAM conversion
    BinaryAlignment,
    /// Sorted and indexed BAM
    SortedAlignment,
    /// Raw BCF from the pileup step
    RawVariants,
    /// Called SNVs before filtering
    FilteredVariants,
    /// Final per-sample variant file
    FinalVariants,
}

impl FileRole {
    pub const ALL: [FileRole; 8] = [
        FileRole::ReferenceIndex,
        FileRole::RawReads,
        FileRole::Alignment,
        FileRole::BinaryAlignment,
        FileRole::SortedAlignment,
        FileRole::RawVariants,
        FileRole::FilteredVariants,
        FileRole::FinalVariants,
    ];

    /// Built-in durability table.
    pub fn default_stage_out(self) -> bool {
        match self {
            FileRole::ReferenceIndex
            | FileRole::RawReads
            | FileRole::Alignment
            | FileRole::BinaryAlignment
            | FileRole::SortedAlignment
            | FileRole::RawVariants
            | FileRole::FilteredVariants => false,
            FileRole::FinalVariants => true,
        }
    }
}

/// Durability table with per-deployment overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagingPolicy {
    overrides: BTreeMap<FileRole, bool>,
}

impl StagingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_override(mut self, role: FileRole, stage_out: bool) -> Self {
        self.overrides.insert(role, stage_out);
        self
    }

    pub fn should_stage_out(&self, role: FileRole) -> bool {
        self.overrides
            .get(&role)
            .copied()
            .unwrap_or_else(|| role.default_stage_out())
    }
}
