//! Replica Catalog
//!
//! Bindings from logical file names to physical locations for files that
//! no job produces.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaEntry {
    pub site: String,
    pub lfn: String,
    pub pfn: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct ReplicaCatalog {
    entries: Vec<ReplicaEntry>,
}

impl ReplicaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, site: impl Into<String>, lfn: impl Into<String>, pfn: impl Into<PathBuf>) {
        self.entries.push(ReplicaEntry {
            site: site.into(),
            lfn: lfn.into(),
            pfn: pfn.into(),
        });
    }

    pub fn contains(&self, lfn: &str) -> bool {
        self.entries.iter().any(|e| e.lfn == lfn)
    }

    pub fn entries(&self) -> &[ReplicaEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_contains() {
        let mut catalog = ReplicaCatalog::new();
        catalog.add("local", "i0-ref.fa", "/data/ref.fa");
        catalog.add("local", "i1-ref.fa", "/data/ref.fa");

        assert!(catalog.contains("i1-ref.fa"));
        assert!(!catalog.contains("ref.fa"));
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.entries()[0].pfn, PathBuf::from("/data/ref.fa"));
    }
}
