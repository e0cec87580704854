//! Logical File Registry
//!
//! Tracks every named data artifact of a run together with the job that
//! produces it and the jobs that consume it. Job-to-job dependencies are
//! never stored; they are answered from this index on demand.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use log::debug;
use serde::Serialize;

use super::job::JobId;
use crate::error::{GraphError, Result};

/// Handle to a file interned in a [`FileRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(usize);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "file#{}", self.0)
    }
}

/// A named, location-independent data artifact.
#[derive(Debug, Clone, Serialize)]
pub struct LogicalFile {
    /// Logical file name, unique within the registry
    pub name: String,

    /// Job that writes this file, `None` when it is supplied externally
    pub producer: Option<JobId>,

    /// Jobs that read this file
    pub consumers: BTreeSet<JobId>,

    /// Whether the file must be copied to durable storage
    pub stage_out: bool,
}

impl LogicalFile {
    fn new(name: String) -> Self {
        Self {
            name,
            producer: None,
            consumers: BTreeSet::new(),
            stage_out: false,
        }
    }

    /// True when no job in the graph writes this file.
    pub fn is_external(&self) -> bool {
        self.producer.is_none()
    }
}

/// Name-keyed store of logical files and their producer/consumer links.
///
/// Files are never removed during a run, so a [`FileId`] handed out by
/// this registry stays valid for the registry's lifetime.
#[derive(Debug, Clone, Default)]
pub struct FileRegistry {
    files: Vec<LogicalFile>,
    by_name: HashMap<String, FileId>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the handle for `name`, registering the file on first use.
    pub fn intern(&mut self, name: impl Into<String>) -> FileId {
        let name = name.into();
        if let Some(id) = self.by_name.get(&name) {
            return *id;
        }

        let id = FileId(self.files.len());
        debug!("Registered file '{}' as {}", name, id);
        self.by_name.insert(name.clone(), id);
        self.files.push(LogicalFile::new(name));
        id
    }

    /// Looks up a file handle by name without registering it.
    pub fn lookup(&self, name: &str) -> Option<FileId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: FileId) -> Option<&LogicalFile> {
        self.files.get(id.0)
    }

    pub fn contains(&self, id: FileId) -> bool {
        id.0 < self.files.len()
    }

    /// Returns the logical name of a file, or its handle if unknown.
    pub fn name_of(&self, id: FileId) -> String {
        self.get(id)
            .map(|f| f.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    pub fn producer_of(&self, id: FileId) -> Option<JobId> {
        self.get(id).and_then(|f| f.producer)
    }

    /// Checks that `job` may become the producer of `id` without
    /// modifying the registry.
    pub fn check_producer(&self, id: FileId, job: JobId) -> Result<()> {
        let file = self.get(id).ok_or_else(|| GraphError::UnknownFile {
            job: job.to_string(),
            file: id.to_string(),
        })?;

        match file.producer {
            Some(existing) if existing != job => Err(GraphError::DuplicateProducer {
                file: file.name.clone(),
                existing: existing.to_string(),
                attempted: job.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Records `job` as the producer of `id`.
    ///
    /// Fails with [`GraphError::DuplicateProducer`] if a different job
    /// already produces the file. Recording the same producer twice is
    /// allowed.
    pub fn record_producer(&mut self, id: FileId, job: JobId) -> Result<()> {
        self.check_producer(id, job)?;
        self.files[id.0].producer = Some(job);
        Ok(())
    }

    /// Records `job` as a consumer of `id`. Idempotent.
    pub fn record_consumer(&mut self, id: FileId, job: JobId) -> Result<()> {
        let file = self.files.get_mut(id.0).ok_or_else(|| GraphError::UnknownFile {
            job: job.to_string(),
            file: id.to_string(),
        })?;
        file.consumers.insert(job);
        Ok(())
    }

    /// Sets the durable-staging flag of a file.
    ///
    /// Once a file is marked durable it stays durable.
    pub fn mark_stage_out(&mut self, id: FileId, stage_out: bool) {
        if let Some(file) = self.files.get_mut(id.0) {
            file.stage_out |= stage_out;
        }
    }

    /// Iterates files in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (FileId, &LogicalFile)> {
        self.files.iter().enumerate().map(|(i, f)| (FileId(i), f))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_returns_existing_handle() {
        let mut registry = FileRegistry::new();
        let first = registry.intern("SRR2584863_1.fastq");
        let second = registry.intern("SRR2584863_1.fastq");
        let other = registry.intern("SRR2584863_2.fastq");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_does_not_register() {
        let mut registry = FileRegistry::new();
        assert!(registry.lookup("ref.fa").is_none());
        assert!(registry.is_empty());

        let id = registry.intern("ref.fa");
        assert_eq!(registry.lookup("ref.fa"), Some(id));
    }

    #[test]
    fn test_record_producer_rejects_second_producer() {
        let mut registry = FileRegistry::new();
        let sam = registry.intern("i0-SRR2584863.aligned.sam");

        registry.record_producer(sam, JobId::new(0)).unwrap();
        let result = registry.record_producer(sam, JobId::new(1));

        assert!(matches!(result, Err(GraphError::DuplicateProducer { .. })));
        assert_eq!(registry.producer_of(sam), Some(JobId::new(0)));
    }

    #[test]
    fn test_record_same_producer_twice_is_ok() {
        let mut registry = FileRegistry::new();
        let bam = registry.intern("i0-SRR2584863.aligned.bam");

        registry.record_producer(bam, JobId::new(3)).unwrap();
        assert!(registry.record_producer(bam, JobId::new(3)).is_ok());
    }

    #[test]
    fn test_record_consumer_is_idempotent() {
        let mut registry = FileRegistry::new();
        let genome = registry.intern("i0-ref.fa");

        registry.record_consumer(genome, JobId::new(1)).unwrap();
        registry.record_consumer(genome, JobId::new(1)).unwrap();
        registry.record_consumer(genome, JobId::new(4)).unwrap();

        let file = registry.get(genome).unwrap();
        assert_eq!(file.consumers.len(), 2);
        assert!(file.is_external());
    }

    #[test]
    fn test_unknown_handle_is_reported() {
        let registry = FileRegistry::new();
        let mut other = FileRegistry::new();
        let foreign = other.intern("elsewhere.txt");

        assert!(!registry.contains(foreign));
        assert!(matches!(
            registry.check_producer(foreign, JobId::new(0)),
            Err(GraphError::UnknownFile { .. })
        ));
        assert_eq!(registry.name_of(foreign), "file#0");
    }

    #[test]
    fn test_stage_out_is_sticky() {
        let mut registry = FileRegistry::new();
        let vcf = registry.intern("i0-SRR2584863_final_variants.bcf");

        registry.mark_stage_out(vcf, true);
        registry.mark_stage_out(vcf, false);

        assert!(registry.get(vcf).unwrap().stage_out);
    }

    #[test]
    fn test_iter_preserves_registration_order() {
        let mut registry = FileRegistry::new();
        registry.intern("b");
        registry.intern("a");
        registry.intern("c");

        let names: Vec<_> = registry.iter().map(|(_, f)| f.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
