//! Job Graph Builder
//!
//! Builds the workflow graph one job at a time. Dependencies are never
//! declared: job A precedes job B exactly when B consumes a file that A
//! produces, so the graph structure follows from which file handles the
//! jobs share.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;

use log::debug;

use super::file::{FileId, FileRegistry};
use super::job::{Job, JobId, JobSpec};
use super::transformation::TransformationRegistry;
use crate::error::{GraphError, Result};

/// All jobs and logical files of one generation run.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    name: String,
    jobs: Vec<Job>,
    files: FileRegistry,
}

impl WorkflowGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: Vec::new(),
            files: FileRegistry::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Jobs in insertion order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(id.index())
    }

    pub fn files(&self) -> &FileRegistry {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn producer_of(&self, file: FileId) -> Option<JobId> {
        self.files.producer_of(file)
    }

    /// Jobs that must finish before `job` can start.
    pub fn dependencies(&self, job: JobId) -> BTreeSet<JobId> {
        let Some(job) = self.job(job) else {
            return BTreeSet::new();
        };

        job.inputs
            .iter()
            .filter_map(|file| self.files.producer_of(*file))
            .filter(|producer| *producer != job.id)
            .collect()
    }

    /// Jobs that read at least one output of `job`.
    pub fn dependents(&self, job: JobId) -> BTreeSet<JobId> {
        let Some(job) = self.job(job) else {
            return BTreeSet::new();
        };

        job.outputs
            .iter()
            .filter_map(|file| self.files.get(*file))
            .flat_map(|file| file.consumers.iter().copied())
            .filter(|consumer| *consumer != job.id)
            .collect()
    }

    /// Every `(parent, child)` edge, sorted.
    pub fn edges(&self) -> Vec<(JobId, JobId)> {
        let mut edges: Vec<_> = self
            .jobs
            .iter()
            .flat_map(|job| {
                self.dependencies(job.id)
                    .into_iter()
                    .map(move |parent| (parent, job.id))
            })
            .collect();
        edges.sort();
        edges
    }

    /// Jobs with no producing parent; they can start immediately.
    pub fn root_jobs(&self) -> Vec<&Job> {
        self.jobs
            .iter()
            .filter(|j| self.dependencies(j.id).is_empty())
            .collect()
    }

    /// Jobs whose outputs nothing consumes.
    pub fn leaf_jobs(&self) -> Vec<&Job> {
        self.jobs
            .iter()
            .filter(|j| self.dependents(j.id).is_empty())
            .collect()
    }

    /// Orders jobs so that every producer precedes its consumers, using
    /// Kahn's algorithm. Ties keep insertion order.
    pub fn topological_order(&self) -> Result<Vec<JobId>> {
        let mut in_degree: Vec<usize> = self
            .jobs
            .iter()
            .map(|j| self.dependencies(j.id).len())
            .collect();

        let mut queue: VecDeque<JobId> = self
            .jobs
            .iter()
            .filter(|j| in_degree[j.id.index()] == 0)
            .map(|j| j.id)
            .collect();

        let mut order = Vec::with_capacity(self.jobs.len());

        while let Some(current) = queue.pop_front() {
            order.push(current);

            for child in self.dependents(current) {
                let degree = &mut in_degree[child.index()];
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(child);
                }
            }
        }

        if order.len() != self.jobs.len() {
            return Err(GraphError::CyclicDependency);
        }

        Ok(order)
    }

    /// Number of jobs per diagnostic label.
    pub fn job_counts_by_label(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for job in &self.jobs {
            *counts.entry(job.label.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Names of the files flagged for durable staging.
    pub fn durable_files(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|(_, f)| f.stage_out)
            .map(|(_, f)| f.name.as_str())
            .collect()
    }
}

/// Adds jobs to a [`WorkflowGraph`], validating each one against the
/// transformation registry and the file registry.
pub struct GraphBuilder<'a> {
    registry: &'a TransformationRegistry,
    graph: WorkflowGraph,
    env_source: Option<PathBuf>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(name: impl Into<String>, registry: &'a TransformationRegistry) -> Self {
        Self {
            registry,
            graph: WorkflowGraph::new(name),
            env_source: None,
        }
    }

    /// Attaches a setup file to every job added from now on.
    pub fn with_env_source(mut self, path: Option<PathBuf>) -> Self {
        self.env_source = path;
        self
    }

    pub fn intern(&mut self, name: impl Into<String>) -> FileId {
        self.graph.files.intern(name)
    }

    pub fn mark_stage_out(&mut self, file: FileId, stage_out: bool) {
        self.graph.files.mark_stage_out(file, stage_out);
    }

    pub fn graph(&self) -> &WorkflowGraph {
        &self.graph
    }

    /// Validates `spec` and adds it to the graph.
    ///
    /// The graph is left untouched when validation fails: the
    /// transformation must be registered, every referenced file must have
    /// been interned in this graph, and no output may already have a
    /// different producer.
    pub fn add_job(&mut self, spec: JobSpec) -> Result<JobId> {
        let transformation = self.registry.lookup(&spec.transformation)?;
        let id = JobId::new(self.graph.jobs.len());

        if let Some(unknown) = spec.referenced_files().find(|f| !self.graph.files.contains(*f)) {
            return Err(GraphError::UnknownFile {
                job: id.to_string(),
                file: unknown.to_string(),
            });
        }

        for output in &spec.outputs {
            self.graph.files.check_producer(*output, id)?;
        }

        let resources = transformation.resources.merged_with(&spec.resources);
        let category = spec
            .category
            .clone()
            .or_else(|| transformation.category.clone());

        for output in &spec.outputs {
            self.graph.files.record_producer(*output, id)?;
        }
        for input in &spec.inputs {
            self.graph.files.record_consumer(*input, id)?;
        }

        let mut job = Job::from_spec(id, spec);
        job.resources = resources;
        job.category = category;
        job.env_source = self.env_source.clone();

        debug!(
            "Added job {} ({}): {}",
            id,
            job.label,
            job.command_line(&self.graph.files)
        );

        self.graph.jobs.push(job);
        Ok(id)
    }

    pub fn finish(self) -> WorkflowGraph {
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::transformation::{ResourceKind, Transformation};

    fn registry() -> TransformationRegistry {
        let mut registry = TransformationRegistry::new();
        registry
            .register(
                Transformation::new("bwa", "incontainer", "/opt/bwa")
                    .with_resource(ResourceKind::Memory, "1 GB"),
            )
            .unwrap();
        registry
            .register(
                Transformation::new("fasterq-dump", "local", "/tools/fasterq_dump_wrapper")
                    .stageable(true)
                    .with_category("fasterq-dump"),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_edges_follow_shared_files() {
        let registry = registry();
        let mut builder = GraphBuilder::new("test", &registry);
        let reads = builder.intern("SRR2584863_1.fastq");
        let sam = builder.intern("i0-SRR2584863.aligned.sam");

        let download = builder
            .add_job(JobSpec::new("fasterq-dump", "fasterq_dump").output(reads))
            .unwrap();
        let align = builder
            .add_job(JobSpec::new("bwa", "align_reads").input(reads).stdout(sam))
            .unwrap();

        let graph = builder.finish();
        assert_eq!(graph.edges(), vec![(download, align)]);
        assert_eq!(graph.producer_of(sam), Some(align));
        assert!(graph.dependencies(download).is_empty());
        assert!(graph.dependents(download).contains(&align));
    }

    #[test]
    fn test_unknown_transformation_adds_nothing() {
        let registry = registry();
        let mut builder = GraphBuilder::new("test", &registry);
        let out = builder.intern("out.txt");

        let result = builder.add_job(JobSpec::new("bwa-mem2", "align_reads").output(out));

        assert!(matches!(result, Err(GraphError::UnknownTransformation(_))));
        let graph = builder.finish();
        assert!(graph.is_empty());
        assert!(graph.producer_of(out).is_none());
    }

    #[test]
    fn test_padded_transformation_name_is_not_resolved() {
        let registry = registry();
        let mut builder = GraphBuilder::new("test", &registry);

        let result = builder.add_job(JobSpec::new(" bwa", "ref_genome_index"));

        assert!(matches!(result, Err(GraphError::UnknownTransformation(name)) if name == " bwa"));
        assert!(builder.finish().is_empty());
    }

    #[test]
    fn test_duplicate_producer_leaves_graph_unchanged() {
        let registry = registry();
        let mut builder = GraphBuilder::new("test", &registry);
        let fresh = builder.intern("fresh.txt");
        let shared = builder.intern("shared.txt");

        builder
            .add_job(JobSpec::new("bwa", "first").output(shared))
            .unwrap();
        let result = builder.add_job(JobSpec::new("bwa", "second").output(fresh).output(shared));

        assert!(matches!(result, Err(GraphError::DuplicateProducer { .. })));
        let graph = builder.finish();
        assert_eq!(graph.len(), 1);
        assert!(graph.producer_of(fresh).is_none());
    }

    #[test]
    fn test_foreign_file_handle_rejected() {
        let registry = registry();
        let mut other = FileRegistry::new();
        other.intern("a");
        let foreign = other.intern("b");

        let mut builder = GraphBuilder::new("test", &registry);
        let result = builder.add_job(JobSpec::new("bwa", "x").input(foreign));
        assert!(matches!(result, Err(GraphError::UnknownFile { .. })));
    }

    #[test]
    fn test_resources_and_category_merged() {
        let registry = registry();
        let mut builder = GraphBuilder::new("test", &registry)
            .with_env_source(Some(PathBuf::from("/opt/env.sh")));
        let reads = builder.intern("reads.fastq");

        let download = builder
            .add_job(JobSpec::new("fasterq-dump", "fasterq_dump").output(reads))
            .unwrap();
        let align = builder
            .add_job(
                JobSpec::new("bwa", "align_reads")
                    .input(reads)
                    .resource(ResourceKind::Cores, "3"),
            )
            .unwrap();

        let graph = builder.finish();
        let download = graph.job(download).unwrap();
        let align = graph.job(align).unwrap();

        assert_eq!(download.category.as_deref(), Some("fasterq-dump"));
        assert!(align.category.is_none());
        assert_eq!(align.resources.get(ResourceKind::Memory), Some("1 GB"));
        assert_eq!(align.resources.get(ResourceKind::Cores), Some("3"));
        assert_eq!(align.env_source, Some(PathBuf::from("/opt/env.sh")));
    }

    #[test]
    fn test_roots_and_leaves_are_not_errors() {
        let registry = registry();
        let mut builder = GraphBuilder::new("test", &registry);
        let a = builder.intern("a");
        let b = builder.intern("b");

        builder.add_job(JobSpec::new("bwa", "root").output(a)).unwrap();
        builder.add_job(JobSpec::new("bwa", "middle").input(a).output(b)).unwrap();
        builder.add_job(JobSpec::new("bwa", "lonely")).unwrap();

        let graph = builder.finish();
        let roots: Vec<_> = graph.root_jobs().iter().map(|j| j.label.as_str()).collect();
        let leaves: Vec<_> = graph.leaf_jobs().iter().map(|j| j.label.as_str()).collect();

        assert_eq!(roots, vec!["root", "lonely"]);
        assert_eq!(leaves, vec!["middle", "lonely"]);
    }

    #[test]
    fn test_topological_order_puts_producers_first() {
        let registry = registry();
        let mut builder = GraphBuilder::new("test", &registry);
        let a = builder.intern("a");
        let b = builder.intern("b");

        // Consumer declared before its producer exists.
        let consumer = builder.add_job(JobSpec::new("bwa", "consumer").input(b)).unwrap();
        let producer_b = builder.add_job(JobSpec::new("bwa", "b").input(a).output(b)).unwrap();
        let producer_a = builder.add_job(JobSpec::new("bwa", "a").output(a)).unwrap();

        let order = builder.finish().topological_order().unwrap();
        assert_eq!(order, vec![producer_a, producer_b, consumer]);
    }

    #[test]
    fn test_cycle_detected() {
        let registry = registry();
        let mut builder = GraphBuilder::new("test", &registry);
        let a = builder.intern("a");
        let b = builder.intern("b");

        builder.add_job(JobSpec::new("bwa", "x").input(b).output(a)).unwrap();
        builder.add_job(JobSpec::new("bwa", "y").input(a).output(b)).unwrap();

        let result = builder.finish().topological_order();
        assert!(matches!(result, Err(GraphError::CyclicDependency)));
    }

    #[test]
    fn test_job_reading_its_own_output_has_no_self_edge() {
        let registry = registry();
        let mut builder = GraphBuilder::new("test", &registry);
        let a = builder.intern("a");

        let job = builder.add_job(JobSpec::new("bwa", "x").input(a).output(a)).unwrap();
        let graph = builder.finish();
        assert!(graph.dependencies(job).is_empty());
        assert!(graph.edges().is_empty());
    }
}
