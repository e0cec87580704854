//! Replication Controller
//!
//! Repeats the per-sample pipeline `N` times. Each iteration gets its own
//! copy of the reference genome (prefixed `i{n}-`) and its own indexing
//! job. Read files carry no prefix, so only iteration 0 emits download
//! jobs and later iterations link to those same outputs.
//!
//! Per sample and iteration the chain is:
//!
//! ```text
//! align -> convert/sort -> coverage -> call -> filter
//! ```

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use super::file::FileId;
use super::graph::{GraphBuilder, WorkflowGraph};
use super::job::JobSpec;
use super::staging::{FileRole, StagingPolicy};
use super::transformation::{ResourceKind, TransformationRegistry};
use crate::catalog::replica::ReplicaCatalog;
use crate::catalog::site::LOCAL_SITE;
use crate::catalog::tools::{BCFTOOLS, BWA, FASTERQ_DUMP, SAMTOOLS, VCFUTILS};
use crate::error::{GraphError, Result};

/// Suffixes of the artifacts written by `bwa index`.
pub const INDEX_SUFFIXES: [&str; 5] = ["amb", "ann", "bwt", "pac", "sa"];

/// Sample list lines shorter than this (after trimming) are ignored.
pub const MIN_SAMPLE_ID_LEN: usize = 5;

/// Inputs of one assembly run.
#[derive(Debug, Clone)]
pub struct AssemblyRequest {
    pub sample_list: PathBuf,
    pub reference_genome: PathBuf,
    pub repetitions: usize,
    pub job_env_file: Option<PathBuf>,
}

/// Result of a successful assembly run.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub graph: WorkflowGraph,
    pub replicas: ReplicaCatalog,
    /// Sample identifiers that produced a job chain
    pub samples: Vec<String>,
    /// Absolute path of the reference genome
    pub reference_genome: PathBuf,
    /// Absolute path of the per-job setup file
    pub job_env_file: Option<PathBuf>,
}

/// Extracts sample identifiers from the contents of a sample list.
///
/// Repeated identifiers keep their first occurrence only.
pub fn parse_sample_ids(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .enumerate()
        .filter_map(|(line_no, line)| {
            let sra_id = line.trim();
            if sra_id.chars().count() < MIN_SAMPLE_ID_LEN {
                if !sra_id.is_empty() {
                    warn!("Ignoring sample list line '{}' (too short)", sra_id);
                }
                return None;
            }
            if !seen.insert(sra_id) {
                warn!(
                    "Ignoring sample list line {}: '{}' is already listed",
                    line_no + 1,
                    sra_id
                );
                return None;
            }
            Some(sra_id.to_string())
        })
        .collect()
}

/// Reads and parses a sample list file.
pub fn read_sample_ids(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|source| GraphError::SampleListUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_sample_ids(&content))
}

/// Resolves the reference genome to an absolute path of a regular file.
pub fn resolve_reference_genome(path: &Path) -> Result<PathBuf> {
    let unresolvable = |source: io::Error| GraphError::ReferenceGenomeUnresolvable {
        path: path.to_path_buf(),
        source,
    };

    let resolved = fs::canonicalize(path).map_err(unresolvable)?;
    if !resolved.is_file() {
        return Err(unresolvable(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        )));
    }
    Ok(resolved)
}

/// Per-iteration reference artifacts shared by every sample chain.
struct IterationReference {
    iteration: usize,
    genome: FileId,
    index_files: Vec<FileId>,
}

/// Drives graph assembly for the variant calling pipeline.
pub struct ReplicationController<'a> {
    registry: &'a TransformationRegistry,
    policy: &'a StagingPolicy,
    workflow_name: String,
}

impl<'a> ReplicationController<'a> {
    pub fn new(
        workflow_name: impl Into<String>,
        registry: &'a TransformationRegistry,
        policy: &'a StagingPolicy,
    ) -> Self {
        Self {
            registry,
            policy,
            workflow_name: workflow_name.into(),
        }
    }

    /// Builds the complete graph for `request`.
    ///
    /// Configuration is checked before any job is created. Assembly is
    /// all-or-nothing: the first error aborts and no graph is returned.
    pub fn assemble(&self, request: &AssemblyRequest) -> Result<Assembly> {
        if request.repetitions == 0 {
            return Err(GraphError::InvalidRepetitions(request.repetitions));
        }

        let samples = read_sample_ids(&request.sample_list)?;
        let reference_genome = resolve_reference_genome(&request.reference_genome)?;
        let genome_name = reference_genome
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| GraphError::ReferenceGenomeUnresolvable {
                path: request.reference_genome.clone(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "no usable file name"),
            })?;

        let job_env_file = match &request.job_env_file {
            Some(path) => Some(fs::canonicalize(path).map_err(|source| {
                GraphError::ConfigUnreadable {
                    path: path.clone(),
                    source,
                }
            })?),
            None => None,
        };

        info!(
            "Assembling {} iteration(s) over {} sample(s) against {}",
            request.repetitions,
            samples.len(),
            reference_genome.display()
        );
        for sra_id in &samples {
            info!("{}", sra_id);
        }

        let mut builder = GraphBuilder::new(self.workflow_name.clone(), self.registry)
            .with_env_source(job_env_file.clone());
        let mut replicas = ReplicaCatalog::new();

        for iteration in 0..request.repetitions {
            let reference = self.add_reference_index(
                &mut builder,
                &mut replicas,
                iteration,
                &genome_name,
                &reference_genome,
            )?;

            for sra_id in &samples {
                self.add_sample_chain(&mut builder, &reference, sra_id)?;
            }
        }

        let graph = builder.finish();
        info!(
            "Assembled {} jobs over {} files",
            graph.len(),
            graph.files().len()
        );

        Ok(Assembly {
            graph,
            replicas,
            samples,
            reference_genome,
            job_env_file,
        })
    }

    fn stage(&self, builder: &mut GraphBuilder<'_>, files: &[FileId], role: FileRole) {
        let stage_out = self.policy.should_stage_out(role);
        for file in files {
            builder.mark_stage_out(*file, stage_out);
        }
    }

    /// Interns the iteration's genome copy and emits its indexing job.
    fn add_reference_index(
        &self,
        builder: &mut GraphBuilder<'_>,
        replicas: &mut ReplicaCatalog,
        iteration: usize,
        genome_name: &str,
        genome_path: &Path,
    ) -> Result<IterationReference> {
        let genome_lfn = format!("i{}-{}", iteration, genome_name);
        let genome = builder.intern(genome_lfn.clone());
        replicas.add(LOCAL_SITE, genome_lfn.clone(), genome_path);

        let index_files: Vec<FileId> = INDEX_SUFFIXES
            .iter()
            .map(|suffix| builder.intern(format!("{}.{}", genome_lfn, suffix)))
            .collect();
        self.stage(builder, &index_files, FileRole::ReferenceIndex);

        let job = builder.add_job(
            JobSpec::new(BWA, "ref_genome_index")
                .arg("index")
                .file_arg(genome)
                .input(genome)
                .outputs(index_files.iter().copied()),
        )?;
        debug!("Iteration {}: index job {} for {}", iteration, job, genome_lfn);

        Ok(IterationReference {
            iteration,
            genome,
            index_files,
        })
    }

    /// Emits the download job (first iteration only) and the five-job
    /// chain for one sample.
    fn add_sample_chain(
        &self,
        builder: &mut GraphBuilder<'_>,
        reference: &IterationReference,
        sra_id: &str,
    ) -> Result<()> {
        let prefix = format!("i{}-{}", reference.iteration, sra_id);

        let fastq_1 = builder.intern(format!("{}_1.fastq", sra_id));
        let fastq_2 = builder.intern(format!("{}_2.fastq", sra_id));
        let sam = builder.intern(format!("{}.aligned.sam", prefix));
        let bam = builder.intern(format!("{}.aligned.bam", prefix));
        let sorted_bam = builder.intern(format!("{}.aligned.sorted.bam", prefix));
        let raw_bcf = builder.intern(format!("{}_raw.bcf", prefix));
        let variants = builder.intern(format!("{}_variants.bcf", prefix));
        let final_variants = builder.intern(format!("{}_final_variants.bcf", prefix));

        self.stage(builder, &[fastq_1, fastq_2], FileRole::RawReads);
        self.stage(builder, &[sam], FileRole::Alignment);
        self.stage(builder, &[bam], FileRole::BinaryAlignment);
        self.stage(builder, &[sorted_bam], FileRole::SortedAlignment);
        self.stage(builder, &[raw_bcf], FileRole::RawVariants);
        self.stage(builder, &[variants], FileRole::FilteredVariants);
        self.stage(builder, &[final_variants], FileRole::FinalVariants);

        if reference.iteration == 0 {
            builder.add_job(
                JobSpec::new(FASTERQ_DUMP, "fasterq_dump")
                    .arg("--split-files")
                    .arg(sra_id)
                    .outputs([fastq_1, fastq_2]),
            )?;
        }

        // Six bwa threads on three requested cores.
        builder.add_job(
            JobSpec::new(BWA, "align_reads")
                .arg("mem")
                .arg("-t 6")
                .file_arg(reference.genome)
                .file_arg(fastq_1)
                .file_arg(fastq_2)
                .inputs(reference.index_files.iter().copied())
                .inputs([reference.genome, fastq_1, fastq_2])
                .stdout(sam)
                .resource(ResourceKind::Cores, "3"),
        )?;

        builder.add_job(
            JobSpec::new(SAMTOOLS, "sam_2_bam_converter")
                .arg(prefix.as_str())
                .input(sam)
                .outputs([bam, sorted_bam]),
        )?;

        builder.add_job(
            JobSpec::new(BCFTOOLS, "calculate_read_coverage")
                .arg("mpileup -O b -o")
                .file_arg(raw_bcf)
                .arg("-f")
                .file_arg(reference.genome)
                .file_arg(sorted_bam)
                .inputs([reference.genome, sorted_bam])
                .output(raw_bcf),
        )?;

        builder.add_job(
            JobSpec::new(BCFTOOLS, "detect_snv")
                .arg("call --ploidy 1 -m -v -o")
                .file_arg(variants)
                .file_arg(raw_bcf)
                .input(raw_bcf)
                .output(variants),
        )?;

        builder.add_job(
            JobSpec::new(VCFUTILS, "variant_calling")
                .arg("varFilter")
                .file_arg(variants)
                .input(variants)
                .stdout(final_variants),
        )?;

        Ok(())
    }
}
