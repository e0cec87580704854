//! VariantFlow CLI Entry Point
//!
//! Generates the variant calling workflow and submits it to the planner.
//!
//! # Usage
//!
//! ```bash
//! # One pass over all samples
//! variantflow --sequence-reads-list sra_ids.txt --reference-genome ecoli_rel606.fasta
//!
//! # Three passes, with a setup file sourced by every job
//! variantflow -s sra_ids.txt -r ecoli_rel606.fasta -e job_env.sh 3
//!
//! # Write the planner documents without planning
//! variantflow -s sra_ids.txt -r ecoli_rel606.fasta --dry-run --output-dir ./generated
//! ```

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{debug, info};

use variantflow::catalog::site::{ENV_SOURCE_PROFILE, LOCAL_SITE};
use variantflow::catalog::tools::default_transformations;
use variantflow::config::{load_config, DeploymentConfig};
use variantflow::export::{export, CommandPlanner, DryRunPlanner, PlanOptions, Planner};
use variantflow::workflow::{AssemblyRequest, ReplicationController, WorkflowGraph};
use variantflow::{GraphError, APP_NAME, VERSION};

/// Command-line configuration parsed from arguments.
#[derive(Debug, Parser)]
#[command(name = "variantflow", version, about = "Variant calling workflow generator")]
struct Cli {
    /// File listing one sequence read accession per line
    #[arg(short = 's', long)]
    sequence_reads_list: PathBuf,

    /// Reference genome in FASTA format
    #[arg(short = 'r', long)]
    reference_genome: PathBuf,

    /// Setup file sourced before every job
    #[arg(short = 'e', long)]
    job_env_file: Option<PathBuf>,

    /// Number of times the pipeline is replicated
    #[arg(default_value_t = 1)]
    repetitions: usize,

    /// Deployment configuration (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory receiving the planner documents
    #[arg(short, long, default_value = "./generated")]
    output_dir: PathBuf,

    /// Write the documents without planning or submitting
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Variant Calling Workflow Generator");
    println!();
}

fn log_summary(graph: &WorkflowGraph) {
    info!(
        "Workflow '{}': {} jobs, {} ready at start",
        graph.name(),
        graph.len(),
        graph.root_jobs().len()
    );
    for (label, count) in graph.job_counts_by_label() {
        info!("  {:<24} {}", label, count);
    }

    let durable = graph.durable_files();
    info!(
        "{} logical files, {} staged to durable storage",
        graph.files().len(),
        durable.len()
    );
    for name in durable {
        debug!("  {}", name);
    }
}

/// Planner diagnostics to relay as is; `None` when the error carries no
/// planner output worth printing.
fn failure_output<'a>(error: &'a (dyn std::error::Error + 'static)) -> Option<&'a str> {
    error
        .downcast_ref::<GraphError>()
        .and_then(GraphError::planner_output)
        .filter(|output| !output.trim().is_empty())
}

/// Main application entry point.
fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DeploymentConfig::default(),
    };

    if cli.dry_run {
        info!("Mode: DRY RUN (workflow will not be planned)");
        println!();
    }

    let registry = default_transformations(&config)?;
    info!(
        "Transformation catalog: {} executables, {} containers",
        registry.len(),
        registry.containers().count()
    );

    let controller = ReplicationController::new(&config.workflow_name, &registry, &config.staging);
    let assembly = controller.assemble(&AssemblyRequest {
        sample_list: cli.sequence_reads_list,
        reference_genome: cli.reference_genome,
        repetitions: cli.repetitions,
        job_env_file: cli.job_env_file,
    })?;

    let mut sites = config.site_topology(&env::current_dir()?);
    if let Some(env_file) = &assembly.job_env_file {
        sites.set_profile(
            LOCAL_SITE,
            ENV_SOURCE_PROFILE,
            env_file.display().to_string(),
        )?;
    }

    info!("Reference genome: {}", assembly.reference_genome.display());
    log_summary(&assembly.graph);

    let options = PlanOptions::from_config(&config)?;
    let planner: Box<dyn Planner> = if cli.dry_run {
        Box::new(DryRunPlanner::new(&cli.output_dir))
    } else {
        Box::new(
            CommandPlanner::new(&config.planner.program, &cli.output_dir)
                .with_args(config.planner.args.clone()),
        )
    };

    let handle = export(
        &assembly.graph,
        &registry,
        &assembly.replicas,
        &sites,
        &options,
        planner.as_ref(),
    )?;

    println!("{}", serde_json::to_string_pretty(&handle)?);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose);
    print_banner();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            match failure_output(e.as_ref()) {
                Some(output) => eprint!("{}", output),
                None => eprintln!("Error: {}", e),
            }
            ExitCode::FAILURE
        }
    }
}
