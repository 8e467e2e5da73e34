//! cargo-microbench: Cargo subcommand generating microbenchmark harnesses.
//!
//! Reads one or more metadata model files (JSON dumps of the benchmark
//! classes, as written by a source scanner), generates the measurement
//! harnesses as a Rust module tree and writes the benchmark list and
//! compiler hints next to them.
//!
//! ```text
//! cargo microbench --model target/bench-model.json
//! cargo microbench --model a.json --model b.json --output-dir src/bench_gen
//! cargo microbench --model model.json --list
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use cntryl_microbench::{
    BenchmarkGenerator, ClassModel, FileDestination, GeneratorConfig, MemoryDestination, Mode,
};

#[derive(Debug, Parser)]
#[command(
    name = "cargo-microbench",
    bin_name = "cargo",
    about = "Generate microbenchmark harnesses via `cargo microbench`"
)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Generate benchmark harnesses from a metadata model
    #[command(name = "microbench")]
    Microbench(MicrobenchArgs),
}

#[derive(Debug, Parser)]
struct MicrobenchArgs {
    /// Metadata model file (JSON); repeat to merge several models
    #[arg(long, required = true)]
    model: Vec<PathBuf>,

    /// Root of the generated module tree and resources
    #[arg(long, default_value = "target/microbench")]
    output_dir: PathBuf,

    /// Mode for benchmarks declaring none (thrpt, avgt, sample, ss)
    #[arg(long)]
    mode: Option<Mode>,

    /// Generate only benchmark classes matching this glob (e.g. "*Map*")
    #[arg(long)]
    filter: Option<String>,

    /// Print the resolved benchmark list without writing anything
    #[arg(long)]
    list: bool,

    /// Verbose output
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Quiet mode (only errors)
    #[arg(long, short = 'q')]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.cmd {
        Commands::Microbench(args) => run_microbench(args),
    }
}

fn run_microbench(args: MicrobenchArgs) -> Result<()> {
    let verbosity = Verbosity::from_args(&args);
    init_tracing(verbosity);

    let config = build_config(&args)?;
    let model = load_model(&args.model)?;
    tracing::debug!(classes = model.len(), "loaded metadata model");

    let mut generator = BenchmarkGenerator::new(config);

    if args.list {
        let mut dest = MemoryDestination::new();
        generator.generate(&model, &mut dest);
        for d in &dest.diagnostics {
            eprintln!("{}: {d}", severity_label(d.severity));
        }
        for entry in generator.benchmark_list().entries() {
            println!("{}", entry.to_line());
        }
        if dest.errors().next().is_some() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut dest = FileDestination::new(&args.output_dir);
    let generated = generator.generate(&model, &mut dest);
    generator.complete(&mut dest);

    if dest.has_errors() {
        if verbosity.is_normal() {
            eprintln!(
                "\n❌ {} error(s), {} warning(s)",
                dest.error_count(),
                dest.warning_count()
            );
        }
        std::process::exit(1);
    }

    if verbosity.is_normal() {
        eprintln!(
            "✅ Generated {} benchmark class(es) into {}",
            generated,
            args.output_dir.display()
        );
    }
    Ok(())
}

fn build_config(args: &MicrobenchArgs) -> Result<GeneratorConfig> {
    let mut config = GeneratorConfig::from_env();
    if let Some(mode) = args.mode {
        if mode == Mode::All {
            bail!("--mode takes a single mode, not 'all'");
        }
        config = config.default_mode(mode);
    }
    if let Some(ref filter) = args.filter {
        config = config.filter(filter);
    }
    Ok(config)
}

fn load_model(paths: &[PathBuf]) -> Result<ClassModel> {
    let mut model = ClassModel::new();
    for path in paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read model {}", path.display()))?;
        let part = ClassModel::from_json(&text)
            .with_context(|| format!("Failed to parse model {}", path.display()))?;
        model.extend(part);
    }
    Ok(model)
}

fn severity_label(severity: cntryl_microbench::Severity) -> &'static str {
    match severity {
        cntryl_microbench::Severity::Error => "error",
        cntryl_microbench::Severity::Warning => "warning",
    }
}

// ============================================================================
// Verbosity Control
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    fn from_args(args: &MicrobenchArgs) -> Self {
        if args.quiet {
            Verbosity::Quiet
        } else if args.verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    fn is_normal(&self) -> bool {
        *self != Verbosity::Quiet
    }

    fn default_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "info",
            Verbosity::Verbose => "debug",
        }
    }
}

/// `RUST_LOG` wins over `-v`/`-q`.
fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.default_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
