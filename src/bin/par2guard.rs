//! Command line front end for par2guard
//!
//! Resolves the given paths into jobs, runs them, prints progress as it
//! arrives and finishes with the run summary. Ctrl+C cancels the run.

use clap::{Parser, Subcommand};
use par2guard::config::CreateMode;
use par2guard::parity::{Par2Manifest, read_manifest};
use par2guard::resolver::par2_set_key;
use par2guard::utils::existing_par2_files;
use par2guard::{
    Config, Error, Event, Operation, Orchestrator, Result, RunSummary, ToExitCode,
    cancel_on_signal,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

/// Create, verify and repair PAR2 parity sets with par2cmdline
#[derive(Parser)]
#[command(name = "par2guard", version)]
#[command(about = "Create, verify and repair PAR2 parity sets", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// par2 binary to run instead of the one found on PATH
    #[arg(long, global = true, value_name = "PATH")]
    par2: Option<PathBuf>,

    /// Show every line of par2 output, not only key lines
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print events as JSON lines instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create parity sets for folders and files
    Create {
        /// Folders (one set each) and loose files (one shared set)
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,

        /// Include files in subfolders
        #[arg(short = 'R', long)]
        recursive: bool,

        /// Redundancy percentage
        #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(1..=100))]
        redundancy: Option<u8>,

        /// Exact number of recovery blocks (instead of a percentage)
        #[arg(
            short = 'c',
            long,
            conflicts_with = "redundancy",
            value_parser = clap::value_parser!(u32).range(1..)
        )]
        recovery_blocks: Option<u32>,

        /// Block size in KiB (0 lets par2 choose)
        #[arg(short = 's', long, value_name = "KIB")]
        block_size: Option<u32>,

        /// Archive name, used when only one set is created
        #[arg(short = 'a', long)]
        archive_name: Option<String>,

        /// Replace parity sets that already exist
        #[arg(long)]
        overwrite: bool,
    },
    /// Verify parity sets (folders are scanned recursively)
    Verify {
        /// .par2 files or folders containing them
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    /// Repair files protected by parity sets (folders are scanned recursively)
    Repair {
        /// .par2 files or folders containing them
        #[arg(value_name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    /// List the files a parity set protects, without running par2
    Inspect {
        /// Main .par2 file of the set
        #[arg(value_name = "PAR2")]
        par2_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "par2guard failed");
            eprintln!("error: {}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("par2guard=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => match default_config_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        },
    };
    if let Some(par2) = &cli.par2 {
        config.tools.par2_path = Some(par2.clone());
    }
    if cli.verbose {
        config.verbose_logging = true;
    }
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("par2guard").join("config.toml"))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config = load_config(&cli)?;
    let json = cli.json;

    let (operation, paths, archive_name, overwrite) = match cli.command {
        Commands::Inspect { par2_file } => return inspect(&par2_file, json),
        Commands::Create {
            paths,
            recursive,
            redundancy,
            recovery_blocks,
            block_size,
            archive_name,
            overwrite,
        } => {
            let create = &mut config.create;
            create.recursive |= recursive;
            if let Some(percent) = redundancy {
                create.create_mode = CreateMode::Redundancy;
                create.redundancy_percent = percent;
            }
            if let Some(blocks) = recovery_blocks {
                create.create_mode = CreateMode::RecoveryBlocks;
                create.recovery_blocks = blocks;
            }
            if let Some(kb) = block_size {
                create.block_size_kb = kb;
            }
            (Operation::Create, paths, archive_name, overwrite)
        }
        Commands::Verify { paths } => (Operation::Verify, paths, None, false),
        Commands::Repair { paths } => (Operation::Repair, paths, None, false),
    };

    let orchestrator = Orchestrator::new(config)?;
    let mut options = orchestrator.resolve_options(operation);
    options.archive_name = archive_name;
    let jobs = orchestrator.plan(&paths, &options)?;

    let existing = orchestrator.preflight(&jobs)?;
    if !existing.is_empty() {
        if !overwrite {
            for set in &existing {
                eprintln!(
                    "{}: {} parity file(s) already exist in {}",
                    set.base_name,
                    set.files.len(),
                    set.target_path.display()
                );
            }
            return Err(Error::invalid_input(
                "parity files already exist (use --overwrite to replace them)",
            ));
        }
        let removed = orchestrator.remove_existing(&existing)?;
        tracing::info!(removed, "removed existing parity files");
    }

    let printer = tokio::spawn(print_events(orchestrator.subscribe(), json));
    let handle = orchestrator.start(jobs)?;
    let signals = cancel_on_signal(handle.cancellation_token());
    let summary = handle.wait().await?;
    signals.abort();
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "event printer stopped unexpectedly");
    }

    Ok(exit_code(&summary))
}

fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.incomplete {
        ExitCode::from(130)
    } else if summary.counts.failed > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

async fn print_events(mut events: broadcast::Receiver<Event>, json: bool) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "output fell behind, events dropped");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let finished = matches!(event, Event::RunFinished { .. });

        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => tracing::warn!(error = %e, "failed to serialize event"),
            }
        } else {
            print_event(&event);
        }

        if finished {
            break;
        }
    }
}

fn print_event(event: &Event) {
    match event {
        Event::RunStarted { operation, .. } => {
            println!("──────── {} ────────", operation.heading());
        }
        Event::JobStarted { base_name, .. } => {
            println!();
            println!("({})", base_name);
        }
        Event::LogLine { line, .. } => println!("{}", line),
        Event::JobFinished { message, .. } => println!("{}", message),
        Event::JobAborted { base_name, .. } => println!("Aborted: {}", base_name),
        Event::RunFinished { summary } => {
            println!();
            println!("{}", summary);
        }
    }
}

fn inspect(par2_file: &Path, json: bool) -> Result<ExitCode> {
    let mut manifest = read_manifest(par2_file)?;

    let set_key = par2_file
        .file_name()
        .map(|n| par2_set_key(&n.to_string_lossy()))
        .unwrap_or_default();
    let dir = match par2_file.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    for volume in existing_par2_files(dir, &set_key)? {
        if volume.file_name() != par2_file.file_name() {
            manifest.merge(read_manifest(&volume)?);
        }
    }

    if manifest.files.is_empty() {
        return Err(Error::invalid_path(
            "no file descriptions found in parity set",
            par2_file,
        ));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
    } else {
        print_manifest(&set_key, &manifest);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_manifest(set_key: &str, manifest: &Par2Manifest) {
    println!("Set: {}", set_key);
    match manifest.block_size {
        Some(size) => println!("Block size: {} bytes", size),
        None => println!("Block size: unknown"),
    }
    println!(
        "Source file count: {} ({} bytes)",
        manifest.files.len(),
        manifest.total_length()
    );
    println!("Recovery block count: {}", manifest.recovery_blocks);
    if let Some(creator) = &manifest.creator {
        println!("Creator: {}", creator);
    }
    println!();
    for file in &manifest.files {
        println!("{:>14}  {}", file.length, file.name);
    }
}
