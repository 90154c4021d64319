use anyhow::Context;
use appsweep_core::{
    Confirm, Config, FanoutSink, FileSink, Mode, OperationRequest, OperationResult,
    OperationStatus, Orchestrator, Toolbox, TracingSink,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Uninstall applications and remove leftover files on macOS.
#[derive(Debug, Parser)]
#[command(name = "appsweep", version)]
struct Args {
    /// Name of the application to uninstall.
    application_name: String,

    /// Perform the uninstallation without user confirmation.
    #[arg(long)]
    silent: bool,

    /// Simulate the uninstallation process without making any changes.
    #[arg(long)]
    dry_run: bool,

    /// Backup files to the specified directory before deletion.
    #[arg(long, value_name = "DIR")]
    backup: Option<PathBuf>,

    /// Restore from a previous backup instead of uninstalling.
    #[arg(long, requires = "backup")]
    restore: bool,

    /// Restore under this path instead of the original locations.
    #[arg(long, value_name = "PATH")]
    restore_path: Option<PathBuf>,

    /// Leave leftover files in place after uninstalling.
    #[arg(long)]
    keep_leftovers: bool,

    /// Path to the log file.
    #[arg(long, value_name = "FILE", default_value = "uninstaller.log")]
    log_file: PathBuf,
}

struct Prompt;

impl Confirm for Prompt {
    fn confirm(&self, prompt: &str) -> bool {
        inquire::Confirm::new(prompt)
            .with_default(false)
            .with_help_message("Press 'y' to continue, anything else to skip")
            .prompt()
            .unwrap_or(false)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(result) => {
            print_summary(&result);
            match result.status {
                OperationStatus::Success
                | OperationStatus::DryRunCompleted
                | OperationStatus::Cancelled => ExitCode::SUCCESS,
                OperationStatus::PartialFailure => ExitCode::from(1),
                OperationStatus::Failure => ExitCode::from(2),
            }
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> anyhow::Result<OperationResult> {
    let config = Config::detect()?;
    let file_sink = FileSink::open(&args.log_file)
        .with_context(|| format!("Failed to open log file {:?}", args.log_file))?;
    let sink = FanoutSink::new().with(file_sink).with(TracingSink);

    let request = OperationRequest {
        application: args.application_name,
        mode: if args.restore { Mode::Restore } else { Mode::Uninstall },
        backup_dir: args.backup,
        restore_path: args.restore_path,
        dry_run: args.dry_run,
        silent: args.silent,
        purge_leftovers: !args.keep_leftovers,
    };

    let tools = Toolbox::system_defaults(&config);
    let orchestrator = Orchestrator::new(config, tools);
    let result = orchestrator.run(&request, &sink, &Prompt)?;
    Ok(result)
}

fn print_summary(result: &OperationResult) {
    println!();
    println!("Status: {:?}", result.status);
    if result.nothing_found {
        println!("No installation found ({}).", result.kinds);
    }
    for path in &result.backed_up {
        println!("  backed up  {}", path.display());
    }
    for path in &result.removed {
        println!("  removed    {}", path.display());
    }
    for path in &result.restored {
        println!("  restored   {}", path.display());
    }
    if let Some(manifest) = &result.manifest {
        println!("Manifest: {}", manifest.display());
    }
    for failure in result.failures() {
        println!(
            "  FAILED     {}: {}",
            failure.step,
            failure.error.as_deref().unwrap_or("unknown error")
        );
    }
}
