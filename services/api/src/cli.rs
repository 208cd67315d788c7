use crate::demo::{run_coverage_report, run_demo, CoverageReportArgs, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use roadcall::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "RoadCall Dispatch Orchestrator",
    about = "Run the RoadCall dispatch service and operational reports from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Fleet coverage reporting for operations
    Coverage {
        #[command(subcommand)]
        command: CoverageCommand,
    },
    /// Run an end-to-end CLI demo covering the offer cycle and coverage audit
    Demo(DemoArgs),
}

#[derive(Subcommand, Debug)]
enum CoverageCommand {
    /// Audit dispatch coverage across the category/vehicle matrix
    Report(CoverageReportArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Load the technician directory from a roster CSV export at startup
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Coverage {
            command: CoverageCommand::Report(args),
        } => run_coverage_report(args),
        Command::Demo(args) => run_demo(args),
    }
}
