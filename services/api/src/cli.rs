use crate::demo::{run_demo, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use triage_ai::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Inquiry Triage Service",
    about = "Classify, route, and drain customer inquiries from the command line",
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
    /// Run one drain invocation over the unprocessed backlog
    Drain(DrainArgs),
    /// Run representative inquiries through the pipeline in memory
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DrainArgs {
    /// Cap the number of inquiries fetched (defaults to the configured,
    /// mode-dependent limit)
    #[arg(long)]
    pub(crate) limit: Option<usize>,
    /// Inquiries pulled per fetch round
    #[arg(long)]
    pub(crate) batch_size: Option<usize>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Drain(args) => server::run_drain(args),
        Command::Demo(args) => run_demo(args),
    }
}
