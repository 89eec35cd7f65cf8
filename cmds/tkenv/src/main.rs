use anyhow::Result;
use clap::{Parser, Subcommand};
use tkenv::commands::{self, util::BrokenPipeGuard};
use tracing::Level;

#[derive(Parser)]
#[command(name = "tkenv")]
#[command(about = "Tanka environment extraction and pruning", long_about = None)]
#[command(version = env!("TKENV_VERSION"))]
struct Cli {
	/// Log level (error, warn, info, debug, trace). Defaults to RUST_LOG, then info
	#[arg(long, global = true)]
	log_level: Option<Level>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand)]
enum Commands {
	/// Evaluate the jsonnet to json
	Eval(commands::eval::EvalArgs),

	/// Jsonnet as yaml
	Show(commands::show::ShowArgs),

	/// Delete resources removed from Jsonnet
	Prune(commands::prune::PruneArgs),
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	let _telemetry = tkenv::telemetry::init(cli.log_level)?;

	let stdout = BrokenPipeGuard::new(std::io::stdout());

	let result = match cli.command {
		Commands::Eval(args) => commands::eval::run(args, stdout),
		Commands::Show(args) => commands::show::run(args, stdout),
		Commands::Prune(args) => commands::prune::run(args, stdout),
	};

	if let Err(e) = &result {
		if let Some(kind) = e.downcast_ref::<tkenv::Error>().map(tkenv::Error::kind) {
			tracing::debug!(?kind, "command failed");
		}
	}
	result
}
