use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use ruleforge::config::Config;
use ruleforge::error::GrammarError;
use std::process;
use tracing::{error, info, Level};

mod cmd;
mod reports;

/// Learns tree-to-string translation rules from a word-aligned parallel
/// corpus with a blocked Gibbs sampler.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration; flags given on the command line take precedence.
    #[arg(global = true, long)]
    config: Option<String>,

    #[arg(global = true, long, default_value_t = false)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sample a grammar, starting from the GHKM derivations.
    Sample(cmd::sample::SampleArgs),
    /// Write the minimal GHKM grammar and stop.
    Extract(cmd::extract::ExtractArgs),
}

fn fatal(e: GrammarError) -> ! {
    error!("❌ {}", e);
    process::exit(1);
}

fn main() {
    let matches = Cli::command().get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.debug { Level::DEBUG } else { Level::INFO })
        .init();

    let cli_config = match &cli.command {
        Commands::Sample(args) => &args.config,
        Commands::Extract(args) => &args.config,
    };

    let config = match &cli.config {
        Some(path) => {
            info!("⚙️  Loading configuration from '{}'", path);
            let mut config = Config::load_from_file(path).unwrap_or_else(|e| fatal(e));
            if let Some((_, sub_matches)) = matches.subcommand() {
                config.merge_from_cli(cli_config, sub_matches);
            }
            config
        }
        None => cli_config.clone(),
    };

    let result = match cli.command {
        Commands::Sample(args) => cmd::sample::run(args, config),
        Commands::Extract(args) => cmd::extract::run(args, config),
    };
    if let Err(e) = result {
        fatal(e);
    }
}
