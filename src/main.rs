//! passcache CLI - passphrase cache shell and keyring metadata tool

use clap::Parser;

use passcache::cli::{self, Cli, Commands, GlobalOptions, KeyringCommands};
use passcache::error::Result;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins over `--debug`
fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Session => cli::session::run(&opts).await,
        Commands::Status => cli::status::run(&opts),
        Commands::Version => {
            println!("passcache version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Keyring(cmd) => match cmd {
            KeyringCommands::Add(args) => cli::keyring::add(&opts, args),
            KeyringCommands::List => cli::keyring::list(&opts),
            KeyringCommands::Remove { key_id } => cli::keyring::remove(&opts, &key_id),
            KeyringCommands::Path => cli::keyring::path(&opts),
        },
        Commands::Bench { iterations } => cli::ops::bench(&opts, iterations).await,
        Commands::Parse { file } => cli::ops::parse(&opts, &file).await,
    }
}
