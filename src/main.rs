//! Zappy - VPS hardening and service deployment toolbox

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use zappy::cli::{Cli, Commands};
use zappy::{commands, Config, Context};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Commands that need no configuration
    match cli.command {
        Commands::Version => {
            println!("zappy {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Commands::Init { force } => return commands::init::run(&cli.config, force),
        _ => {}
    }

    let config = Config::load_or_default(&cli.config)?;
    let ctx = Context::new(config, &cli.config);

    match cli.command {
        Commands::Status { json } => commands::status::run(&ctx, json),
        Commands::Nginx { action } => commands::nginx::run(action, &ctx),
        Commands::Cert { action } => commands::cert::run(action, &ctx),
        Commands::Firewall { action } => commands::firewall::run(action, &ctx),
        Commands::Fail2ban { action } => commands::fail2ban::run(action, &ctx),
        Commands::Ssh { action } => commands::ssh::run(action, &ctx),
        Commands::Updates { action } => commands::updates::run(action, &ctx),
        Commands::Packages { action } => commands::packages::run(action, &ctx),
        Commands::System { action } => commands::system::run(action, &ctx),
        Commands::Version | Commands::Init { .. } => Ok(()),
    }
}
