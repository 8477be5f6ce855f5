//! hubsync - identity-gated gateway for embedded Domo dashboards

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use hubsync::{
    cli::{Cli, Command},
    config::Config,
    directory::EmbedDirectory,
    gateway::Gateway,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal outside development
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded .env");
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Check) => run_check(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> hubsync::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    if let Some(ref directory) = cli.directory {
        config.directory.path = directory.display().to_string();
    }
    Ok(config)
}

/// Validate configuration and directory without serving
fn run_check(config: &Config) -> ExitCode {
    if let Err(e) = config.validate() {
        eprintln!("❌ {e}");
        return ExitCode::FAILURE;
    }
    let directory = match EmbedDirectory::load(&config.directory.path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    println!("✅ Configuration valid");
    println!("   Platform: {} ({})", config.platform.api_host, config.platform.card_target);
    println!("   Embed host: {}", config.platform.embed_host);
    println!(
        "   Directory: {} ({} entries, {} users)",
        config.directory.path,
        directory.len(),
        directory.user_count()
    );
    if config.identity_configured() {
        println!("   Identity: tenant {}", config.identity.tenant_id);
    } else {
        println!("   Identity: not configured (login disabled)");
    }
    ExitCode::SUCCESS
}

/// Run the gateway server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        directory = %config.directory.path,
        "Starting hubsync"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
