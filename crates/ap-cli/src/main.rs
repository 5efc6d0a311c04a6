mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "catalog-ap",
    about = "Catalog ingest action provider: load, restore and re-permission catalogs",
    version,
    propagate_version = true
)]
struct Cli {
    /// Service configuration file (YAML). Defaults apply when omitted.
    #[arg(long, global = true, env = "CATALOG_AP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP action provider
    Serve {
        /// Address to listen on (overrides `listen` in the config file)
        #[arg(long)]
        listen: Option<String>,
    },

    /// Compile a Table Schema file into an ERMrest schema document
    Compile {
        /// Path to the Table Schema JSON file
        file: PathBuf,
        /// Target schema name (overrides `schema_name` in the config file)
        #[arg(long)]
        schema_name: Option<String>,
    },

    /// Validate the configuration and print the effective settings
    Config,
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Serve { listen } => cmd::serve::run(config_path, listen),
        Commands::Compile { file, schema_name } => {
            cmd::compile::run(config_path, &file, schema_name.as_deref())
        }
        Commands::Config => cmd::config::run(config_path),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
