use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use apireport::config::AppConfig;

#[derive(Parser)]
#[command(
    name = "apireport",
    about = "Run an API test collection and export HTML, JSON and XLSX reports",
    version,
    long_about = None
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Without a subcommand the full pipeline runs
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collection and write the HTML and JSON reports
    Run {
        /// Collection file
        #[arg(long)]
        collection: Option<PathBuf>,

        /// Environment file
        #[arg(long)]
        environment: Option<PathBuf>,

        /// Globals file
        #[arg(long)]
        globals: Option<PathBuf>,

        /// Number of iterations
        #[arg(long)]
        iterations: Option<u32>,

        /// HTML report output
        #[arg(long)]
        html: Option<PathBuf>,

        /// JSON report output
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Convert a JSON report into the review spreadsheet
    Export {
        /// JSON report to read
        #[arg(long)]
        input: Option<PathBuf>,

        /// XLSX file to write
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::resolve(cli.config.as_deref())?;

    match cli.command {
        None => {
            tracing::info!("Running full pipeline");
            apireport::run_pipeline(&config).await?;
        }
        Some(Commands::Run {
            collection,
            environment,
            globals,
            iterations,
            html,
            json,
        }) => {
            let paths = &mut config.paths;
            if let Some(p) = collection {
                paths.collection = p;
            }
            if let Some(p) = environment {
                paths.environment = p;
            }
            if globals.is_some() {
                paths.globals = globals;
            }
            if let Some(p) = html {
                paths.html_report = p;
            }
            if let Some(p) = json {
                paths.json_report = p;
            }
            if let Some(n) = iterations {
                config.run.iteration_count = n;
            }
            apireport::run_and_report(&config).await?;
        }
        Some(Commands::Export { input, output }) => {
            if let Some(p) = input {
                config.paths.json_report = p;
            }
            if let Some(p) = output {
                config.paths.xlsx_report = p;
            }
            let rows = apireport::export_spreadsheet(&config)?;
            tracing::info!(rows, "Export complete");
        }
    }

    Ok(())
}
