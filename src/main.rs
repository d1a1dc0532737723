//! Main entry point for the Code Converter CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use code_converter::cli::commands::{self, Commands};
use code_converter::Settings;

/// Code Converter - COBOL to Java/Python through a hosted LLM
#[derive(Parser, Debug)]
#[command(name = "code-converter", version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { "debug" } else { "info" };
    let crate_target = env!("CARGO_PKG_NAME").replace('-', "_");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{crate_target}={level},tower_http={level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::load()?;

    // Execute command
    match args.command {
        Some(Commands::Serve { host, port }) => {
            commands::handle_serve(settings, host, port).await?;
        }
        Some(Commands::Convert {
            file,
            target,
            output,
            recursive,
        }) => {
            commands::handle_convert(settings, file, target, output, recursive).await?;
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}
