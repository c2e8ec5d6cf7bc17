mod handlers;
mod keyboards;
mod run;
mod sink;
mod watcher;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "rozklad", about = "Student timetable Telegram bot")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Run {
        /// Config file path (default ~/.rozklad/config.json5)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Timetable data directory (overrides config)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// SQLite database path (overrides config)
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Validate config and timetable data files, print a summary
    Check {
        /// Config file path (default ~/.rozklad/config.json5)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Timetable data directory (overrides config)
        #[arg(short, long)]
        data_dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            data_dir,
            db,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run::run(config, data_dir, db))?;
        }
        Commands::Check { config, data_dir } => {
            run::check(config, data_dir)?;
        }
    }

    Ok(())
}
