mod commands;
mod logging;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use zzzcal_core::config::Config;

#[derive(Parser)]
#[command(name = "zzzcal")]
#[command(about = "Turn Zenless Zone Zero signal search announcements into an iCalendar feed")]
struct Cli {
    /// Config file (defaults to zzzcal.toml in the working directory, if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape the announcements and write the calendar
    Generate {
        /// Where to write the .ics file (overrides output_path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Leave the existing file alone when nothing was extracted
        #[arg(long)]
        keep_on_empty: bool,
    },
    /// Run the extractor over a saved HTML page
    Inspect {
        file: PathBuf,

        /// Treat the page as search results instead of a post
        #[arg(short, long)]
        listing: bool,
    },
    /// List the events in an .ics file
    Show { file: PathBuf },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging()?;

    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Generate {
            output,
            keep_on_empty,
        } => {
            if let Some(path) = output {
                config.output_path = path;
            }
            config.keep_on_empty |= keep_on_empty;
            commands::generate::run(&config).await
        }
        Commands::Inspect { file, listing } => commands::inspect::run(&config, &file, listing),
        Commands::Show { file } => commands::show::run(&config, &file),
        Commands::Config => commands::config::run(&config, cli.config.as_deref()),
    }
}
