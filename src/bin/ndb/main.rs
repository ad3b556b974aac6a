use clap::{Parser, Subcommand};
use miette::Result;

mod import;
mod search;
mod stat;

#[derive(Parser)]
#[clap(name = "ndb")]
#[clap(bin_name = "ndb")]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Database directory (overrides `NOSTRDB_DATA_DIR` and any config file).
    #[arg(short = 'd', long, global = true)]
    dir: Option<std::path::PathBuf>,

    /// Skip Schnorr signature verification on ingest.
    #[arg(long, global = true)]
    skip_verification: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print per-table row counts and on-disk footprint.
    Stat(stat::Args),
    /// Read newline-delimited event JSON from a file (or stdin) and ingest it.
    Import(import::Args),
    /// Run a full-text search against indexed note content.
    Search(search::Args),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = nostrdb::Config::load(cli.dir.as_deref()).unwrap_or_default();
    if let Some(dir) = &cli.dir {
        config.data_dir = dir.clone();
    }
    config.skip_verification = config.skip_verification || cli.skip_verification;

    tracing_subscriber::fmt::init();

    match cli.command {
        Command::Stat(args) => stat::run(&config, &args)?,
        Command::Import(args) => import::run(&config, &args)?,
        Command::Search(args) => search::run(&config, &args)?,
    }

    Ok(())
}
