use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use miette::IntoDiagnostic;
use nostrdb::Ndb;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Newline-delimited event JSON file; reads stdin when omitted.
    path: Option<PathBuf>,
}

pub fn run(config: &nostrdb::Config, args: &Args) -> miette::Result<()> {
    let ndb = Ndb::open(config).into_diagnostic()?;

    let lines = match &args.path {
        Some(path) => {
            let reader = BufReader::new(File::open(path).into_diagnostic()?);
            ingest_lines(&ndb, reader)?
        }
        None => {
            let reader = io::stdin().lock();
            ingest_lines(&ndb, reader)?
        }
    };

    println!("submitted {lines} events");
    Ok(())
}

fn ingest_lines<R: BufRead>(ndb: &Ndb, reader: R) -> miette::Result<u64> {
    let mut count = 0u64;
    for line in reader.lines() {
        let line = line.into_diagnostic()?;
        if line.trim().is_empty() {
            continue;
        }
        ndb.ingest_event(line.as_bytes());
        count += 1;
    }
    Ok(count)
}
