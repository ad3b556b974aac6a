use comfy_table::Table;
use miette::IntoDiagnostic;
use nostrdb::Ndb;

#[derive(Debug, clap::Args)]
pub struct Args {}

pub fn run(config: &nostrdb::Config, _args: &Args) -> miette::Result<()> {
    let ndb = Ndb::open(config).into_diagnostic()?;
    let stats = ndb.stats().into_diagnostic()?;

    let mut dbs = Table::new();
    dbs.set_header(vec!["database", "entries", "metadata bytes", "stored bytes"]);
    for db in &stats.dbs {
        dbs.add_row(vec![
            db.name.to_string(),
            db.entries.to_string(),
            db.metadata_bytes.to_string(),
            db.stored_bytes.to_string(),
        ]);
    }
    println!("{dbs}");

    let mut kinds = Table::new();
    kinds.set_header(vec!["kind", "notes"]);
    let mut common: Vec<_> = stats.common_kinds.iter().collect();
    common.sort_by_key(|(kind, _)| **kind);
    for (kind, count) in common {
        kinds.add_row(vec![kind.to_string(), count.to_string()]);
    }
    kinds.add_row(vec!["other".to_string(), stats.other_kinds.to_string()]);
    println!("{kinds}");

    Ok(())
}
