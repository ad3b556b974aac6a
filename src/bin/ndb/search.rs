use comfy_table::Table;
use miette::IntoDiagnostic;
use nostrdb::{Ndb, Note};
use nostrdb_store::text_index::TextSearchConfig;

#[derive(Debug, clap::Args)]
pub struct Args {
    /// Words to search for in indexed note content.
    query: Vec<String>,

    /// Maximum number of results.
    #[arg(long, default_value_t = 20)]
    limit: usize,
}

pub fn run(config: &nostrdb::Config, args: &Args) -> miette::Result<()> {
    let ndb = Ndb::open(config).into_diagnostic()?;
    let query = args.query.join(" ");

    let search_config = TextSearchConfig { limit: args.limit, ..TextSearchConfig::default() };
    let hits = ndb.text_search(&query, search_config).into_diagnostic()?;

    let mut table = Table::new();
    table.set_header(vec!["created_at", "pubkey", "content"]);
    for hit in hits {
        let Ok(note) = Note::from_bytes(&hit.bytes) else {
            continue;
        };
        table.add_row(vec![
            note.created_at().to_string(),
            hex::encode(note.pubkey()),
            note.content().to_string(),
        ]);
    }
    println!("{table}");

    Ok(())
}
