//! The redb-backed storage engine: table schema, migrations, and the
//! transactional read/write paths for notes, profiles, the full-text index
//! and the query planner's indices.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, Durability, ReadableDatabase};
use tracing::warn;

pub mod blocks;
pub mod meta;
pub mod migrate;
pub mod notes;
pub mod profiles;
pub mod query;
pub mod schema;
pub mod tags;
pub mod text_index;
pub mod writer;

pub use writer::{CommitOutcome, Store, WriteBatch, WriteMessage};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] redb::DatabaseError),

    #[error(transparent)]
    Transaction(Box<redb::TransactionError>),

    #[error(transparent)]
    Table(#[from] redb::TableError),

    #[error(transparent)]
    Storage(#[from] redb::StorageError),

    #[error(transparent)]
    Commit(#[from] redb::CommitError),

    #[error(transparent)]
    Core(#[from] nostrdb_core::Error),

    #[error("corrupt record in {table}")]
    CorruptRecord { table: &'static str },

    #[error("unknown schema version {0}")]
    UnknownSchemaVersion(u64),
}

impl From<redb::TransactionError> for Error {
    fn from(value: redb::TransactionError) -> Self {
        Error::Transaction(Box::new(value))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

const DEFAULT_CACHE_SIZE_MB: usize = 500;

/// Opens (or creates) the on-disk database at `path`, initializing the
/// schema and running any pending migrations (§4.9).
pub fn open(path: impl AsRef<Path>, cache_size_mb: Option<usize>) -> Result<Arc<Database>> {
    let db = Database::builder()
        .set_repair_callback(|x| warn!(progress = x.progress() * 100.0, "nostrdb repairing"))
        .set_cache_size(1024 * 1024 * cache_size_mb.unwrap_or(DEFAULT_CACHE_SIZE_MB))
        .create(path)?;
    let db = Arc::new(db);
    initialize(&db)?;
    migrate::run(&db)?;
    Ok(db)
}

/// An in-memory database, for tests and `nostrdb-testing` fixtures.
pub fn in_memory() -> Result<Arc<Database>> {
    let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
    let db = Arc::new(db);
    initialize(&db)?;
    migrate::run(&db)?;
    Ok(db)
}

fn initialize(db: &Database) -> Result<()> {
    let mut wx = db.begin_write()?;
    wx.set_durability(Durability::Immediate)?;

    wx.open_table(schema::NOTES)?;
    wx.open_table(schema::NOTE_META)?;
    wx.open_table(schema::PROFILES)?;
    wx.open_table(schema::PROFILE_SEARCH)?;
    wx.open_table(schema::NDB_META)?;
    wx.open_table(schema::PROFILE_LAST_FETCH)?;
    wx.open_table(schema::NOTE_ID)?;
    wx.open_table(schema::PROFILE_PUBKEY)?;
    wx.open_table(schema::NOTE_KIND)?;
    wx.open_table(schema::NOTE_TEXT)?;
    wx.open_table(schema::NOTE_BLOCKS)?;
    wx.open_table(schema::NOTE_AUTHOR)?;
    wx.open_table(schema::NOTE_TAG)?;
    wx.open_table(schema::NOTE_CREATED)?;

    wx.commit()?;
    Ok(())
}
