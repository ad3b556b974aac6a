//! NostrDB: an embedded, single-process event store for the nostr social
//! protocol. One dedicated writer thread owns all mutation; a pool of
//! ingester threads parses, filters and verifies incoming events before
//! handing packed notes to the writer; readers open their own `redb`
//! snapshot and never block on the writer.
//!
//! [`Ndb`] is the entry point. [`Config`] controls where the database
//! lives and how the writer/ingester pool are sized.

pub mod config;
pub mod error;
pub mod ingest;
pub mod monitor;
pub mod ndb;
pub mod query;
pub mod queue;
pub mod stats;
pub mod writer;

pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{AcceptAll, IngestFilter, IngesterPool, Verdict};
pub use monitor::Monitor;
pub use ndb::Ndb;
pub use query::Hit;
pub use stats::Stats;

pub use nostrdb_core::filter::{Filter, FilterBuilder};
pub use nostrdb_core::note::Note;
pub use nostrdb_core::NoteKey;
