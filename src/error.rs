use thiserror::Error;

/// The root crate's error boundary: wraps the two layers beneath it
/// (`nostrdb-core`'s codec/parser/filter errors, `nostrdb-store`'s
/// transaction/schema errors) plus the daemon-level concerns — config
/// loading and CLI I/O — that only exist once there's a process around the
/// library (`dolos-redb3`'s `Error` is the template for the `#[error(transparent)]`
/// wrapping shape).
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] nostrdb_core::Error),

    #[error(transparent)]
    Store(#[from] nostrdb_store::Error),

    #[error("failed to load configuration")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("subscription {0} does not exist")]
    UnknownSubscription(u64),

    #[error("subscription limit reached (max {})", crate::monitor::MAX_SUBSCRIPTIONS)]
    TooManySubscriptions,

    #[error("filter limit reached (max {} per subscription)", crate::monitor::MAX_FILTERS)]
    TooManyFilters,

    #[error("note_key {0} does not exist")]
    NoteNotFound(u64),
}

pub type Result<T> = std::result::Result<T, Error>;
