use thiserror::Error;

/// Errors raised by the packed-note codec, the JSON parser, and the filter
/// builder. None of these carry I/O or transaction state — those live in
/// `nostrdb-store::Error` and the root crate's `nostrdb::Error`.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("buffer too small to hold the packed note")]
    BufferOverflow,

    #[error("json malformed: {0}")]
    JsonMalformed(&'static str),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` has the wrong shape")]
    WrongShape(&'static str),

    #[error("numeric field `{0}` overflowed")]
    NumericOverflow(&'static str),

    #[error("\\uXXXX escapes are not supported")]
    UnicodeEscapeUnsupported,

    #[error("invalid hex in field `{0}`")]
    InvalidHex(&'static str),

    #[error("tags must be an array of arrays")]
    InvalidTags,

    #[error("parsing stopped early: id already seen")]
    AlreadyHaveId,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("filter field `{0}` was already closed")]
    FilterReopened(&'static str),

    #[error("filter field `{0}` must not be empty")]
    FilterFieldEmpty(&'static str),

    #[error("text index key would exceed the 1 KB budget")]
    TextKeyTooLarge,
}

pub type Result<T> = std::result::Result<T, Error>;
