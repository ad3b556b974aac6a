//! Data model, packed-note codec, JSON parsing, and filter/query types shared
//! by every nostrdb crate.
//!
//! Glossary:
//!  - `note`: the atomic signed record this system stores (§3.1).
//!  - `note_key`: the monotone `u64` a writer assigns to a note on commit.
//!  - `PackedStr`: a 4-byte reference into a note's interned-string arena.
//!  - `Filter`: a structured predicate over note fields, used by queries and
//!    subscriptions alike.

pub mod blocks;
pub mod builder;
pub mod error;
pub mod filter;
pub mod keys;
pub mod note;
pub mod packed;
pub mod parse;
pub mod sign;
pub mod text;

pub use error::Error;
pub use filter::{Filter, FilterBuilder, Plan};
pub use note::{Note, Tag, Tags};
pub use packed::PackedStr;

/// Monotone primary key of the `notes` store, assigned by the writer.
pub type NoteKey = u64;

/// Monotone primary key of the `profiles` store, assigned by the writer.
pub type ProfileKey = u64;

/// 32-byte content hash / author pubkey / id.
pub type Id32 = [u8; 32];

/// 64-byte Schnorr signature.
pub type Sig64 = [u8; 64];

/// Unix seconds.
pub type Timestamp = u64;

/// The on-disk note format version this crate reads and writes.
pub const NOTE_VERSION: u8 = 1;

/// High byte of a [`PackedStr`] when the remaining 3 bytes encode a
/// NUL-terminated inline string of up to 2 characters.
pub const NDB_PACKED_INLINE: u8 = 0xFF;

/// High byte of a [`PackedStr`] when the remaining 3 bytes are a 24-bit
/// offset to a raw 32-byte id stored in the strings arena.
pub const NDB_PACKED_ID: u8 = 0xFE;

/// High byte of a [`PackedStr`] when the remaining 3 bytes are a 24-bit
/// offset to a NUL-terminated UTF-8 string in the strings arena.
pub const NDB_PACKED_OFFSET: u8 = 0x00;

/// Every on-disk record is padded so its total size is a multiple of this.
pub const NOTE_ALIGNMENT: usize = 8;
