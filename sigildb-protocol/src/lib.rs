//! # sigildb-protocol
//!
//! Wire protocol implementation for sigildb (SEP - signed entry protocol).
//!
//! This crate provides:
//! - Streamed binary framing: nested BEGIN/END tagged elements with inline
//!   length-prefixed payloads
//! - Byte channels with attachable observers for exact-range digesting
//! - Per-primitive format codecs
//! - Recursive controllers building and emitting typed request/response trees
//! - Header digesting and secp256k1 signer recovery

pub mod channel;
pub mod composer;
pub mod conversation;
pub mod error;
pub mod event;
pub mod format;
pub mod hash;
pub mod model;
pub mod reader;
pub mod sig;
pub mod tag;
pub mod varint;
pub mod writer;

pub use channel::{ByteReader, ByteWriter, Observer, ObserverId};
pub use composer::Composer;
pub use conversation::{read_preamble, Conversation};
pub use error::ProtocolError;
pub use event::{Event, EventState};
pub use hash::{HashKind, HASH_LEN};
pub use model::{
    Consistency, Entry, EntryHeader, EntryType, Field, ModificationRequest,
    ModificationResponse, ModificationResult, Query, QueryOutcome, QueryResponse, Request, Row,
    RowField,
};
pub use sig::{EntrySigner, ADDRESS_LEN, SIGNATURE_LEN};
pub use tag::Tag;

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default port for a sigildb node.
pub const DEFAULT_PORT: u16 = 7403;

/// Magic bytes opening every conversation: "SGL1".
pub const MAGIC: [u8; 4] = *b"SGL1";

/// Maximum inline payload size of one element (16 MiB).
pub const MAX_VALUE_SIZE: u64 = 16 * 1024 * 1024;

/// Marker byte opening an element.
pub const MARKER_BEGIN: u8 = 0x0B;

/// Marker byte closing an element.
pub const MARKER_END: u8 = 0x0E;
