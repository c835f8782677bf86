//! Typed request, entry, and response trees.
//!
//! These are the in-memory structures the controllers build while reading
//! and consume while writing. Routing to downstream handlers is an
//! exhaustive `match` over the enums here, never dynamic dispatch.

use crate::error::ProtocolError;
use crate::hash::{field_set_hash, HashKind};
use chrono::{DateTime, Utc};
use ethers_core::types::U256;
use std::collections::BTreeMap;

/// Kind of mutation an entry carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Insert,
    Update,
    Delete,
}

impl EntryType {
    /// Wire code, part of the protocol contract.
    pub fn code(self) -> u8 {
        match self {
            EntryType::Insert => 0x01,
            EntryType::Update => 0x02,
            EntryType::Delete => 0x03,
        }
    }

    /// Looks up an entry type by wire code. Unknown codes abort the whole
    /// request: without the type there is no way to choose dispatch
    /// semantics.
    pub fn from_code(code: u8) -> Result<Self, ProtocolError> {
        match code {
            0x01 => Ok(EntryType::Insert),
            0x02 => Ok(EntryType::Update),
            0x03 => Ok(EntryType::Delete),
            other => Err(ProtocolError::UnknownEntryType(other)),
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            EntryType::Insert => "insert",
            EntryType::Update => "update",
            EntryType::Delete => "delete",
        })
    }
}

/// Replication acknowledgment policy requested for a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consistency {
    /// Acknowledged by a fixed number of replicas.
    Count(u32),
    /// Acknowledged by a percentage of replicas.
    Percent(u32),
    /// Acknowledged by a majority.
    #[default]
    Quorum,
}

impl std::fmt::Display for Consistency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Consistency::Count(n) => write!(f, "count({n})"),
            Consistency::Percent(p) => write!(f, "percent({p})"),
            Consistency::Quorum => f.write_str("quorum"),
        }
    }
}

/// Finalized entry header.
///
/// Built incrementally by the header controller as tags stream in, sealed
/// at header close once the digest is finalized and the signature checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub tablespace: String,
    pub table: String,
    pub entry_type: EntryType,
    pub timestamp: DateTime<Utc>,
    pub version: U256,
    pub network: u64,
    /// Hash of the prior entry version; empty for the first version.
    pub old_hash: Vec<u8>,
    /// Digest over the sorted field hashes of the entry.
    pub fld_hash: Vec<u8>,
    /// 20-byte address of the entry author.
    pub signer: Vec<u8>,
    /// 65-byte recoverable signature over the header digest.
    pub signature: Vec<u8>,
    /// Digest of the header's signed byte range; what responses call the
    /// entry hash.
    pub header_hash: Vec<u8>,
}

/// One decoded field of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    /// Declared type tag, e.g. "string", "integer", "binary".
    pub type_name: String,
    /// Either supplied explicitly on the wire or computed from the field's
    /// hashed byte range; never both.
    pub hash: Vec<u8>,
    /// Raw value bytes; absent when only the hash was transmitted.
    pub value: Option<Vec<u8>>,
    /// Full raw byte span of the field element, kept for audit.
    pub raw: Vec<u8>,
}

/// One versioned record mutation: a header plus named fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub header: EntryHeader,
    pub fields: BTreeMap<String, Field>,
}

impl Entry {
    /// Recomputes the field-set hash and compares it to the header's.
    pub fn check_fields_hash(&self, kind: HashKind) -> bool {
        let computed = field_set_hash(kind, self.fields.values().map(|f| f.hash.as_slice()));
        computed == self.header.fld_hash
    }
}

/// A decoded modification request.
#[derive(Debug, Clone)]
pub struct ModificationRequest {
    pub message_id: U256,
    pub consistency: Consistency,
    pub entries: Vec<Entry>,
}

/// A decoded query request.
#[derive(Debug, Clone)]
pub struct Query {
    pub message_id: U256,
    pub consistency: Consistency,
    pub tablespace: String,
    pub table: String,
    /// Field names to retrieve; empty means all fields.
    pub fields: Vec<String>,
}

/// One request read off a conversation.
#[derive(Debug, Clone)]
pub enum Request {
    Modification(ModificationRequest),
    Query(Query),
}

/// Outcome of dispatching one entry to the service layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModificationResult {
    Success {
        entry_hash: Vec<u8>,
    },
    Error {
        entry_hash: Vec<u8>,
        message: String,
    },
}

impl ModificationResult {
    pub fn entry_hash(&self) -> &[u8] {
        match self {
            ModificationResult::Success { entry_hash } => entry_hash,
            ModificationResult::Error { entry_hash, .. } => entry_hash,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ModificationResult::Success { .. })
    }
}

/// Response to a modification request; per-entry results keep entry order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModificationResponse {
    pub message_id: U256,
    pub results: Vec<ModificationResult>,
}

/// One field of a query result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowField {
    pub name: String,
    pub type_name: String,
    pub value: Vec<u8>,
}

/// One query result row.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    pub fields: Vec<RowField>,
}

/// Outcome of a query request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Rows(Vec<Row>),
    Error(String),
}

/// Response to a query request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub message_id: U256,
    pub outcome: QueryOutcome,
}
