//! Tag definitions for the SEP wire format.
//!
//! Each tag is a named binary marker with a stable u16 wire code. The codes
//! are part of the protocol contract and must never be reused or renumbered.

use crate::error::ProtocolError;
use std::fmt;

/// A structural marker in the wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Tag {
    // Request roots
    ModificationRequest = 0x0001,
    QueryRequest = 0x0002,

    // Request envelope
    MessageId = 0x0010,
    Consistency = 0x0011,

    // Entries
    Entry = 0x0020,
    EntryHeader = 0x0021,

    // Header fields
    TablespaceName = 0x0030,
    TableName = 0x0031,
    EntryType = 0x0032,
    EntryTimestamp = 0x0033,
    EntryVersion = 0x0034,
    EntryNetwork = 0x0035,
    EntryOldHash = 0x0036,
    EntryFldHash = 0x0037,

    // Fields
    Field = 0x0040,
    FieldName = 0x0041,
    FieldType = 0x0042,
    FieldHash = 0x0043,
    FieldValue = 0x0044,

    // Signatures
    Signature = 0x0050,
    Signer = 0x0051,

    // Modification responses
    ModificationResponse = 0x0060,
    ModificationSuccess = 0x0061,
    ModificationError = 0x0062,
    EntryHash = 0x0063,

    // Query responses
    QueryResponse = 0x0070,
    QueryEntry = 0x0071,
    QueryError = 0x0072,

    // Query request body
    RetrieveField = 0x0080,

    // Error reporting
    Error = 0x00E0,
    ErrorMessage = 0x00E1,
}

impl Tag {
    /// Returns the wire code for this tag.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Looks up a tag by wire code.
    pub fn from_code(code: u16) -> Result<Self, ProtocolError> {
        use Tag::*;
        Ok(match code {
            0x0001 => ModificationRequest,
            0x0002 => QueryRequest,
            0x0010 => MessageId,
            0x0011 => Consistency,
            0x0020 => Entry,
            0x0021 => EntryHeader,
            0x0030 => TablespaceName,
            0x0031 => TableName,
            0x0032 => EntryType,
            0x0033 => EntryTimestamp,
            0x0034 => EntryVersion,
            0x0035 => EntryNetwork,
            0x0036 => EntryOldHash,
            0x0037 => EntryFldHash,
            0x0040 => Field,
            0x0041 => FieldName,
            0x0042 => FieldType,
            0x0043 => FieldHash,
            0x0044 => FieldValue,
            0x0050 => Signature,
            0x0051 => Signer,
            0x0060 => ModificationResponse,
            0x0061 => ModificationSuccess,
            0x0062 => ModificationError,
            0x0063 => EntryHash,
            0x0070 => QueryResponse,
            0x0071 => QueryEntry,
            0x0072 => QueryError,
            0x0080 => RetrieveField,
            0x00E0 => Error,
            0x00E1 => ErrorMessage,
            other => return Err(ProtocolError::UnknownTag(other)),
        })
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tag::ModificationRequest => "MODIFICATION_REQUEST",
            Tag::QueryRequest => "QUERY_REQUEST",
            Tag::MessageId => "MESSAGE_ID",
            Tag::Consistency => "CONSISTENCY",
            Tag::Entry => "ENTRY",
            Tag::EntryHeader => "ENTRY_HEADER",
            Tag::TablespaceName => "TABLESPACE_NAME",
            Tag::TableName => "TABLE_NAME",
            Tag::EntryType => "ENTRY_TYPE",
            Tag::EntryTimestamp => "ENTRY_TIMESTAMP",
            Tag::EntryVersion => "ENTRY_VERSION",
            Tag::EntryNetwork => "ENTRY_NETWORK",
            Tag::EntryOldHash => "ENTRY_OLD_HASH",
            Tag::EntryFldHash => "ENTRY_FLD_HASH",
            Tag::Field => "FIELD",
            Tag::FieldName => "FIELD_NAME",
            Tag::FieldType => "FIELD_TYPE",
            Tag::FieldHash => "FIELD_HASH",
            Tag::FieldValue => "FIELD_VALUE",
            Tag::Signature => "SIGNATURE",
            Tag::Signer => "SIGNER",
            Tag::ModificationResponse => "MODIFICATION_RESPONSE",
            Tag::ModificationSuccess => "MODIFICATION_SUCCESS",
            Tag::ModificationError => "MODIFICATION_ERROR",
            Tag::EntryHash => "ENTRY_HASH",
            Tag::QueryResponse => "QUERY_RESPONSE",
            Tag::QueryEntry => "QUERY_ENTRY",
            Tag::QueryError => "QUERY_ERROR",
            Tag::RetrieveField => "RETRIEVE_FIELD",
            Tag::Error => "ERROR",
            Tag::ErrorMessage => "ERROR_MESSAGE",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &[Tag] = &[
        Tag::ModificationRequest,
        Tag::QueryRequest,
        Tag::MessageId,
        Tag::Consistency,
        Tag::Entry,
        Tag::EntryHeader,
        Tag::TablespaceName,
        Tag::TableName,
        Tag::EntryType,
        Tag::EntryTimestamp,
        Tag::EntryVersion,
        Tag::EntryNetwork,
        Tag::EntryOldHash,
        Tag::EntryFldHash,
        Tag::Field,
        Tag::FieldName,
        Tag::FieldType,
        Tag::FieldHash,
        Tag::FieldValue,
        Tag::Signature,
        Tag::Signer,
        Tag::ModificationResponse,
        Tag::ModificationSuccess,
        Tag::ModificationError,
        Tag::EntryHash,
        Tag::QueryResponse,
        Tag::QueryEntry,
        Tag::QueryError,
        Tag::RetrieveField,
        Tag::Error,
        Tag::ErrorMessage,
    ];

    #[test]
    fn test_code_roundtrip() {
        for &tag in ALL {
            assert_eq!(Tag::from_code(tag.code()).unwrap(), tag);
        }
    }

    #[test]
    fn test_codes_unique() {
        let mut seen = std::collections::HashSet::new();
        for &tag in ALL {
            assert!(seen.insert(tag.code()), "duplicate code for {tag}");
        }
    }

    #[test]
    fn test_unknown_code() {
        let err = Tag::from_code(0xBEEF).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownTag(0xBEEF)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Tag::EntryHeader.to_string(), "ENTRY_HEADER");
        assert_eq!(Tag::FieldValue.to_string(), "FIELD_VALUE");
    }
}
