//! Protocol error types.

use crate::tag::Tag;
use thiserror::Error;

/// Errors raised while reading or writing the wire format.
///
/// Structural variants are always fatal to the current conversation: the
/// stream position is no longer trustworthy and the connection must be
/// closed. `HashMismatch` and `SignatureInvalid` are equally fatal but
/// security-relevant, and callers log them separately.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid magic bytes: expected 'SGL1', got {0:?}")]
    InvalidMagic([u8; 4]),

    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u16),

    #[error("unknown event marker byte: {0:#04x}")]
    UnknownMarker(u8),

    #[error("unknown tag code: {0:#06x}")]
    UnknownTag(u16),

    #[error("unexpected end of stream while {0} elements are open")]
    UnexpectedEof(usize),

    #[error("end of {actual} while {expected} is open")]
    MismatchedEnd { expected: Tag, actual: Tag },

    #[error("end marker for {0} with no open element")]
    UnbalancedEnd(Tag),

    #[error("illegal event {tag} ({state}) inside {context}")]
    IllegalEvent {
        tag: Tag,
        state: &'static str,
        context: Tag,
    },

    #[error("no readable value at the current position")]
    ValueUnavailable,

    #[error("unexpected top-level element: {0}")]
    UnexpectedRoot(Tag),

    #[error("element {0} left open at end of output")]
    UnclosedElement(Tag),

    #[error("value too large: {size} bytes (max {max})")]
    ValueTooLarge { size: u64, max: u64 },

    #[error("invalid length encoding")]
    InvalidLength,

    #[error("invalid {format} payload for {tag}: {reason}")]
    InvalidValue {
        tag: Tag,
        format: &'static str,
        reason: String,
    },

    #[error("duplicate {0} value")]
    DuplicateValue(Tag),

    #[error("missing required {0}")]
    MissingValue(Tag),

    #[error("second entry header in one entry")]
    DuplicateHeader,

    #[error("duplicate field name {0:?} in one entry")]
    DuplicateField(String),

    #[error("unknown entry type code: {0:#04x}")]
    UnknownEntryType(u8),

    #[error("field set hash mismatch: header declares {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("signature invalid: {0}")]
    SignatureInvalid(String),

    #[error("observer {0} is not attached")]
    UnknownObserver(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns whether this error indicates tampering rather than a
    /// malformed peer. Callers use this to route security logging.
    pub fn is_security(&self) -> bool {
        matches!(
            self,
            ProtocolError::HashMismatch { .. } | ProtocolError::SignatureInvalid(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_security_classification() {
        let err = ProtocolError::HashMismatch {
            expected: "aa".into(),
            actual: "bb".into(),
        };
        assert!(err.is_security());

        let err = ProtocolError::SignatureInvalid("recovery failed".into());
        assert!(err.is_security());

        assert!(!ProtocolError::InvalidMagic(*b"XXXX").is_security());
        assert!(!ProtocolError::DuplicateHeader.is_security());
    }

    #[test]
    fn test_display_carries_context() {
        let err = ProtocolError::MismatchedEnd {
            expected: Tag::Entry,
            actual: Tag::Field,
        };
        let msg = err.to_string();
        assert!(msg.contains("FIELD"));
        assert!(msg.contains("ENTRY"));

        let err = ProtocolError::ValueTooLarge {
            size: 100,
            max: 50,
        };
        assert!(err.to_string().contains("100"));
    }
}
