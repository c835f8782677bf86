//! Per-primitive encode/decode rules.
//!
//! Each format is a unit struct implementing [`Format`]; the conversation
//! applies one to the inline payload of the current BEGIN element. Decode
//! and encode are exact inverses; every value has one canonical wire form.

use crate::error::ProtocolError;
use crate::model::Consistency;
use crate::tag::Tag;
use chrono::{DateTime, TimeZone, Utc};
use ethers_core::types::U256;

/// An encode/decode rule for one primitive type.
pub trait Format<T> {
    /// Name used in error messages.
    fn name(&self) -> &'static str;

    fn decode(&self, tag: Tag, payload: &[u8]) -> Result<T, ProtocolError>;

    fn encode(&self, value: &T) -> Vec<u8>;
}

fn invalid(tag: Tag, format: &'static str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::InvalidValue {
        tag,
        format,
        reason: reason.into(),
    }
}

/// UTF-8 string.
pub struct Utf8;

impl Format<String> for Utf8 {
    fn name(&self) -> &'static str {
        "utf8"
    }

    fn decode(&self, tag: Tag, payload: &[u8]) -> Result<String, ProtocolError> {
        String::from_utf8(payload.to_vec())
            .map_err(|_| invalid(tag, self.name(), "invalid UTF-8"))
    }

    fn encode(&self, value: &String) -> Vec<u8> {
        value.as_bytes().to_vec()
    }
}

/// ASCII string.
pub struct Ascii;

impl Format<String> for Ascii {
    fn name(&self) -> &'static str {
        "ascii"
    }

    fn decode(&self, tag: Tag, payload: &[u8]) -> Result<String, ProtocolError> {
        if !payload.is_ascii() {
            return Err(invalid(tag, self.name(), "byte outside ASCII range"));
        }
        // ASCII is a UTF-8 subset; the check above makes this infallible.
        Ok(String::from_utf8(payload.to_vec()).expect("ascii is valid utf-8"))
    }

    fn encode(&self, value: &String) -> Vec<u8> {
        value.as_bytes().to_vec()
    }
}

/// Raw byte blob.
pub struct Blob;

impl Format<Vec<u8>> for Blob {
    fn name(&self) -> &'static str {
        "bytes"
    }

    fn decode(&self, _tag: Tag, payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        Ok(payload.to_vec())
    }

    fn encode(&self, value: &Vec<u8>) -> Vec<u8> {
        value.clone()
    }
}

/// Fixed-width 8-byte big-endian unsigned integer.
pub struct U64Be;

impl Format<u64> for U64Be {
    fn name(&self) -> &'static str {
        "u64"
    }

    fn decode(&self, tag: Tag, payload: &[u8]) -> Result<u64, ProtocolError> {
        let bytes: [u8; 8] = payload
            .try_into()
            .map_err(|_| invalid(tag, self.name(), format!("{} bytes, expected 8", payload.len())))?;
        Ok(u64::from_be_bytes(bytes))
    }

    fn encode(&self, value: &u64) -> Vec<u8> {
        value.to_be_bytes().to_vec()
    }
}

/// Arbitrary-precision unsigned integer as a minimal big-endian magnitude;
/// an empty payload is zero, a leading zero byte is rejected.
pub struct BigUint;

impl Format<U256> for BigUint {
    fn name(&self) -> &'static str {
        "big_uint"
    }

    fn decode(&self, tag: Tag, payload: &[u8]) -> Result<U256, ProtocolError> {
        if payload.len() > 32 {
            return Err(invalid(tag, self.name(), format!("{} bytes, max 32", payload.len())));
        }
        if payload.first() == Some(&0) {
            return Err(invalid(tag, self.name(), "non-minimal encoding"));
        }
        Ok(U256::from_big_endian(payload))
    }

    fn encode(&self, value: &U256) -> Vec<u8> {
        let mut buf = [0u8; 32];
        value.to_big_endian(&mut buf);
        let first = buf.iter().position(|&b| b != 0).unwrap_or(32);
        buf[first..].to_vec()
    }
}

/// Milliseconds since the Unix epoch, fixed-width 8-byte big-endian signed.
pub struct Millis;

impl Format<DateTime<Utc>> for Millis {
    fn name(&self) -> &'static str {
        "timestamp"
    }

    fn decode(&self, tag: Tag, payload: &[u8]) -> Result<DateTime<Utc>, ProtocolError> {
        let bytes: [u8; 8] = payload
            .try_into()
            .map_err(|_| invalid(tag, self.name(), format!("{} bytes, expected 8", payload.len())))?;
        let millis = i64::from_be_bytes(bytes);
        Utc.timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| invalid(tag, self.name(), format!("out-of-range timestamp {millis}")))
    }

    fn encode(&self, value: &DateTime<Utc>) -> Vec<u8> {
        value.timestamp_millis().to_be_bytes().to_vec()
    }
}

/// Entry type code.
pub struct EntryTypeFmt;

impl Format<crate::model::EntryType> for EntryTypeFmt {
    fn name(&self) -> &'static str {
        "entry_type"
    }

    fn decode(&self, tag: Tag, payload: &[u8]) -> Result<crate::model::EntryType, ProtocolError> {
        match payload {
            [code] => crate::model::EntryType::from_code(*code),
            _ => Err(invalid(tag, self.name(), format!("{} bytes, expected 1", payload.len()))),
        }
    }

    fn encode(&self, value: &crate::model::EntryType) -> Vec<u8> {
        vec![value.code()]
    }
}

const CONSISTENCY_COUNT: u8 = 0x01;
const CONSISTENCY_PERCENT: u8 = 0x02;
const CONSISTENCY_QUORUM: u8 = 0x03;

/// Consistency level: one kind byte, then a 4-byte big-endian value for
/// COUNT and PERCENT. QUORUM carries no value.
pub struct ConsistencyFmt;

impl Format<Consistency> for ConsistencyFmt {
    fn name(&self) -> &'static str {
        "consistency"
    }

    fn decode(&self, tag: Tag, payload: &[u8]) -> Result<Consistency, ProtocolError> {
        match payload {
            [CONSISTENCY_COUNT, rest @ ..] => {
                let bytes: [u8; 4] = rest
                    .try_into()
                    .map_err(|_| invalid(tag, self.name(), "count needs a 4-byte value"))?;
                Ok(Consistency::Count(u32::from_be_bytes(bytes)))
            }
            [CONSISTENCY_PERCENT, rest @ ..] => {
                let bytes: [u8; 4] = rest
                    .try_into()
                    .map_err(|_| invalid(tag, self.name(), "percent needs a 4-byte value"))?;
                let percent = u32::from_be_bytes(bytes);
                if percent > 100 {
                    return Err(invalid(tag, self.name(), format!("percent {percent} > 100")));
                }
                Ok(Consistency::Percent(percent))
            }
            [CONSISTENCY_QUORUM] => Ok(Consistency::Quorum),
            [CONSISTENCY_QUORUM, ..] => {
                Err(invalid(tag, self.name(), "quorum carries no value"))
            }
            [] => Err(invalid(tag, self.name(), "empty payload")),
            [kind, ..] => Err(invalid(tag, self.name(), format!("unknown kind {kind:#04x}"))),
        }
    }

    fn encode(&self, value: &Consistency) -> Vec<u8> {
        match value {
            Consistency::Count(n) => {
                let mut out = vec![CONSISTENCY_COUNT];
                out.extend_from_slice(&n.to_be_bytes());
                out
            }
            Consistency::Percent(p) => {
                let mut out = vec![CONSISTENCY_PERCENT];
                out.extend_from_slice(&p.to_be_bytes());
                out
            }
            Consistency::Quorum => vec![CONSISTENCY_QUORUM],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryType;

    #[test]
    fn test_utf8_roundtrip() {
        let value = "tablespace-α".to_string();
        let bytes = Utf8.encode(&value);
        assert_eq!(Utf8.decode(Tag::TablespaceName, &bytes).unwrap(), value);
    }

    #[test]
    fn test_utf8_invalid() {
        assert!(Utf8.decode(Tag::TablespaceName, &[0xFF, 0xFE]).is_err());
    }

    #[test]
    fn test_ascii_rejects_high_bytes() {
        assert_eq!(
            Ascii.decode(Tag::FieldType, b"integer").unwrap(),
            "integer"
        );
        assert!(Ascii.decode(Tag::FieldType, "café".as_bytes()).is_err());
    }

    #[test]
    fn test_u64_exact_width() {
        let bytes = U64Be.encode(&0x0102030405060708);
        assert_eq!(bytes.len(), 8);
        assert_eq!(
            U64Be.decode(Tag::EntryNetwork, &bytes).unwrap(),
            0x0102030405060708
        );
        assert!(U64Be.decode(Tag::EntryNetwork, &bytes[..7]).is_err());
    }

    #[test]
    fn test_big_uint_minimal() {
        assert_eq!(BigUint.encode(&U256::zero()), Vec::<u8>::new());
        assert_eq!(BigUint.decode(Tag::EntryVersion, &[]).unwrap(), U256::zero());

        let value = U256::from(0x1234u64);
        let bytes = BigUint.encode(&value);
        assert_eq!(bytes, vec![0x12, 0x34]);
        assert_eq!(BigUint.decode(Tag::EntryVersion, &bytes).unwrap(), value);

        // Leading zero is non-minimal.
        assert!(BigUint.decode(Tag::EntryVersion, &[0x00, 0x12]).is_err());
        // Over-wide payloads are rejected.
        assert!(BigUint.decode(Tag::EntryVersion, &[1u8; 33]).is_err());
    }

    #[test]
    fn test_big_uint_max() {
        let value = U256::MAX;
        let bytes = BigUint.encode(&value);
        assert_eq!(bytes.len(), 32);
        assert_eq!(BigUint.decode(Tag::MessageId, &bytes).unwrap(), value);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let value = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let bytes = Millis.encode(&value);
        assert_eq!(Millis.decode(Tag::EntryTimestamp, &bytes).unwrap(), value);
    }

    #[test]
    fn test_negative_timestamp_roundtrip() {
        let value = Utc.timestamp_millis_opt(-1).unwrap();
        let bytes = Millis.encode(&value);
        assert_eq!(Millis.decode(Tag::EntryTimestamp, &bytes).unwrap(), value);
    }

    #[test]
    fn test_entry_type_roundtrip() {
        for t in [EntryType::Insert, EntryType::Update, EntryType::Delete] {
            let bytes = EntryTypeFmt.encode(&t);
            assert_eq!(EntryTypeFmt.decode(Tag::EntryType, &bytes).unwrap(), t);
        }
        assert!(matches!(
            EntryTypeFmt.decode(Tag::EntryType, &[0x09]),
            Err(ProtocolError::UnknownEntryType(0x09))
        ));
        assert!(EntryTypeFmt.decode(Tag::EntryType, &[]).is_err());
    }

    #[test]
    fn test_consistency_roundtrip() {
        for c in [
            Consistency::Count(3),
            Consistency::Percent(51),
            Consistency::Quorum,
        ] {
            let bytes = ConsistencyFmt.encode(&c);
            assert_eq!(ConsistencyFmt.decode(Tag::Consistency, &bytes).unwrap(), c);
        }
    }

    #[test]
    fn test_consistency_rejects_malformed() {
        // Trailing bytes after QUORUM
        assert!(ConsistencyFmt
            .decode(Tag::Consistency, &[CONSISTENCY_QUORUM, 0x00])
            .is_err());
        // Unknown kind
        assert!(ConsistencyFmt.decode(Tag::Consistency, &[0x09]).is_err());
        // Percent over 100
        let mut bytes = vec![CONSISTENCY_PERCENT];
        bytes.extend_from_slice(&101u32.to_be_bytes());
        assert!(ConsistencyFmt.decode(Tag::Consistency, &bytes).is_err());
        // Truncated count value
        assert!(ConsistencyFmt
            .decode(Tag::Consistency, &[CONSISTENCY_COUNT, 0x00])
            .is_err());
    }
}
