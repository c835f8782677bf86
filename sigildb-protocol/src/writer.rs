//! Recursive controllers: the write side.
//!
//! Response writers mirror the readers; the request/entry writers are the
//! client half of the wire, used by embedding clients and by the test
//! suite to produce entries the read side verifies.

use crate::channel::Observer;
use crate::composer::{element_bytes, element_end, element_head, Composer};
use crate::error::ProtocolError;
use crate::format::{Ascii, BigUint, Blob, ConsistencyFmt, EntryTypeFmt, Millis, U64Be, Utf8};
use crate::hash::{field_set_hash, HashKind, HASH_LEN};
use crate::model::{
    Consistency, EntryType, ModificationResponse, ModificationResult, Query, QueryOutcome,
    QueryResponse, Row,
};
use crate::sig::{EntrySigner, SIGNATURE_LEN};
use crate::tag::Tag;
use chrono::{DateTime, Utc};
use ethers_core::types::U256;
use std::collections::BTreeMap;
use std::io::Write;

/// One field of an entry about to be written.
#[derive(Debug, Clone)]
pub struct FieldDraft {
    pub name: String,
    pub type_name: String,
    /// Raw value bytes; omitted when only the hash is transmitted.
    pub value: Option<Vec<u8>>,
    /// Pre-computed hash to send instead of hashing the value bytes.
    pub explicit_hash: Option<Vec<u8>>,
}

impl FieldDraft {
    pub fn with_value(
        name: impl Into<String>,
        type_name: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: Some(value.into()),
            explicit_hash: None,
        }
    }

    pub fn with_hash(
        name: impl Into<String>,
        type_name: impl Into<String>,
        hash: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: None,
            explicit_hash: Some(hash),
        }
    }
}

/// An entry about to be written and signed.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub tablespace: String,
    pub table: String,
    pub entry_type: EntryType,
    pub timestamp: DateTime<Utc>,
    pub version: U256,
    pub network: u64,
    /// Hash of the prior entry version; empty for the first version.
    pub old_hash: Vec<u8>,
    pub fields: Vec<FieldDraft>,
}

/// Encodes one FIELD subtree into standalone bytes, returning them with
/// the field hash (explicit, or computed over the same scope the reader
/// hashes).
pub fn encode_field(draft: &FieldDraft, kind: HashKind) -> Result<(Vec<u8>, Vec<u8>), ProtocolError> {
    if let Some(hash) = &draft.explicit_hash {
        if hash.len() != HASH_LEN {
            return Err(ProtocolError::InvalidValue {
                tag: Tag::FieldHash,
                format: "bytes",
                reason: format!("{} bytes, expected {HASH_LEN}", hash.len()),
            });
        }
    }

    let mut composer = Composer::raw(Vec::new());
    composer.begin(Tag::Field, &[])?;
    let digest_id = composer.attach(Observer::digest(kind));
    composer.value(Tag::FieldName, &Utf8, &draft.name)?;
    composer.value_suspending(Tag::FieldType, &Ascii, &draft.type_name, digest_id)?;

    let hash = match &draft.explicit_hash {
        Some(hash) => {
            // Explicit hash: nothing is computed.
            composer.detach(digest_id)?;
            composer.value(Tag::FieldHash, &Blob, hash)?;
            if let Some(value) = &draft.value {
                composer.value(Tag::FieldValue, &Blob, value)?;
            }
            composer.end(Tag::Field)?;
            hash.clone()
        }
        None => {
            let value = draft
                .value
                .as_ref()
                .ok_or(ProtocolError::MissingValue(Tag::FieldValue))?;
            composer.value(Tag::FieldValue, &Blob, value)?;
            // The field's END bytes are inside the hash scope.
            composer.end(Tag::Field)?;
            composer.detach(digest_id)?.finish()
        }
    };

    Ok((composer.finish()?, hash))
}

/// Writes one signed ENTRY, returning its header hash.
pub fn write_entry<W: Write>(
    composer: &mut Composer<W>,
    draft: &EntryDraft,
    signer: &EntrySigner,
    kind: HashKind,
) -> Result<Vec<u8>, ProtocolError> {
    // Field hashes must exist before the header can be written: the header
    // carries the digest over them, sorted by field name.
    let mut hashes_by_name: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut bodies = Vec::with_capacity(draft.fields.len());
    for field in &draft.fields {
        let (bytes, hash) = encode_field(field, kind)?;
        if hashes_by_name.insert(field.name.clone(), hash).is_some() {
            return Err(ProtocolError::DuplicateField(field.name.clone()));
        }
        bodies.push(bytes);
    }
    let fld_hash = field_set_hash(kind, hashes_by_name.values().map(|h| h.as_slice()));

    composer.begin(Tag::Entry, &[])?;
    let header_hash = write_entry_header(composer, draft, &fld_hash, signer, kind)?;
    for body in &bodies {
        composer.splice(body)?;
    }
    composer.end(Tag::Entry)?;
    Ok(header_hash)
}

/// Writes a signed ENTRY_HEADER, returning the header hash.
///
/// The signed digest spans every header byte after the BEGIN header up to
/// and including the header's END marker, except the signature payload.
/// The bytes following that payload are fully determined before it is
/// written, so they are fed to the digest up front and the signature drops
/// into the stream without lookahead.
fn write_entry_header<W: Write>(
    composer: &mut Composer<W>,
    draft: &EntryDraft,
    fld_hash: &[u8],
    signer: &EntrySigner,
    kind: HashKind,
) -> Result<Vec<u8>, ProtocolError> {
    composer.begin(Tag::EntryHeader, &[])?;
    let digest_id = composer.attach(Observer::digest(kind));
    composer.value(Tag::TablespaceName, &Utf8, &draft.tablespace)?;
    composer.value(Tag::TableName, &Utf8, &draft.table)?;
    composer.value(Tag::EntryType, &EntryTypeFmt, &draft.entry_type)?;
    composer.value(Tag::EntryTimestamp, &Millis, &draft.timestamp)?;
    composer.value(Tag::EntryVersion, &BigUint, &draft.version)?;
    composer.value(Tag::EntryNetwork, &U64Be, &draft.network)?;
    composer.value(Tag::EntryOldHash, &Blob, &draft.old_hash)?;
    composer.value(Tag::EntryFldHash, &Blob, &fld_hash.to_vec())?;

    let address = signer.address().to_vec();
    let mut tail = element_head(Tag::Signature, SIGNATURE_LEN as u64);
    tail.extend_from_slice(&element_bytes(Tag::Signer, &address));
    tail.extend_from_slice(&element_end(Tag::Signature));
    tail.extend_from_slice(&element_end(Tag::EntryHeader));

    let mut observer = composer.detach(digest_id)?;
    observer.observe(&tail);
    let header_hash = observer.finish();

    let digest: [u8; HASH_LEN] = header_hash
        .as_slice()
        .try_into()
        .map_err(|_| ProtocolError::SignatureInvalid("digest length".into()))?;
    let signature = signer.sign_digest(&digest)?;

    composer.begin(Tag::Signature, &signature)?;
    composer.value(Tag::Signer, &Blob, &address)?;
    composer.end(Tag::Signature)?;
    composer.end(Tag::EntryHeader)?;
    Ok(header_hash)
}

/// Writes a complete MODIFICATION_REQUEST, returning the header hash of
/// each written entry in order.
pub fn write_modification_request<W: Write>(
    composer: &mut Composer<W>,
    message_id: U256,
    consistency: Consistency,
    entries: &[EntryDraft],
    signer: &EntrySigner,
    kind: HashKind,
) -> Result<Vec<Vec<u8>>, ProtocolError> {
    composer.container(Tag::ModificationRequest, |c| {
        c.value(Tag::MessageId, &BigUint, &message_id)?;
        c.value(Tag::Consistency, &ConsistencyFmt, &consistency)?;
        let mut hashes = Vec::with_capacity(entries.len());
        for entry in entries {
            hashes.push(write_entry(c, entry, signer, kind)?);
        }
        Ok(hashes)
    })
}

/// Writes a complete QUERY_REQUEST.
pub fn write_query_request<W: Write>(
    composer: &mut Composer<W>,
    query: &Query,
) -> Result<(), ProtocolError> {
    composer.container(Tag::QueryRequest, |c| {
        c.value(Tag::MessageId, &BigUint, &query.message_id)?;
        c.value(Tag::Consistency, &ConsistencyFmt, &query.consistency)?;
        c.value(Tag::TablespaceName, &Utf8, &query.tablespace)?;
        c.value(Tag::TableName, &Utf8, &query.table)?;
        for field in &query.fields {
            c.value(Tag::RetrieveField, &Utf8, field)?;
        }
        Ok(())
    })
}

/// Writes a complete MODIFICATION_RESPONSE; results keep their order.
pub fn write_modification_response<W: Write>(
    composer: &mut Composer<W>,
    response: &ModificationResponse,
) -> Result<(), ProtocolError> {
    composer.container(Tag::ModificationResponse, |c| {
        c.value(Tag::MessageId, &BigUint, &response.message_id)?;
        for result in &response.results {
            match result {
                ModificationResult::Success { entry_hash } => {
                    c.container(Tag::ModificationSuccess, |c| {
                        c.value(Tag::EntryHash, &Blob, entry_hash)
                    })?;
                }
                ModificationResult::Error {
                    entry_hash,
                    message,
                } => {
                    c.container(Tag::ModificationError, |c| {
                        c.value(Tag::EntryHash, &Blob, entry_hash)?;
                        c.value(Tag::ErrorMessage, &Utf8, message)
                    })?;
                }
            }
        }
        Ok(())
    })
}

/// Writes a complete QUERY_RESPONSE.
pub fn write_query_response<W: Write>(
    composer: &mut Composer<W>,
    response: &QueryResponse,
) -> Result<(), ProtocolError> {
    composer.container(Tag::QueryResponse, |c| {
        c.value(Tag::MessageId, &BigUint, &response.message_id)?;
        match &response.outcome {
            QueryOutcome::Rows(rows) => {
                for row in rows {
                    write_row(c, row)?;
                }
            }
            QueryOutcome::Error(message) => {
                c.container(Tag::QueryError, |c| {
                    c.value(Tag::ErrorMessage, &Utf8, message)
                })?;
            }
        }
        Ok(())
    })
}

fn write_row<W: Write>(composer: &mut Composer<W>, row: &Row) -> Result<(), ProtocolError> {
    composer.container(Tag::QueryEntry, |c| {
        for field in &row.fields {
            c.container(Tag::Field, |c| {
                c.value(Tag::FieldName, &Utf8, &field.name)?;
                c.value(Tag::FieldType, &Ascii, &field.type_name)?;
                c.value(Tag::FieldValue, &Blob, &field.value)
            })?;
        }
        Ok(())
    })
}

/// Writes an ERROR report: one message per link of the error's source
/// chain, in encounter order. The peer sees the failure; the connection
/// still closes normally afterwards.
pub fn write_error_report<W: Write>(
    composer: &mut Composer<W>,
    error: &(dyn std::error::Error + 'static),
) -> Result<(), ProtocolError> {
    composer.container(Tag::Error, |c| {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
        while let Some(err) = current {
            c.value(Tag::ErrorMessage, &Utf8, &err.to_string())?;
            current = err.source();
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Conversation;
    use crate::model::Request;
    use crate::reader::{
        read_error_report, read_modification_response, read_query_response, read_request,
    };
    use crate::model::{QueryOutcome, RowField};
    use crate::MARKER_BEGIN;
    use chrono::TimeZone;
    use std::io::Cursor;

    const KIND: HashKind = HashKind::Keccak256;

    fn test_signer() -> EntrySigner {
        EntrySigner::from_secret(&[0x42u8; 32]).unwrap()
    }

    fn sample_entry() -> EntryDraft {
        EntryDraft {
            tablespace: "ts1".into(),
            table: "t1".into(),
            entry_type: EntryType::Insert,
            timestamp: Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
            version: U256::one(),
            network: 0,
            old_hash: Vec::new(),
            fields: vec![FieldDraft::with_value(
                "amount",
                "integer",
                42u64.to_be_bytes().to_vec(),
            )],
        }
    }

    fn encode_request(entries: &[EntryDraft]) -> (Vec<u8>, Vec<Vec<u8>>) {
        let mut composer = Composer::handshake(Vec::new()).unwrap();
        let hashes = write_modification_request(
            &mut composer,
            U256::from(7u64),
            Consistency::Quorum,
            entries,
            &test_signer(),
            KIND,
        )
        .unwrap();
        (composer.finish().unwrap(), hashes)
    }

    fn decode_request(bytes: Vec<u8>) -> Result<Option<Request>, ProtocolError> {
        let mut conv = Conversation::handshake(Cursor::new(bytes)).unwrap();
        read_request(&mut conv, KIND)
    }

    #[test]
    fn test_signed_entry_roundtrip() {
        let (bytes, hashes) = encode_request(&[sample_entry()]);
        let request = decode_request(bytes).unwrap().unwrap();

        let Request::Modification(request) = request else {
            panic!("expected modification request");
        };
        assert_eq!(request.message_id, U256::from(7u64));
        assert_eq!(request.consistency, Consistency::Quorum);
        assert_eq!(request.entries.len(), 1);

        let entry = &request.entries[0];
        assert_eq!(entry.header.tablespace, "ts1");
        assert_eq!(entry.header.table, "t1");
        assert_eq!(entry.header.entry_type, EntryType::Insert);
        assert_eq!(entry.header.version, U256::one());
        assert_eq!(entry.header.network, 0);
        assert!(entry.header.old_hash.is_empty());
        assert_eq!(entry.header.signer, test_signer().address().to_vec());
        assert_eq!(entry.header.header_hash, hashes[0]);

        let field = &entry.fields["amount"];
        assert_eq!(field.type_name, "integer");
        assert_eq!(field.value.as_deref(), Some(&42u64.to_be_bytes()[..]));
        assert!(entry.check_fields_hash(KIND));
    }

    #[test]
    fn test_field_hash_matches_header_declaration() {
        let (bytes, _) = encode_request(&[sample_entry()]);
        let Some(Request::Modification(request)) = decode_request(bytes).unwrap() else {
            panic!("expected modification request");
        };
        let entry = &request.entries[0];
        let expected = field_set_hash(KIND, [entry.fields["amount"].hash.as_slice()].into_iter());
        assert_eq!(entry.header.fld_hash, expected);
    }

    #[test]
    fn test_field_hash_stable_across_context() {
        // The same field must hash identically regardless of surrounding
        // entries and fields in the request.
        let lone = sample_entry();
        let mut crowded = sample_entry();
        crowded
            .fields
            .push(FieldDraft::with_value("zother", "binary", vec![0xFF; 8]));

        let (bytes_a, _) = encode_request(&[lone]);
        let (bytes_b, _) = encode_request(&[sample_entry(), crowded]);

        let Some(Request::Modification(a)) = decode_request(bytes_a).unwrap() else {
            panic!();
        };
        let Some(Request::Modification(b)) = decode_request(bytes_b).unwrap() else {
            panic!();
        };
        let hash_a = &a.entries[0].fields["amount"].hash;
        assert_eq!(hash_a, &b.entries[0].fields["amount"].hash);
        assert_eq!(hash_a, &b.entries[1].fields["amount"].hash);
    }

    #[test]
    fn test_explicit_field_hash_is_authoritative() {
        let hash = KIND.digest(b"precomputed elsewhere");
        let mut draft = sample_entry();
        draft.fields = vec![FieldDraft::with_hash("amount", "integer", hash.clone())];

        let (bytes, _) = encode_request(&[draft]);
        let Some(Request::Modification(request)) = decode_request(bytes).unwrap() else {
            panic!();
        };
        let field = &request.entries[0].fields["amount"];
        assert_eq!(field.hash, hash);
        assert!(field.value.is_none());
        assert!(request.entries[0].check_fields_hash(KIND));
    }

    #[test]
    fn test_tampered_header_byte_fails_signature() {
        let (bytes, _) = encode_request(&[sample_entry()]);
        // The tablespace name sits inside the signed header range.
        let pos = bytes
            .windows(3)
            .position(|w| w == b"ts1")
            .expect("tablespace bytes present");
        let mut tampered = bytes;
        tampered[pos] ^= 0x20;

        let err = decode_request(tampered).unwrap_err();
        assert!(matches!(err, ProtocolError::SignatureInvalid(_)), "{err}");
    }

    #[test]
    fn test_tampered_field_value_fails_fields_hash() {
        let (bytes, _) = encode_request(&[sample_entry()]);
        // The field value 42 is an 8-byte big-endian integer; flip its low
        // byte (0x2A), which is outside the signed header range but inside
        // the field hash scope.
        let pos = bytes
            .windows(8)
            .position(|w| w == 42u64.to_be_bytes())
            .expect("field value present");
        let mut tampered = bytes;
        tampered[pos + 7] ^= 0xFF;

        let err = decode_request(tampered).unwrap_err();
        assert!(matches!(err, ProtocolError::HashMismatch { .. }), "{err}");
    }

    #[test]
    fn test_unknown_tag_in_entry_is_transparent() {
        let (bytes, _) = encode_request(&[sample_entry()]);
        let baseline = decode_request(bytes.clone()).unwrap().unwrap();

        // Inject an unrecognized element at ENTRY level, before the FIELD
        // subtree. Entry-level bytes carry no digest scope, so the entry
        // must parse identically.
        let field_begin = [
            MARKER_BEGIN,
            (Tag::Field.code() >> 8) as u8,
            Tag::Field.code() as u8,
            0x00,
        ];
        let pos = bytes
            .windows(4)
            .rposition(|w| w == field_begin)
            .expect("field element present");
        let mut extended = bytes;
        let foreign = element_bytes(Tag::RetrieveField, b"ignored");
        extended.splice(pos..pos, foreign);

        let with_unknown = decode_request(extended).unwrap().unwrap();
        let (Request::Modification(a), Request::Modification(b)) = (baseline, with_unknown) else {
            panic!("expected modification requests");
        };
        assert_eq!(a.entries[0], b.entries[0]);
    }

    #[test]
    fn test_duplicate_field_name_rejected_when_writing() {
        let mut draft = sample_entry();
        draft
            .fields
            .push(FieldDraft::with_value("amount", "integer", vec![1]));
        let mut composer = Composer::handshake(Vec::new()).unwrap();
        let err = write_entry(&mut composer, &draft, &test_signer(), KIND).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateField(name) if name == "amount"));
    }

    #[test]
    fn test_modification_response_roundtrip() {
        let response = ModificationResponse {
            message_id: U256::from(99u64),
            results: vec![
                ModificationResult::Success {
                    entry_hash: vec![0xAA; 32],
                },
                ModificationResult::Error {
                    entry_hash: vec![0xBB; 32],
                    message: "version conflict".into(),
                },
                ModificationResult::Success {
                    entry_hash: vec![0xCC; 32],
                },
            ],
        };

        let mut composer = Composer::handshake(Vec::new()).unwrap();
        write_modification_response(&mut composer, &response).unwrap();
        let bytes = composer.finish().unwrap();

        let mut conv = Conversation::handshake(Cursor::new(bytes)).unwrap();
        let decoded = read_modification_response(&mut conv).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_query_roundtrip() {
        let query = Query {
            message_id: U256::from(5u64),
            consistency: Consistency::Count(2),
            tablespace: "ts1".into(),
            table: "t1".into(),
            fields: vec!["amount".into(), "owner".into()],
        };
        let mut composer = Composer::handshake(Vec::new()).unwrap();
        write_query_request(&mut composer, &query).unwrap();
        let bytes = composer.finish().unwrap();

        let mut conv = Conversation::handshake(Cursor::new(bytes)).unwrap();
        let Some(Request::Query(decoded)) = read_request(&mut conv, KIND).unwrap() else {
            panic!("expected query request");
        };
        assert_eq!(decoded.message_id, query.message_id);
        assert_eq!(decoded.consistency, query.consistency);
        assert_eq!(decoded.tablespace, "ts1");
        assert_eq!(decoded.table, "t1");
        assert_eq!(decoded.fields, vec!["amount", "owner"]);
    }

    #[test]
    fn test_query_response_roundtrip() {
        let response = QueryResponse {
            message_id: U256::from(5u64),
            outcome: QueryOutcome::Rows(vec![Row {
                fields: vec![RowField {
                    name: "amount".into(),
                    type_name: "integer".into(),
                    value: 42u64.to_be_bytes().to_vec(),
                }],
            }]),
        };
        let mut composer = Composer::handshake(Vec::new()).unwrap();
        write_query_response(&mut composer, &response).unwrap();
        let bytes = composer.finish().unwrap();

        let mut conv = Conversation::handshake(Cursor::new(bytes)).unwrap();
        assert_eq!(read_query_response(&mut conv).unwrap(), response);
    }

    #[test]
    fn test_query_error_response_roundtrip() {
        let response = QueryResponse {
            message_id: U256::from(6u64),
            outcome: QueryOutcome::Error("table not found: t9".into()),
        };
        let mut composer = Composer::handshake(Vec::new()).unwrap();
        write_query_response(&mut composer, &response).unwrap();
        let bytes = composer.finish().unwrap();

        let mut conv = Conversation::handshake(Cursor::new(bytes)).unwrap();
        assert_eq!(read_query_response(&mut conv).unwrap(), response);
    }

    #[test]
    fn test_error_report_renders_cause_chain() {
        #[derive(Debug)]
        struct Inner;
        impl std::fmt::Display for Inner {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("disk unavailable")
            }
        }
        impl std::error::Error for Inner {}

        #[derive(Debug)]
        struct Outer(Inner);
        impl std::fmt::Display for Outer {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("write failed")
            }
        }
        impl std::error::Error for Outer {
            fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
                Some(&self.0)
            }
        }

        let mut composer = Composer::handshake(Vec::new()).unwrap();
        write_error_report(&mut composer, &Outer(Inner)).unwrap();
        let bytes = composer.finish().unwrap();

        let mut conv = Conversation::handshake(Cursor::new(bytes)).unwrap();
        let messages = read_error_report(&mut conv).unwrap();
        assert_eq!(messages, vec!["write failed", "disk unavailable"]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // decode(encode(x)) == x for any well-formed response tree.
            #[test]
            fn prop_modification_response_roundtrip(
                message_id in any::<u64>(),
                results in proptest::collection::vec(
                    (
                        any::<bool>(),
                        proptest::collection::vec(any::<u8>(), 32),
                        "[a-z0-9 ]{0,40}",
                    ),
                    0..8,
                ),
            ) {
                let response = ModificationResponse {
                    message_id: U256::from(message_id),
                    results: results
                        .into_iter()
                        .map(|(ok, entry_hash, message)| {
                            if ok {
                                ModificationResult::Success { entry_hash }
                            } else {
                                ModificationResult::Error { entry_hash, message }
                            }
                        })
                        .collect(),
                };

                let mut composer = Composer::handshake(Vec::new()).unwrap();
                write_modification_response(&mut composer, &response).unwrap();
                let bytes = composer.finish().unwrap();

                let mut conv = Conversation::handshake(Cursor::new(bytes)).unwrap();
                prop_assert_eq!(read_modification_response(&mut conv).unwrap(), response);
            }
        }
    }

    #[test]
    fn test_sha256_pipeline() {
        // The digest algorithm is threaded through, not global: the whole
        // sign/verify pipeline also holds under SHA-256.
        let mut composer = Composer::handshake(Vec::new()).unwrap();
        let hashes = write_modification_request(
            &mut composer,
            U256::from(1u64),
            Consistency::Quorum,
            &[sample_entry()],
            &test_signer(),
            HashKind::Sha256,
        )
        .unwrap();
        let bytes = composer.finish().unwrap();

        let mut conv = Conversation::handshake(Cursor::new(bytes.clone())).unwrap();
        let Some(Request::Modification(request)) =
            read_request(&mut conv, HashKind::Sha256).unwrap()
        else {
            panic!();
        };
        assert_eq!(request.entries[0].header.header_hash, hashes[0]);

        // Reading the same bytes under Keccak recomputes a different header
        // digest, so the signature check fails first.
        let mut conv = Conversation::handshake(Cursor::new(bytes)).unwrap();
        let err = read_request(&mut conv, HashKind::Keccak256).unwrap_err();
        assert!(err.is_security(), "{err}");
    }
}
