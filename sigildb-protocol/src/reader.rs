//! Recursive controllers: the read side.
//!
//! Every composite element is consumed by the same loop ([`accept_each`]):
//! offer each child BEGIN to a per-tag acceptor, skip what it does not
//! recognize, stop at the root's END. Controllers compose into the grammar
//! tree; each one owns the object it is populating.

use crate::channel::{Observer, ObserverId};
use crate::conversation::Conversation;
use crate::error::ProtocolError;
use crate::format::{Ascii, BigUint, Blob, ConsistencyFmt, EntryTypeFmt, Format, Millis, U64Be, Utf8};
use crate::hash::{field_set_hash, HashKind, HASH_LEN};
use crate::model::{
    Entry, EntryHeader, EntryType, Field, ModificationRequest, ModificationResponse,
    ModificationResult, Query, QueryOutcome, QueryResponse, Request, Row, RowField,
};
use crate::sig::{verify_signer, ADDRESS_LEN, SIGNATURE_LEN};
use crate::tag::Tag;
use chrono::{DateTime, Utc};
use ethers_core::types::U256;
use std::collections::BTreeMap;
use std::io::Read;

/// Result of offering a BEGIN event to an acceptor.
///
/// `Unrecognized` asks the dispatch loop to skip the subtree; it does not
/// signal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    Recognized,
    Unrecognized,
}

/// Uniform dispatch loop shared by every composite controller.
///
/// The root's BEGIN must already be consumed. The acceptor fully consumes
/// each element it recognizes, END included.
pub fn accept_each<R: Read>(
    conv: &mut Conversation<R>,
    root: Tag,
    mut accept: impl FnMut(&mut Conversation<R>, Tag) -> Result<Acceptance, ProtocolError>,
) -> Result<(), ProtocolError> {
    loop {
        match conv.next()? {
            None => return Err(ProtocolError::UnexpectedEof(conv.depth())),
            Some(ev) if ev.is_begin() => {
                if accept(conv, ev.tag)? == Acceptance::Unrecognized {
                    conv.skip()?;
                }
            }
            Some(ev) if ev.tag == root => return Ok(()),
            Some(ev) => {
                return Err(ProtocolError::IllegalEvent {
                    tag: ev.tag,
                    state: ev.state.name(),
                    context: root,
                })
            }
        }
    }
}

fn set_once<T>(slot: &mut Option<T>, tag: Tag, value: T) -> Result<(), ProtocolError> {
    if slot.is_some() {
        return Err(ProtocolError::DuplicateValue(tag));
    }
    *slot = Some(value);
    Ok(())
}

fn require<T>(slot: Option<T>, tag: Tag) -> Result<T, ProtocolError> {
    slot.ok_or(ProtocolError::MissingValue(tag))
}

/// Consumes the END of a leaf element after its value was read.
fn expect_end<R: Read>(conv: &mut Conversation<R>, tag: Tag) -> Result<(), ProtocolError> {
    match conv.next()? {
        Some(ev) if ev.is_end() && ev.tag == tag => Ok(()),
        Some(ev) => Err(ProtocolError::IllegalEvent {
            tag: ev.tag,
            state: ev.state.name(),
            context: tag,
        }),
        None => Err(ProtocolError::UnexpectedEof(conv.depth())),
    }
}

/// Reads a leaf element's value and its END.
fn read_value<R: Read, T>(
    conv: &mut Conversation<R>,
    tag: Tag,
    format: &impl Format<T>,
) -> Result<T, ProtocolError> {
    let value = conv.read(format)?;
    expect_end(conv, tag)?;
    Ok(value)
}

fn check_hash_len(tag: Tag, bytes: &[u8]) -> Result<(), ProtocolError> {
    if bytes.len() != HASH_LEN {
        return Err(ProtocolError::InvalidValue {
            tag,
            format: "bytes",
            reason: format!("{} bytes, expected {HASH_LEN}", bytes.len()),
        });
    }
    Ok(())
}

/// Reads the next request off a conversation, or `None` at a clean end of
/// the stream.
pub fn read_request<R: Read>(
    conv: &mut Conversation<R>,
    kind: HashKind,
) -> Result<Option<Request>, ProtocolError> {
    match conv.next()? {
        None => Ok(None),
        Some(ev) if ev.is_begin() && ev.tag == Tag::ModificationRequest => Ok(Some(
            Request::Modification(read_modification_request(conv, kind)?),
        )),
        Some(ev) if ev.is_begin() && ev.tag == Tag::QueryRequest => {
            Ok(Some(Request::Query(read_query(conv)?)))
        }
        Some(ev) => Err(ProtocolError::UnexpectedRoot(ev.tag)),
    }
}

/// Reads a MODIFICATION_REQUEST body; the root BEGIN is already consumed.
pub fn read_modification_request<R: Read>(
    conv: &mut Conversation<R>,
    kind: HashKind,
) -> Result<ModificationRequest, ProtocolError> {
    let mut message_id: Option<U256> = None;
    let mut consistency = None;
    let mut entries = Vec::new();

    accept_each(conv, Tag::ModificationRequest, |conv, tag| match tag {
        Tag::MessageId => {
            set_once(&mut message_id, tag, read_value(conv, tag, &BigUint)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::Consistency => {
            set_once(&mut consistency, tag, read_value(conv, tag, &ConsistencyFmt)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::Entry => {
            entries.push(read_entry(conv, kind)?);
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;

    Ok(ModificationRequest {
        message_id: require(message_id, Tag::MessageId)?,
        consistency: consistency.unwrap_or_default(),
        entries,
    })
}

/// Reads an ENTRY body; the root BEGIN is already consumed.
///
/// The field-set hash is checked once the subtree closes; a mismatch is a
/// fatal `HashMismatch`.
pub fn read_entry<R: Read>(
    conv: &mut Conversation<R>,
    kind: HashKind,
) -> Result<Entry, ProtocolError> {
    let mut header: Option<EntryHeader> = None;
    let mut fields: BTreeMap<String, Field> = BTreeMap::new();

    accept_each(conv, Tag::Entry, |conv, tag| match tag {
        Tag::EntryHeader => {
            if header.is_some() {
                return Err(ProtocolError::DuplicateHeader);
            }
            header = Some(read_entry_header(conv, kind)?);
            Ok(Acceptance::Recognized)
        }
        Tag::Field => {
            let field = read_field(conv, kind)?;
            if fields.contains_key(&field.name) {
                return Err(ProtocolError::DuplicateField(field.name));
            }
            fields.insert(field.name.clone(), field);
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;

    let header = require(header, Tag::EntryHeader)?;
    let computed = field_set_hash(kind, fields.values().map(|f| f.hash.as_slice()));
    if computed != header.fld_hash {
        return Err(ProtocolError::HashMismatch {
            expected: hex::encode(&header.fld_hash),
            actual: hex::encode(&computed),
        });
    }
    Ok(Entry { header, fields })
}

struct HeaderDraft {
    tablespace: String,
    table: String,
    entry_type: EntryType,
    timestamp: DateTime<Utc>,
    version: U256,
    network: u64,
    old_hash: Vec<u8>,
    fld_hash: Vec<u8>,
    signature: Vec<u8>,
    signer: Vec<u8>,
}

/// Reads an ENTRY_HEADER body; the root BEGIN is already consumed.
///
/// A digest observer spans the whole header subtree (the signature payload
/// excepted); the finalized digest is verified against the signature at
/// close and becomes the header hash.
pub fn read_entry_header<R: Read>(
    conv: &mut Conversation<R>,
    kind: HashKind,
) -> Result<EntryHeader, ProtocolError> {
    let digest_id = conv.attach(Observer::digest(kind));
    let result = read_header_fields(conv, digest_id);
    // The observer comes off the stream on every exit path.
    let observer = conv.detach(digest_id)?;
    let draft = result?;
    let header_hash = observer.finish();

    verify_signer(&header_hash, &draft.signature, &draft.signer)?;

    Ok(EntryHeader {
        tablespace: draft.tablespace,
        table: draft.table,
        entry_type: draft.entry_type,
        timestamp: draft.timestamp,
        version: draft.version,
        network: draft.network,
        old_hash: draft.old_hash,
        fld_hash: draft.fld_hash,
        signer: draft.signer,
        signature: draft.signature,
        header_hash,
    })
}

fn read_header_fields<R: Read>(
    conv: &mut Conversation<R>,
    digest_id: ObserverId,
) -> Result<HeaderDraft, ProtocolError> {
    let mut tablespace = None;
    let mut table = None;
    let mut entry_type = None;
    let mut timestamp = None;
    let mut version = None;
    let mut network = None;
    let mut old_hash = None;
    let mut fld_hash = None;
    let mut signature: Option<(Vec<u8>, Vec<u8>)> = None;

    accept_each(conv, Tag::EntryHeader, |conv, tag| match tag {
        Tag::TablespaceName => {
            set_once(&mut tablespace, tag, read_value(conv, tag, &Utf8)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::TableName => {
            set_once(&mut table, tag, read_value(conv, tag, &Utf8)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::EntryType => {
            set_once(&mut entry_type, tag, read_value(conv, tag, &EntryTypeFmt)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::EntryTimestamp => {
            set_once(&mut timestamp, tag, read_value(conv, tag, &Millis)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::EntryVersion => {
            set_once(&mut version, tag, read_value(conv, tag, &BigUint)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::EntryNetwork => {
            set_once(&mut network, tag, read_value(conv, tag, &U64Be)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::EntryOldHash => {
            let bytes = read_value(conv, tag, &Blob)?;
            if !bytes.is_empty() {
                check_hash_len(tag, &bytes)?;
            }
            set_once(&mut old_hash, tag, bytes)?;
            Ok(Acceptance::Recognized)
        }
        Tag::EntryFldHash => {
            let bytes = read_value(conv, tag, &Blob)?;
            check_hash_len(tag, &bytes)?;
            set_once(&mut fld_hash, tag, bytes)?;
            Ok(Acceptance::Recognized)
        }
        Tag::Signature => {
            set_once(&mut signature, tag, read_signature(conv, digest_id)?)?;
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;

    let (signature, signer) = require(signature, Tag::Signature)?;
    Ok(HeaderDraft {
        tablespace: require(tablespace, Tag::TablespaceName)?,
        table: require(table, Tag::TableName)?,
        entry_type: require(entry_type, Tag::EntryType)?,
        timestamp: require(timestamp, Tag::EntryTimestamp)?,
        version: require(version, Tag::EntryVersion)?,
        network: require(network, Tag::EntryNetwork)?,
        old_hash: require(old_hash, Tag::EntryOldHash)?,
        fld_hash: require(fld_hash, Tag::EntryFldHash)?,
        signature,
        signer,
    })
}

/// Reads a SIGNATURE body; the root BEGIN is already consumed.
///
/// The signature payload signs the surrounding header, so it cannot hash
/// itself: the header digest is suspended around exactly those bytes. The
/// SIGNER payload stays in scope.
fn read_signature<R: Read>(
    conv: &mut Conversation<R>,
    digest_id: ObserverId,
) -> Result<(Vec<u8>, Vec<u8>), ProtocolError> {
    let signature = conv.read_suspending(&Blob, digest_id)?;
    if signature.len() != SIGNATURE_LEN {
        return Err(ProtocolError::InvalidValue {
            tag: Tag::Signature,
            format: "bytes",
            reason: format!("{} bytes, expected {SIGNATURE_LEN}", signature.len()),
        });
    }

    let mut signer = None;
    accept_each(conv, Tag::Signature, |conv, tag| match tag {
        Tag::Signer => {
            let address = read_value(conv, tag, &Blob)?;
            if address.len() != ADDRESS_LEN {
                return Err(ProtocolError::InvalidValue {
                    tag,
                    format: "bytes",
                    reason: format!("{} bytes, expected {ADDRESS_LEN}", address.len()),
                });
            }
            set_once(&mut signer, tag, address)?;
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;

    Ok((signature, require(signer, Tag::Signer)?))
}

/// Reads a FIELD body; the root BEGIN is already consumed.
///
/// A digest observer spans the field subtree with the FIELD_TYPE payload
/// excluded. An explicit FIELD_HASH stops the computation entirely and is
/// authoritative. A capture observer records the raw span regardless.
pub fn read_field<R: Read>(
    conv: &mut Conversation<R>,
    kind: HashKind,
) -> Result<Field, ProtocolError> {
    let mut digest_id = Some(conv.attach(Observer::digest(kind)));
    let capture_id = conv.attach(Observer::capture());

    let result = read_field_parts(conv, &mut digest_id);
    // Both observers come off the stream on every exit path.
    let computed = match digest_id.take() {
        Some(id) => Some(conv.detach(id)?),
        None => None,
    };
    let raw = conv.detach(capture_id)?;
    let parts = result?;

    let hash = match parts.explicit_hash {
        Some(hash) => hash,
        // digest_id is only taken when an explicit hash arrived
        None => computed.ok_or(ProtocolError::MissingValue(Tag::FieldHash))?.finish(),
    };

    Ok(Field {
        name: parts.name,
        type_name: parts.type_name,
        hash,
        value: parts.value,
        raw: raw.finish(),
    })
}

struct FieldParts {
    name: String,
    type_name: String,
    explicit_hash: Option<Vec<u8>>,
    value: Option<Vec<u8>>,
}

fn read_field_parts<R: Read>(
    conv: &mut Conversation<R>,
    digest_id: &mut Option<ObserverId>,
) -> Result<FieldParts, ProtocolError> {
    let mut name = None;
    let mut type_name = None;
    let mut explicit_hash = None;
    let mut value = None;

    accept_each(conv, Tag::Field, |conv, tag| match tag {
        Tag::FieldName => {
            set_once(&mut name, tag, read_value(conv, tag, &Utf8)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::FieldType => {
            // Type payload bytes are not part of the field hash.
            let type_value = match *digest_id {
                Some(id) => conv.read_suspending(&Ascii, id)?,
                None => conv.read(&Ascii)?,
            };
            expect_end(conv, tag)?;
            set_once(&mut type_name, tag, type_value)?;
            Ok(Acceptance::Recognized)
        }
        Tag::FieldHash => {
            // Explicit hash is authoritative; computation stops here.
            if let Some(id) = digest_id.take() {
                conv.detach(id)?;
            }
            let bytes = read_value(conv, tag, &Blob)?;
            check_hash_len(tag, &bytes)?;
            set_once(&mut explicit_hash, tag, bytes)?;
            Ok(Acceptance::Recognized)
        }
        Tag::FieldValue => {
            set_once(&mut value, tag, read_value(conv, tag, &Blob)?)?;
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;

    Ok(FieldParts {
        name: require(name, Tag::FieldName)?,
        type_name: require(type_name, Tag::FieldType)?,
        explicit_hash,
        value,
    })
}

/// Reads a QUERY_REQUEST body; the root BEGIN is already consumed.
pub fn read_query<R: Read>(conv: &mut Conversation<R>) -> Result<Query, ProtocolError> {
    let mut message_id = None;
    let mut consistency = None;
    let mut tablespace = None;
    let mut table = None;
    let mut fields = Vec::new();

    accept_each(conv, Tag::QueryRequest, |conv, tag| match tag {
        Tag::MessageId => {
            set_once(&mut message_id, tag, read_value(conv, tag, &BigUint)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::Consistency => {
            set_once(&mut consistency, tag, read_value(conv, tag, &ConsistencyFmt)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::TablespaceName => {
            set_once(&mut tablespace, tag, read_value(conv, tag, &Utf8)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::TableName => {
            set_once(&mut table, tag, read_value(conv, tag, &Utf8)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::RetrieveField => {
            fields.push(read_value(conv, tag, &Utf8)?);
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;

    Ok(Query {
        message_id: require(message_id, Tag::MessageId)?,
        consistency: consistency.unwrap_or_default(),
        tablespace: require(tablespace, Tag::TablespaceName)?,
        table: require(table, Tag::TableName)?,
        fields,
    })
}

/// Reads a complete MODIFICATION_RESPONSE, root event included. This is
/// the client side of the wire.
pub fn read_modification_response<R: Read>(
    conv: &mut Conversation<R>,
) -> Result<ModificationResponse, ProtocolError> {
    match conv.next()? {
        Some(ev) if ev.is_begin() && ev.tag == Tag::ModificationResponse => {}
        Some(ev) => return Err(ProtocolError::UnexpectedRoot(ev.tag)),
        None => return Err(ProtocolError::UnexpectedEof(0)),
    }

    let mut message_id = None;
    let mut results = Vec::new();

    accept_each(conv, Tag::ModificationResponse, |conv, tag| match tag {
        Tag::MessageId => {
            set_once(&mut message_id, tag, read_value(conv, tag, &BigUint)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::ModificationSuccess => {
            let entry_hash = read_result_body(conv, tag)?.0;
            results.push(ModificationResult::Success { entry_hash });
            Ok(Acceptance::Recognized)
        }
        Tag::ModificationError => {
            let (entry_hash, message) = read_result_body(conv, tag)?;
            results.push(ModificationResult::Error {
                entry_hash,
                message: message.unwrap_or_default(),
            });
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;

    Ok(ModificationResponse {
        message_id: require(message_id, Tag::MessageId)?,
        results,
    })
}

fn read_result_body<R: Read>(
    conv: &mut Conversation<R>,
    root: Tag,
) -> Result<(Vec<u8>, Option<String>), ProtocolError> {
    let mut entry_hash = None;
    let mut message = None;

    accept_each(conv, root, |conv, tag| match tag {
        Tag::EntryHash => {
            set_once(&mut entry_hash, tag, read_value(conv, tag, &Blob)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::ErrorMessage => {
            set_once(&mut message, tag, read_value(conv, tag, &Utf8)?)?;
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;

    Ok((require(entry_hash, Tag::EntryHash)?, message))
}

/// Reads a complete QUERY_RESPONSE, root event included.
pub fn read_query_response<R: Read>(
    conv: &mut Conversation<R>,
) -> Result<QueryResponse, ProtocolError> {
    match conv.next()? {
        Some(ev) if ev.is_begin() && ev.tag == Tag::QueryResponse => {}
        Some(ev) => return Err(ProtocolError::UnexpectedRoot(ev.tag)),
        None => return Err(ProtocolError::UnexpectedEof(0)),
    }

    let mut message_id = None;
    let mut rows = Vec::new();
    let mut error = None;

    accept_each(conv, Tag::QueryResponse, |conv, tag| match tag {
        Tag::MessageId => {
            set_once(&mut message_id, tag, read_value(conv, tag, &BigUint)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::QueryEntry => {
            rows.push(read_row(conv)?);
            Ok(Acceptance::Recognized)
        }
        Tag::QueryError => {
            let messages = read_messages(conv, tag)?;
            set_once(&mut error, tag, messages.join("; "))?;
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;

    Ok(QueryResponse {
        message_id: require(message_id, Tag::MessageId)?,
        outcome: match error {
            Some(message) => QueryOutcome::Error(message),
            None => QueryOutcome::Rows(rows),
        },
    })
}

fn read_row<R: Read>(conv: &mut Conversation<R>) -> Result<Row, ProtocolError> {
    let mut row = Row::default();
    accept_each(conv, Tag::QueryEntry, |conv, tag| match tag {
        Tag::Field => {
            row.fields.push(read_row_field(conv)?);
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;
    Ok(row)
}

fn read_row_field<R: Read>(conv: &mut Conversation<R>) -> Result<RowField, ProtocolError> {
    let mut name = None;
    let mut type_name = None;
    let mut value = None;

    accept_each(conv, Tag::Field, |conv, tag| match tag {
        Tag::FieldName => {
            set_once(&mut name, tag, read_value(conv, tag, &Utf8)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::FieldType => {
            set_once(&mut type_name, tag, read_value(conv, tag, &Ascii)?)?;
            Ok(Acceptance::Recognized)
        }
        Tag::FieldValue => {
            set_once(&mut value, tag, read_value(conv, tag, &Blob)?)?;
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;

    Ok(RowField {
        name: require(name, Tag::FieldName)?,
        type_name: require(type_name, Tag::FieldType)?,
        value: value.unwrap_or_default(),
    })
}

/// Reads a complete ERROR report, root event included: one message per
/// link of the peer's error chain, in encounter order.
pub fn read_error_report<R: Read>(
    conv: &mut Conversation<R>,
) -> Result<Vec<String>, ProtocolError> {
    match conv.next()? {
        Some(ev) if ev.is_begin() && ev.tag == Tag::Error => {}
        Some(ev) => return Err(ProtocolError::UnexpectedRoot(ev.tag)),
        None => return Err(ProtocolError::UnexpectedEof(0)),
    }
    read_messages(conv, Tag::Error)
}

fn read_messages<R: Read>(
    conv: &mut Conversation<R>,
    root: Tag,
) -> Result<Vec<String>, ProtocolError> {
    let mut messages = Vec::new();
    accept_each(conv, root, |conv, tag| match tag {
        Tag::ErrorMessage => {
            messages.push(read_value(conv, tag, &Utf8)?);
            Ok(Acceptance::Recognized)
        }
        _ => Ok(Acceptance::Unrecognized),
    })?;
    Ok(messages)
}
