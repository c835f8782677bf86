//! Request dispatch: version 1 of the wire protocol.
//!
//! Parses requests off the conversation, routes each entry to the table
//! service, and writes responses. Parse and security failures abort the
//! conversation with a wire ERROR report; service failures are captured
//! per entry and the batch continues.

use crate::error::ServerError;
use crate::registry::{ProtocolHandler, ProtocolRegistry};
use crate::session::Session;
use sigildb_core::TableService;
use sigildb_protocol::composer::Composer;
use sigildb_protocol::conversation::Conversation;
use sigildb_protocol::model::{
    EntryType, ModificationRequest, ModificationResponse, ModificationResult, Query, QueryOutcome,
    QueryResponse, Request,
};
use sigildb_protocol::reader::read_request;
use sigildb_protocol::writer::{
    write_error_report, write_modification_response, write_query_response,
};
use sigildb_protocol::{HashKind, PROTOCOL_VERSION};
use std::io::{Read, Write};
use std::sync::Arc;

/// Log target for tampering indicators (hash and signature failures).
pub const TAMPER_TARGET: &str = "sigildb::tamper";

/// Version 1 dispatcher.
pub struct Dispatcher {
    service: Arc<dyn TableService>,
    hash_kind: HashKind,
}

impl Dispatcher {
    pub fn new(service: Arc<dyn TableService>, hash_kind: HashKind) -> Self {
        Self { service, hash_kind }
    }

    /// Builds a registry with this dispatcher as the only implementation.
    pub fn into_registry(self) -> ProtocolRegistry {
        let mut registry = ProtocolRegistry::new();
        registry.register(Box::new(self));
        registry
    }

    fn apply_modification(&self, request: &ModificationRequest) -> ModificationResponse {
        let mut results = Vec::with_capacity(request.entries.len());
        for entry in &request.entries {
            let outcome = match entry.header.entry_type {
                EntryType::Insert => self.service.insert(entry, request.consistency),
                EntryType::Update => self.service.update(entry, request.consistency),
                EntryType::Delete => self.service.delete(entry, request.consistency),
            };
            results.push(match outcome {
                Ok(()) => ModificationResult::Success {
                    entry_hash: entry.header.header_hash.clone(),
                },
                Err(err) => {
                    tracing::debug!(code = err.code(), error = %err, "entry rejected by service");
                    ModificationResult::Error {
                        entry_hash: entry.header.header_hash.clone(),
                        message: format!("{}: {err}", err.code()),
                    }
                }
            });
        }
        ModificationResponse {
            message_id: request.message_id,
            results,
        }
    }

    fn apply_query(&self, query: &Query) -> QueryResponse {
        let outcome = match self.service.select(query, query.consistency) {
            Ok(rows) => QueryOutcome::Rows(rows),
            Err(err) => {
                tracing::debug!(code = err.code(), error = %err, "query rejected by service");
                QueryOutcome::Error(format!("{}: {err}", err.code()))
            }
        };
        QueryResponse {
            message_id: query.message_id,
            outcome,
        }
    }
}

impl ProtocolHandler for Dispatcher {
    fn version(&self) -> u16 {
        PROTOCOL_VERSION
    }

    fn serve(
        &self,
        session: &Session,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<(), ServerError> {
        let mut conv = Conversation::resume(input, self.version());
        let mut composer = Composer::handshake(output)?;

        loop {
            match read_request(&mut conv, self.hash_kind) {
                Ok(None) => break,
                Ok(Some(request)) => {
                    session.record_request();
                    match request {
                        Request::Modification(request) => {
                            tracing::info!(
                                session = %session.id,
                                message_id = %request.message_id,
                                entries = request.entries.len(),
                                "modification request"
                            );
                            let response = self.apply_modification(&request);
                            write_modification_response(&mut composer, &response)?;
                        }
                        Request::Query(query) => {
                            tracing::info!(
                                session = %session.id,
                                message_id = %query.message_id,
                                table = %format!("{}.{}", query.tablespace, query.table),
                                "query request"
                            );
                            let response = self.apply_query(&query);
                            write_query_response(&mut composer, &response)?;
                        }
                    }
                    composer.flush()?;
                }
                Err(err) => {
                    // The stream position can no longer be trusted; report
                    // the failure on the wire and end the conversation.
                    if err.is_security() {
                        tracing::warn!(
                            target: TAMPER_TARGET,
                            session = %session.id,
                            remote = %session.remote_addr,
                            error = %err,
                            "rejecting tampered request"
                        );
                    } else {
                        tracing::warn!(session = %session.id, error = %err, "malformed request");
                    }
                    write_error_report(&mut composer, &err)?;
                    composer.flush()?;
                    break;
                }
            }
        }
        Ok(())
    }
}
