//! Protocol version registry.

use crate::error::ServerError;
use crate::session::Session;
use sigildb_protocol::{read_preamble, ProtocolError};
use std::collections::HashMap;
use std::io::{Read, Write};

/// One protocol version's implementation.
pub trait ProtocolHandler: Send + Sync {
    /// The version this handler speaks.
    fn version(&self) -> u16;

    /// Drives a whole conversation: the preamble is already consumed.
    fn serve(
        &self,
        session: &Session,
        input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<(), ServerError>;
}

/// Registry of available protocol implementations, keyed by version.
///
/// Populated once at startup and read-only afterwards; no synchronization
/// is needed at serve time.
#[derive(Default)]
pub struct ProtocolRegistry {
    handlers: HashMap<u16, Box<dyn ProtocolHandler>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler; the latest registration for a version wins.
    pub fn register(&mut self, handler: Box<dyn ProtocolHandler>) {
        self.handlers.insert(handler.version(), handler);
    }

    /// Looks up the implementation for a version.
    pub fn select(&self, version: u16) -> Option<&dyn ProtocolHandler> {
        self.handlers.get(&version).map(|h| h.as_ref())
    }

    /// Supported versions, ascending.
    pub fn versions(&self) -> Vec<u16> {
        let mut versions: Vec<u16> = self.handlers.keys().copied().collect();
        versions.sort_unstable();
        versions
    }

    /// Negotiates on the stream preamble and drives the conversation with
    /// the selected implementation.
    pub fn handle(
        &self,
        session: &Session,
        mut input: &mut dyn Read,
        output: &mut dyn Write,
    ) -> Result<(), ServerError> {
        let version = read_preamble(&mut input)?;
        let handler = self
            .select(version)
            .ok_or(ProtocolError::UnsupportedVersion(version))?;
        session.set_version(version);
        handler.serve(session, input, output)
    }
}
