//! The narrow interface the protocol layer dispatches into.

use crate::error::ServiceError;
use sigildb_protocol::{Consistency, Entry, Query, Row};
use std::collections::BTreeMap;

/// Declared field types of one table: field name to type tag.
pub type FieldSchema = BTreeMap<String, String>;

/// Storage-side collaborator of the wire protocol.
///
/// One call per entry; implementations may reject individual operations
/// with a [`ServiceError`], which the dispatcher converts into that entry's
/// result without aborting the batch.
pub trait TableService: Send + Sync {
    fn insert(&self, entry: &Entry, consistency: Consistency) -> Result<(), ServiceError>;

    fn update(&self, entry: &Entry, consistency: Consistency) -> Result<(), ServiceError>;

    fn delete(&self, entry: &Entry, consistency: Consistency) -> Result<(), ServiceError>;

    fn select(&self, query: &Query, consistency: Consistency) -> Result<Vec<Row>, ServiceError>;

    fn schema(&self, tablespace: &str, table: &str) -> Result<FieldSchema, ServiceError>;
}
