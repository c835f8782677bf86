//! In-memory table engine.
//!
//! Reference implementation of [`TableService`] for tests and standalone
//! nodes. Rows are keyed by their header-hash chain: an insert registers
//! the entry's header hash, an update or delete must name the live row by
//! that hash in `old_hash` and carry a strictly greater version.

use crate::error::ServiceError;
use crate::service::{FieldSchema, TableService};
use dashmap::DashMap;
use ethers_core::types::U256;
use parking_lot::RwLock;
use sigildb_protocol::{Consistency, Entry, Query, Row, RowField};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
struct StoredField {
    type_name: String,
    value: Vec<u8>,
}

#[derive(Debug, Clone)]
struct StoredRow {
    version: U256,
    fields: BTreeMap<String, StoredField>,
}

#[derive(Default)]
struct TableState {
    schema: FieldSchema,
    /// Live rows keyed by the header hash of their current version.
    rows: HashMap<Vec<u8>, StoredRow>,
}

#[derive(Default)]
struct Table {
    state: RwLock<TableState>,
}

#[derive(Default)]
struct Tablespace {
    tables: DashMap<String, Table>,
}

/// The in-memory engine.
#[derive(Default)]
pub struct TableEngine {
    tablespaces: DashMap<String, Tablespace>,
}

impl TableEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tablespace; idempotent.
    pub fn create_tablespace(&self, name: impl Into<String>) {
        self.tablespaces.entry(name.into()).or_default();
    }

    /// Creates a table; the tablespace must exist.
    pub fn create_table(
        &self,
        tablespace: &str,
        table: impl Into<String>,
    ) -> Result<(), ServiceError> {
        let ts = self
            .tablespaces
            .get(tablespace)
            .ok_or_else(|| ServiceError::TablespaceNotFound {
                tablespace: tablespace.to_string(),
            })?;
        ts.tables.entry(table.into()).or_default();
        Ok(())
    }

    /// Number of live rows in a table, for tests and introspection.
    pub fn row_count(&self, tablespace: &str, table: &str) -> Result<usize, ServiceError> {
        self.with_table(tablespace, table, |state| Ok(state.rows.len()))
    }

    fn with_table<T>(
        &self,
        tablespace: &str,
        table: &str,
        body: impl FnOnce(&mut TableState) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let ts = self
            .tablespaces
            .get(tablespace)
            .ok_or_else(|| ServiceError::TablespaceNotFound {
                tablespace: tablespace.to_string(),
            })?;
        let tbl = ts.tables.get(table).ok_or_else(|| ServiceError::TableNotFound {
            tablespace: tablespace.to_string(),
            table: table.to_string(),
        })?;
        let mut state = tbl.state.write();
        body(&mut state)
    }

    fn check_schema(state: &mut TableState, entry: &Entry) -> Result<(), ServiceError> {
        for field in entry.fields.values() {
            match state.schema.get(&field.name) {
                Some(declared) if declared != &field.type_name => {
                    return Err(ServiceError::SchemaViolation {
                        reason: format!(
                            "field {:?} is {declared}, entry declares {}",
                            field.name, field.type_name
                        ),
                    });
                }
                Some(_) => {}
                None => {
                    state
                        .schema
                        .insert(field.name.clone(), field.type_name.clone());
                }
            }
        }
        Ok(())
    }

    fn stored_fields(entry: &Entry) -> BTreeMap<String, StoredField> {
        entry
            .fields
            .values()
            .map(|f| {
                (
                    f.name.clone(),
                    StoredField {
                        type_name: f.type_name.clone(),
                        value: f.value.clone().unwrap_or_default(),
                    },
                )
            })
            .collect()
    }

    /// Validates that `old_hash` names a live row and the proposed version
    /// supersedes it. Mutates nothing; rejected mutations must leave the
    /// table untouched.
    fn check_chain(state: &TableState, entry: &Entry) -> Result<(), ServiceError> {
        let prior = state.rows.get(&entry.header.old_hash).ok_or_else(|| {
            ServiceError::EntryNotFound {
                old_hash: hex::encode(&entry.header.old_hash),
            }
        })?;
        if entry.header.version <= prior.version {
            return Err(ServiceError::VersionConflict {
                stored: prior.version.to_string(),
                proposed: entry.header.version.to_string(),
            });
        }
        Ok(())
    }
}

impl TableService for TableEngine {
    fn insert(&self, entry: &Entry, consistency: Consistency) -> Result<(), ServiceError> {
        tracing::trace!(
            tablespace = %entry.header.tablespace,
            table = %entry.header.table,
            %consistency,
            "insert"
        );
        self.with_table(&entry.header.tablespace, &entry.header.table, |state| {
            if !entry.header.old_hash.is_empty() {
                return Err(ServiceError::SchemaViolation {
                    reason: "insert carries a prior-version hash".into(),
                });
            }
            if state.rows.contains_key(&entry.header.header_hash) {
                return Err(ServiceError::EntryExists {
                    entry_hash: hex::encode(&entry.header.header_hash),
                });
            }
            Self::check_schema(state, entry)?;
            state.rows.insert(
                entry.header.header_hash.clone(),
                StoredRow {
                    version: entry.header.version,
                    fields: Self::stored_fields(entry),
                },
            );
            Ok(())
        })
    }

    fn update(&self, entry: &Entry, consistency: Consistency) -> Result<(), ServiceError> {
        tracing::trace!(
            tablespace = %entry.header.tablespace,
            table = %entry.header.table,
            %consistency,
            "update"
        );
        self.with_table(&entry.header.tablespace, &entry.header.table, |state| {
            Self::check_chain(state, entry)?;
            Self::check_schema(state, entry)?;
            let prior = state
                .rows
                .remove(&entry.header.old_hash)
                .ok_or_else(|| ServiceError::EntryNotFound {
                    old_hash: hex::encode(&entry.header.old_hash),
                })?;
            // Unmentioned fields carry over from the prior version.
            let mut fields = prior.fields;
            fields.extend(Self::stored_fields(entry));
            state.rows.insert(
                entry.header.header_hash.clone(),
                StoredRow {
                    version: entry.header.version,
                    fields,
                },
            );
            Ok(())
        })
    }

    fn delete(&self, entry: &Entry, consistency: Consistency) -> Result<(), ServiceError> {
        tracing::trace!(
            tablespace = %entry.header.tablespace,
            table = %entry.header.table,
            %consistency,
            "delete"
        );
        self.with_table(&entry.header.tablespace, &entry.header.table, |state| {
            Self::check_chain(state, entry)?;
            state.rows.remove(&entry.header.old_hash);
            Ok(())
        })
    }

    fn select(&self, query: &Query, consistency: Consistency) -> Result<Vec<Row>, ServiceError> {
        tracing::trace!(
            tablespace = %query.tablespace,
            table = %query.table,
            %consistency,
            "select"
        );
        self.with_table(&query.tablespace, &query.table, |state| {
            // Deterministic row order: by current header hash.
            let mut keyed: Vec<(&Vec<u8>, &StoredRow)> = state.rows.iter().collect();
            keyed.sort_by(|a, b| a.0.cmp(b.0));

            let rows = keyed
                .into_iter()
                .map(|(_, row)| Row {
                    fields: row
                        .fields
                        .iter()
                        .filter(|(name, _)| {
                            query.fields.is_empty() || query.fields.contains(name)
                        })
                        .map(|(name, field)| RowField {
                            name: name.clone(),
                            type_name: field.type_name.clone(),
                            value: field.value.clone(),
                        })
                        .collect(),
                })
                .collect();
            Ok(rows)
        })
    }

    fn schema(&self, tablespace: &str, table: &str) -> Result<FieldSchema, ServiceError> {
        self.with_table(tablespace, table, |state| Ok(state.schema.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sigildb_protocol::{EntryHeader, EntryType, Field};

    fn entry(
        entry_type: EntryType,
        version: u64,
        old_hash: Vec<u8>,
        header_hash: Vec<u8>,
        fields: &[(&str, &str, &[u8])],
    ) -> Entry {
        let fields: BTreeMap<String, Field> = fields
            .iter()
            .map(|(name, type_name, value)| {
                (
                    name.to_string(),
                    Field {
                        name: name.to_string(),
                        type_name: type_name.to_string(),
                        hash: vec![0; 32],
                        value: Some(value.to_vec()),
                        raw: Vec::new(),
                    },
                )
            })
            .collect();
        Entry {
            header: EntryHeader {
                tablespace: "ts1".into(),
                table: "t1".into(),
                entry_type,
                timestamp: Utc::now(),
                version: U256::from(version),
                network: 0,
                old_hash,
                fld_hash: vec![0; 32],
                signer: vec![0; 20],
                signature: vec![0; 65],
                header_hash,
            },
            fields,
        }
    }

    fn engine() -> TableEngine {
        let engine = TableEngine::new();
        engine.create_tablespace("ts1");
        engine.create_table("ts1", "t1").unwrap();
        engine
    }

    #[test]
    fn test_insert_and_select() {
        let engine = engine();
        let e = entry(
            EntryType::Insert,
            1,
            Vec::new(),
            vec![0xAA; 32],
            &[("amount", "integer", &42u64.to_be_bytes())],
        );
        engine.insert(&e, Consistency::Quorum).unwrap();
        assert_eq!(engine.row_count("ts1", "t1").unwrap(), 1);

        let query = Query {
            message_id: U256::one(),
            consistency: Consistency::Quorum,
            tablespace: "ts1".into(),
            table: "t1".into(),
            fields: Vec::new(),
        };
        let rows = engine.select(&query, Consistency::Quorum).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields[0].name, "amount");
        assert_eq!(rows[0].fields[0].value, 42u64.to_be_bytes().to_vec());
    }

    #[test]
    fn test_insert_into_missing_table() {
        let engine = engine();
        let mut e = entry(EntryType::Insert, 1, Vec::new(), vec![0xAA; 32], &[]);
        e.header.table = "missing".into();
        let err = engine.insert(&e, Consistency::Quorum).unwrap_err();
        assert!(matches!(err, ServiceError::TableNotFound { .. }));
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let engine = engine();
        let e = entry(EntryType::Insert, 1, Vec::new(), vec![0xAA; 32], &[]);
        engine.insert(&e, Consistency::Quorum).unwrap();
        let err = engine.insert(&e, Consistency::Quorum).unwrap_err();
        assert!(matches!(err, ServiceError::EntryExists { .. }));
    }

    #[test]
    fn test_insert_with_old_hash_rejected() {
        let engine = engine();
        let e = entry(EntryType::Insert, 1, vec![0xBB; 32], vec![0xAA; 32], &[]);
        let err = engine.insert(&e, Consistency::Quorum).unwrap_err();
        assert!(matches!(err, ServiceError::SchemaViolation { .. }));
    }

    #[test]
    fn test_update_follows_hash_chain() {
        let engine = engine();
        let v1 = entry(
            EntryType::Insert,
            1,
            Vec::new(),
            vec![0xAA; 32],
            &[("amount", "integer", &1u64.to_be_bytes())],
        );
        engine.insert(&v1, Consistency::Quorum).unwrap();

        let v2 = entry(
            EntryType::Update,
            2,
            vec![0xAA; 32],
            vec![0xBB; 32],
            &[("amount", "integer", &2u64.to_be_bytes())],
        );
        engine.update(&v2, Consistency::Quorum).unwrap();
        assert_eq!(engine.row_count("ts1", "t1").unwrap(), 1);

        // The old hash no longer names a live row.
        let v2_again = entry(
            EntryType::Update,
            3,
            vec![0xAA; 32],
            vec![0xCC; 32],
            &[],
        );
        let err = engine.update(&v2_again, Consistency::Quorum).unwrap_err();
        assert!(matches!(err, ServiceError::EntryNotFound { .. }));
    }

    #[test]
    fn test_update_version_must_increase() {
        let engine = engine();
        let v1 = entry(EntryType::Insert, 5, Vec::new(), vec![0xAA; 32], &[]);
        engine.insert(&v1, Consistency::Quorum).unwrap();

        let stale = entry(EntryType::Update, 5, vec![0xAA; 32], vec![0xBB; 32], &[]);
        let err = engine.update(&stale, Consistency::Quorum).unwrap_err();
        assert!(matches!(err, ServiceError::VersionConflict { .. }));

        // The rejected update must not have consumed the row.
        assert_eq!(engine.row_count("ts1", "t1").unwrap(), 1);
        let fresh = entry(EntryType::Update, 6, vec![0xAA; 32], vec![0xBB; 32], &[]);
        engine.update(&fresh, Consistency::Quorum).unwrap();
    }

    #[test]
    fn test_update_carries_over_unmentioned_fields() {
        let engine = engine();
        let v1 = entry(
            EntryType::Insert,
            1,
            Vec::new(),
            vec![0xAA; 32],
            &[
                ("amount", "integer", &1u64.to_be_bytes()),
                ("owner", "string", b"alice"),
            ],
        );
        engine.insert(&v1, Consistency::Quorum).unwrap();

        let v2 = entry(
            EntryType::Update,
            2,
            vec![0xAA; 32],
            vec![0xBB; 32],
            &[("amount", "integer", &2u64.to_be_bytes())],
        );
        engine.update(&v2, Consistency::Quorum).unwrap();

        let query = Query {
            message_id: U256::one(),
            consistency: Consistency::Quorum,
            tablespace: "ts1".into(),
            table: "t1".into(),
            fields: Vec::new(),
        };
        let rows = engine.select(&query, Consistency::Quorum).unwrap();
        let names: Vec<&str> = rows[0].fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["amount", "owner"]);
        assert_eq!(rows[0].fields[0].value, 2u64.to_be_bytes().to_vec());
        assert_eq!(rows[0].fields[1].value, b"alice".to_vec());
    }

    #[test]
    fn test_delete_removes_row() {
        let engine = engine();
        let v1 = entry(EntryType::Insert, 1, Vec::new(), vec![0xAA; 32], &[]);
        engine.insert(&v1, Consistency::Quorum).unwrap();

        let del = entry(EntryType::Delete, 2, vec![0xAA; 32], vec![0xBB; 32], &[]);
        engine.delete(&del, Consistency::Quorum).unwrap();
        assert_eq!(engine.row_count("ts1", "t1").unwrap(), 0);
    }

    #[test]
    fn test_schema_inferred_and_enforced() {
        let engine = engine();
        let v1 = entry(
            EntryType::Insert,
            1,
            Vec::new(),
            vec![0xAA; 32],
            &[("amount", "integer", &1u64.to_be_bytes())],
        );
        engine.insert(&v1, Consistency::Quorum).unwrap();

        let schema = engine.schema("ts1", "t1").unwrap();
        assert_eq!(schema.get("amount").map(String::as_str), Some("integer"));

        let clash = entry(
            EntryType::Insert,
            1,
            Vec::new(),
            vec![0xBB; 32],
            &[("amount", "string", b"oops")],
        );
        let err = engine.insert(&clash, Consistency::Quorum).unwrap_err();
        assert!(matches!(err, ServiceError::SchemaViolation { .. }));
    }

    #[test]
    fn test_select_projects_requested_fields() {
        let engine = engine();
        let v1 = entry(
            EntryType::Insert,
            1,
            Vec::new(),
            vec![0xAA; 32],
            &[
                ("amount", "integer", &1u64.to_be_bytes()),
                ("owner", "string", b"alice"),
            ],
        );
        engine.insert(&v1, Consistency::Quorum).unwrap();

        let query = Query {
            message_id: U256::one(),
            consistency: Consistency::Quorum,
            tablespace: "ts1".into(),
            table: "t1".into(),
            fields: vec!["owner".into()],
        };
        let rows = engine.select(&query, Consistency::Quorum).unwrap();
        assert_eq!(rows[0].fields.len(), 1);
        assert_eq!(rows[0].fields[0].name, "owner");
    }
}
