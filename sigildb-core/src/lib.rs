//! # sigildb-core
//!
//! Table service layer for sigildb.
//!
//! This crate provides:
//! - The [`TableService`] trait the protocol dispatches into
//! - Service error taxonomy with stable wire codes
//! - An in-memory [`TableEngine`] reference implementation

pub mod engine;
pub mod error;
pub mod service;

pub use engine::TableEngine;
pub use error::ServiceError;
pub use service::{FieldSchema, TableService};
