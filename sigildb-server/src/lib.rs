//! # sigildb-server
//!
//! TCP server for sigildb.
//!
//! This crate provides:
//! - TCP connection handling (async accept loop, blocking per-connection
//!   sessions)
//! - Protocol version negotiation and request dispatch
//! - Session bookkeeping
//! - YAML + environment configuration
//! - Optional TLS support

pub mod config;
pub mod dispatch;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod stream;
pub mod tls;

pub use config::{Config, ConfigError, NetworkConfig, ProtocolConfig, SchemaConfig, TlsConfig};
pub use dispatch::Dispatcher;
pub use error::ServerError;
pub use registry::{ProtocolHandler, ProtocolRegistry};
pub use server::{Server, ServerConfig};
pub use session::Session;
