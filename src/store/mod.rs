//! Persistence layer — libSQL-backed storage for onboarding records.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    Address, NewPayment, NewRecord, Payment, PersistedRecord, RecordCounts, RecordRepository, User,
};
