//! PostgreSQL integration
//!
//! The warehouse is read over a server-side cursor per worker session, and
//! the BFD database is written through a connection pool. Checkpoints live
//! in the BFD database so they commit with the rows they describe.

pub mod client;
pub mod destination;
pub mod models;
pub mod source;

pub use client::PostgreSQLClient;
pub use destination::PostgresDestination;
pub use models::LoadProgressRow;
pub use source::{PostgresSourceConnection, PostgresWarehouse};
