//! # Database Module
//!
//! Persistence for users, games, promotions and transactions.
//! Postgres via tokio-postgres and deadpool, with an in-memory store
//! behind the same `CasinoStore` trait.

pub mod connection;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod postgres;
pub mod store;

pub use connection::{DatabaseConfig, DatabaseConnection};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::CasinoStore;
