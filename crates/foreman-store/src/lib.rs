//! # foreman-store
//!
//! SQLite persistence for the Foreman task coordinator: pooled read
//! connections (WAL mode), a single-writer transaction layer, migrations
//! with the composite indexes the query engine depends on, and stateless
//! repositories per entity.

#![deny(unsafe_code)]

pub mod connection;
pub mod migrations;
pub mod repository;
pub mod rows;
pub mod store;

pub use connection::{ConnectionPool, PooledConnection};
pub use store::Store;
