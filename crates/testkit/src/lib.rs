//! In-memory reference driver for isle.
//!
//! [`MemoryServerPool`] hands out [`MemoryServer`]s matched against [`MemoryServerSpec`]s,
//! and [`MemoryDatabaseFactory`] creates uniquely named [`MemoryDatabase`] tenants on them,
//! optionally restored from a named backup. Nothing leaves the process, so islands built
//! on this driver run anywhere `cargo test` does.

mod client;
mod database;
mod pool;
mod server;

pub use client::{ClientError, DatabaseClient};
pub use database::{MemoryDatabase, MemoryDatabaseFactory, MemoryDatabaseSpec};
pub use pool::MemoryServerPool;
pub use server::{DEFAULT_COLLATION, MemoryServer, MemoryServerSpec};
