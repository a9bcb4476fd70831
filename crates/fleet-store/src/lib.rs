//! # fleet-store
//!
//! SQLite persistence for the fleet platform.
//!
//! Implements the coordination core's `GroupStore` and `OwnershipStore`
//! contracts over a pooled `rusqlite` connection:
//!
//! - **Groups**: definition rows with member IDs as a JSON column
//! - **Ownership**: robot → owner records
//! - **Migrations**: version-tracked schema evolution
//!
//! Connection state is deliberately *not* persisted anywhere; only the
//! durable ownership/group truth lives here.

#![deny(unsafe_code)]

pub mod migrations;
pub mod sqlite;

pub use sqlite::SqliteStore;
