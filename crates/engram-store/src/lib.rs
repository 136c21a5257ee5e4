//! Store adapters for the Engram memory layer.
//!
//! One uniform persistence contract ([`StoreAdapter`]) implemented per
//! physical backend:
//! - **Document store** (SQLite): durable rows with schema migrations
//! - **Key-value store**: in-process concurrent map
//! - **Vector store**: embedding-indexed with cosine ranking
//! - **Graph store**: items plus `related_to` adjacency
//!
//! A [`Store`] wraps one adapter with the pending-update set and transaction
//! scope that replica synchronization builds on.

pub mod adapter;
pub mod document;
pub mod graph;
pub mod kv;
pub mod migration;
pub mod store;
pub mod vector;

pub use adapter::{Delta, StoreAdapter};
pub use document::DocumentStore;
pub use graph::GraphStore;
pub use kv::KeyValueStore;
pub use store::{Store, Transaction};
pub use vector::VectorStore;
