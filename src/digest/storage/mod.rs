//! Storage backends for conversations and summary tasks.

pub mod kv_store;

pub use kv_store::{InMemoryStore, KeyValueStore, StoreFuture};
