//! Block persistence
//!
//! A sled database holding serialized blocks keyed by hash plus the tip pointer.

pub mod block_store;

pub use block_store::BlockStore;
