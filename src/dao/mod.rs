/// Shared real-time document store and its backends.
pub mod doc_store;
/// Device-local persistence of the serialized session.
pub mod local_store;
/// Database model definitions.
pub mod models;
/// Storage abstraction layer for database operations.
pub mod storage;
