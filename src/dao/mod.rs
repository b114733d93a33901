/// In-process document store.
pub mod memory;
/// Database model definitions.
pub mod models;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;
/// Generic persistence port.
pub mod repository;
/// Storage abstraction layer for database operations.
pub mod storage;
