pub mod blob_storage;
pub use blob_storage::{BlobStorage, LocalBlobStorage, MemoryBlobStorage};
pub mod store;
pub use store::{ApprovalClosing, Store};
pub mod memory_store;
pub use memory_store::MemoryStore;
pub mod pg_store;
pub use pg_store::PgStore;
