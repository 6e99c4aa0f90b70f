mod kv;
mod memory;
mod records;
mod schema;
mod types;

pub use kv::KvStore;
pub use memory::MemoryStore;
pub use records::{RecordStore, HISTORY_LIMIT};
pub use schema::Database;
pub use types::DatabaseError;
