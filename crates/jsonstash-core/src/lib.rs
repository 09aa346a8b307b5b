pub mod codec;
pub mod compare;
pub mod engine;
pub mod error;
pub mod group;
pub mod sort;
pub mod store;
pub mod wal;

pub use codec::Record;
pub use engine::{InsertResponse, QueryEngine, QueryRequest, QueryResponse, INSERT_MESSAGE};
pub use error::{ErrorKind, JsonStashError};
pub use group::GroupedRecords;
pub use sort::SortOrder;
pub use store::{MemoryStore, RecordStore, StoreStats, WalStore};
pub use wal::StoredEntry;
