pub mod error;
pub mod memory;
pub mod models;
pub mod store;

#[cfg(feature = "mongodb")]
pub mod mongo;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use models::{tool_call_request_for, MessageRole, StoredMessage, ThreadRecord};
pub use store::{ChatStore, MessageStore, ThreadDirectory};

#[cfg(feature = "mongodb")]
pub use mongo::MongoStore;
