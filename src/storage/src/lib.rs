pub mod port;
pub use port::{BatchOp, MockPersistencePort, PersistencePort, StorageError};

pub mod keys;

pub mod record;
pub use record::SCHEMA_VERSION;

pub mod memory;
pub use memory::MemoryStore;

pub mod file;
pub use file::FileStore;
