pub mod models;
pub mod queries;
pub mod sqlite;

pub use queries::{volume_name, PERSIST_CHUNK_SIZE};
pub use sqlite::Database;
