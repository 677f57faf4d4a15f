pub mod catalog;
pub mod error;
pub mod gaps;
pub mod history;
pub mod live;
pub mod records;
pub mod schema;
pub mod sqlite;
pub mod tracking;
mod values;

pub use error::StorageError;
pub use records::*;
pub use schema::StorageOptions;
pub use sqlite::SqliteStorage;
