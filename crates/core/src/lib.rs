pub mod clock;
pub mod error;
pub mod field_value;
pub mod ident;
pub mod ids;
pub mod interval;
pub mod mirror;
pub mod schema;

pub use clock::{Clock, Timestamp};
pub use error::CoreError;
pub use field_value::{FieldValue, Row};
pub use ident::Identifier;
pub use ids::*;
pub use interval::Interval;
pub use mirror::{HistorySchema, TrackingSchema};
pub use schema::{ColumnDef, ColumnType, TableSchema, TimeSource};
