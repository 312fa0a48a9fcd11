pub mod audit;
pub mod store;

pub use audit::{Audit, Record, UserId};
pub use store::{Database, EntityKind, SlugSource, StorageError, Store, Table};
