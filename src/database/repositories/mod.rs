pub mod group;
pub mod photo;

pub use group::GroupRepository;
pub use photo::PhotoRepository;

use super::{conversion_error, DatabaseError};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction};

pub trait Repository {
    fn conn(&self) -> &Connection;

    /// Repositories share one connection by reference, so transactions are
    /// opened without the `&mut` borrow rusqlite would otherwise require.
    fn transaction(&self) -> Result<Transaction<'_>, DatabaseError> {
        Ok(self.conn().unchecked_transaction()?)
    }
}

pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub(crate) fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}
