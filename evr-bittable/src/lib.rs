//! Event-to-action bit-mask compiler for the hardware event receiver.
//!
//! Action sources bind to event codes; the engine renders the packed mapping
//! as `256 * words_per_event` 32-bit words ready for upload, high word first
//! within each row.

mod dev;
mod table;

use evr_types::alarm::{Condition, Stat};

pub use dev::BitDev;
pub use table::{bit_tables, BitTable, BitTables};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    /// Row width must be positive.
    #[error("Range")]
    Range,
    /// The binding carries no action index.
    #[error("No Action")]
    NoAction,
    /// Another binding already owns the requested cell.
    #[error("Duplicate")]
    Duplicate,
    /// Render target is not a 32-bit unsigned array.
    #[error("Bad FTVL")]
    BadElemType,
    /// Render target cannot hold a full table image.
    #[error("Bad NELM")]
    BadCapacity,
    /// The record failed to bind at init.
    #[error("No Init")]
    NoInit,
}

impl Condition for TableError {
    fn stat(&self) -> Stat {
        match self {
            TableError::Range | TableError::NoAction | TableError::Duplicate => Stat::Write,
            TableError::BadElemType | TableError::BadCapacity => Stat::Read,
            TableError::NoInit => Stat::Comm,
        }
    }
}
