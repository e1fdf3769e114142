pub mod aggregator;
pub mod client;
pub mod error;
pub mod sql;
pub mod types;

pub use aggregator::{MarkerSourceAggregator, MessageIdIndex};
pub use client::{OriginStore, PgOriginStore};
pub use error::OriginError;
pub use sql::DateWindow;
pub use types::{
    MarkerRow, MarkerSource, MessageOrigin, NaiveTimestampZone, ObservedStatus, OriginDb,
    OriginMessageId, SqlParam, SqlQuery, SqlRow, SqlValue,
};
