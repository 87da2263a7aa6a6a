pub mod error;
pub mod fetch;
pub mod record;

pub use error::{ErrorKind, SnapshotError};
pub use fetch::{FetchFuture, Fetcher};
pub use record::{
    KEY_EXTENSION, KEY_FORMAT, Snapshot, file_name, format_key, parse_instant, parse_key,
    truncate_to_second,
};
