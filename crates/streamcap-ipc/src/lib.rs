#![deny(clippy::all)]

mod discovery;
mod error;
mod record;
mod store;

pub use discovery::RecordEntry;
pub use discovery::StopReceipt;
pub use discovery::StopSelector;
pub use discovery::list_records;
pub use discovery::pid_alive;
pub use discovery::prune_stale;
pub use discovery::request_stop;
pub use error::StoreError;
pub use record::StatusRecord;
pub use store::StatusStore;
pub use store::status_dir;

pub type Result<T> = std::result::Result<T, StoreError>;
