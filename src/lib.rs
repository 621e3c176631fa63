//! Media tree indexing and thumbnail caching.
//!
//! Two subsystems live here:
//!
//! - the scan pipeline ([`scanner`]), which walks a directory tree, extracts
//!   dimensions and capture times under a per-file deadline and persists the
//!   results in batches to the [`db`] store;
//! - the thumbnail service ([`thumbnails`]), which answers size-parameterized
//!   thumbnail requests from an in-memory LRU, then a persistent cache table,
//!   then the [`decoder`] adapter.

pub mod cancel;
pub mod config;
pub mod db;
pub mod deadline;
pub mod decoder;
pub mod error;
pub mod folders;
pub mod logging;
pub mod pool;
pub mod scanner;
pub mod thumbnails;

#[cfg(test)]
pub(crate) mod test_support;

pub use cancel::CancelToken;
pub use config::Config;
pub use db::Database;
pub use deadline::Deadline;
pub use error::{ExtractError, MediaError};
pub use scanner::{ScanRequest, ScanSummary, Scanner};
pub use thumbnails::{Bitmap, ThumbnailService};
