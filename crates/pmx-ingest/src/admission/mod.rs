//! Admission of detected files: watching, write-completion check and the
//! bounded worker pool.

pub mod pool;
pub mod stability;
pub mod watcher;

pub use pool::{FileProcessor, WorkerPool};
pub use stability::StabilityPolicy;
pub use watcher::{is_candidate, DirectoryWatcher};
