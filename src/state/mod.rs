pub mod snapshot;

pub use snapshot::{GroupStatus, ScanSnapshot};
