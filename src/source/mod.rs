pub mod loader;
pub mod normalizer;

pub use loader::{load_all, JsonDirSourceLoader, SourceLoader, SqliteSourceLoader};
