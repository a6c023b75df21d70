pub mod model;
pub mod parse;

pub use model::{Catalog, OsFamily, OsFamilyBuilder, OsVariant, Version, VersionBuilder};
pub use parse::is_archive_url;
