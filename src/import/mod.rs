//! Task package export and import-merge.
//!
//! A package produced by [`export_package`] in one store can be merged into
//! another with [`ImportMerger`]; IDs are remapped, title conflicts are
//! resolved per [`ConflictStrategy`], and dependencies that exist in neither
//! place are handled per [`MissingDepStrategy`].

pub mod merger;
pub mod options;
pub mod package;
pub mod remap;

pub use merger::{import_package, resolve_duplicate_title, ImportMerger, ImportResult};
pub use options::{ConflictStrategy, ImportOptions, MissingDepStrategy};
pub use package::{export_package, ImportPackage, PACKAGE_FORMAT};
pub use remap::RemapTable;
