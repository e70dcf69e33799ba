//! Bale Core
//!
//! Formats and utilities shared between the offline bundle builder and the
//! runtime bundle registry. Anything that must agree byte-for-byte at build and
//! run time lives here: bundle naming, the archive container, the offset
//! transform, and the dependency table.

pub mod alloc;
pub mod archive;
pub mod config;
pub mod dependency;
pub mod error;
pub mod kind;
pub mod logging;
pub mod name;
pub mod offset;
pub mod profiling;

pub use archive::{Archive, ArchiveWriter};
pub use config::Settings;
pub use dependency::DependencyTable;
pub use error::{FormatError, FormatResult};
pub use kind::AssetKind;
pub use name::NameResolver;
