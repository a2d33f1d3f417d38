//! wsync tree reader: turns a raw file listing into a [`wsync_core::Tree`].
//!
//! - [`layout`]: on-disk naming conventions
//! - [`source`]: [`RawSource`] for local directories and in-memory exports
//! - [`imports`]: static import resolution for codebase bundles
//! - [`reader`]: [`TreeReader`]

pub mod error;
pub mod imports;
pub mod layout;
pub mod reader;
pub mod source;

pub use error::TreeError;
pub use reader::{MalformedEntity, ReadOutcome, TreeReader};
pub use source::{FileMap, LocalDir, MemorySource, RawSource};
