//! Source tree → chunk pipeline.
//!
//! [`walker`] picks files, the per-language extractors fill
//! [`symbols::CompilationUnit`] tables, [`convert`] flattens them, and the
//! PHP passes in [`php::eloquent`] and [`php::routes`] add ORM metadata and
//! route chunks. [`Indexer`] drives one run.
pub mod code_parser;
pub mod convert;
pub mod core;
pub mod go;
pub mod languages;
pub mod markdown;
pub mod php;
pub mod python;
pub mod symbols;
pub mod walker;

pub use self::core::{IndexReport, Indexer};
