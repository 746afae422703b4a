//! # symdex: syntax-only symbol chunker
//!
//! Walks Go, PHP, Python and Markdown source trees and turns each declaration
//! into a [`chunk::Chunk`] ready for an embedding pipeline. Nothing is
//! type-checked or executed; every fact comes from the syntax of one unit.
//!
//! ## Architecture
//!
//! - **[`config`]** - Configuration loading and validation
//! - **[`chunk`]** - The output record
//! - **[`error`]** - `IndexError` and the crate `Result`
//! - **[`indexer`]** - Walker, extractors, convert step, Eloquent and route passes
//!
//! ```no_run
//! use symdex::config::Config;
//! use symdex::indexer::Indexer;
//!
//! let report = Indexer::new(Config::default()).index(&["./app"])?;
//! for chunk in &report.chunks {
//!     println!("{} {} {}:{}", chunk.kind, chunk.name, chunk.file_path, chunk.start_line);
//! }
//! # Ok::<(), symdex::error::IndexError>(())
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod indexer;
