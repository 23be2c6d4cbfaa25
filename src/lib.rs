//! # gff3
//!
//! A streaming parser for Generic Feature Format version 3 (GFF3), the
//! line-oriented tab-separated bioinformatics interchange format. Given
//! one or more input streams, [`Parser`] reconstructs parent/child/derived
//! relationships across lines that may appear in any order — bounded only
//! by explicit `###` sync markers — while flushing completed subtrees
//! eagerly to keep resident memory bounded.
//!
//! ## Quick start
//!
//! ```toml
//! [dependencies]
//! gff3 = "0.1"
//!
//! # Spill in-flight features to disk instead of holding them in memory
//! gff3 = { version = "0.1", features = ["disk-store"] }
//! ```
//!
//! ```rust,ignore
//! use gff3::{Parser, LineSourceInput, Item};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut parser = Parser::open_paths(vec!["annotations.gff3".into()])?;
//!     for item in parser {
//!         match item? {
//!             Item::Feature(feature) => println!("{:?}", feature.primary_id()),
//!             Item::Directive(_) | Item::Comment(_) => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `disk-store`: spill in-flight features to a temp file instead of
//!   keeping every under-construction feature resident (adds `serde`,
//!   `bincode` dependencies; `tempfile` is always present since
//!   [`sync`] needs it too).
//! - `cli`: builds the `gff3-sync` binary (adds `clap`, `simple_logger`
//!   dependencies).

#![cfg_attr(doc, warn(missing_docs))]

pub mod codec;
pub mod error;
pub mod linesource;
pub mod model;
pub mod parser;
pub mod strand;
pub mod sync;
pub mod tempstore;

pub use error::{ParserError, ParserResult, SyncError, SyncResult};
pub use linesource::{LineSource, LineSourceInput};
pub use model::{Attributes, Comment, Directive, Feature, FeatureLine, Item, RefKind};
pub use parser::Parser;
pub use strand::{Phase, Strand};
pub use sync::{insert_markers, SyncInserter};
pub use tempstore::{MemoryTempStore, TempStore};

#[cfg(feature = "disk-store")]
pub use tempstore::DiskTempStore;
