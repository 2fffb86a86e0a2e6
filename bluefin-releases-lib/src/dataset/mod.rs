//! The persisted snapshot: run metadata plus the merged package collection.
//!
//! The document is consumed by a static-site build and diffed between runs, so
//! packages are always written in ascending identifier order and the file is
//! replaced atomically.

mod writer;

pub use writer::{Dataset, read, write};
