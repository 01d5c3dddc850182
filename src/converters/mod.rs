//! Format converters
//!
//! Readers and writers for persisted score formats.

pub mod mscx;

pub use mscx::{load_file, read_score, save_file, write_score, MscxError};
