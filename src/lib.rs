//! Splits forum-style HTML columns into dated posts.
//!
//! The engine lives in [`parser`]; [`fetch`], [`recaps`], [`db`] and
//! [`export`] are the adapters the command line tool wires around it.

pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod fetch;
pub mod parser;
pub mod recaps;

pub use config::{EmptyTitlePolicy, SegmentConfig, Settings};
pub use error::SegmentError;
pub use parser::{Record, Segmenter, Source};
