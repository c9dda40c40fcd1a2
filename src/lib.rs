#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_long_first_doc_paragraph)]

//! An embeddable, append-only, log-structured key-value storage engine in the Bitcask tradition.
//!
//! Every write is appended to a log file on disk; an in-memory (or, optionally, disk-resident)
//! index maps each live key to the location of its most recent record. See [`Engine`] for the
//! primary entry point.

pub mod batch;
pub mod data;
pub mod engine;
pub mod error;
pub mod index;
pub mod io;
pub mod iterator;
pub mod merge;
pub mod options;

pub use batch::WriteBatch;
pub use engine::{Engine, Stat};
pub use error::{Error, Result};
pub use iterator::Iterator;
pub use options::{IndexType, IteratorOptions, Options, WriteBatchOptions};
