//! statbulk: retrieval-cache-merge pipeline for bulk statistical flat files.
//!
//! Government statistics agencies publish large datasets as flat files on
//! plain file servers. This crate covers the reusable core every dataset
//! wrapper builds on:
//!
//! - a conditional-fetch cache keyed on the HTTP `Last-Modified` header
//!   ([`fetch::check_freshness`], [`fetch::fetch`], [`cache::CacheStore`]);
//! - a tolerant tabular parser that repairs ragged rows and keeps
//!   leading-zero identifier codes as text ([`parse::parse`]);
//! - a merge engine that folds metadata tables into the primary table via
//!   join keys inferred from shared column names ([`merge::merge_all`]);
//! - an append-only diagnostics recorder exposed on the final
//!   [`DataCollection`](pipeline::DataCollection).
//!
//! [`pipeline::Pipeline`] wires the four together. Which URLs to use, how to
//! label codes or attach geometry is the business of thin per-dataset
//! wrappers, not of this crate.

pub mod cache;
pub mod diag;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod parse;
pub mod pipeline;
pub mod table;

pub use cache::{CacheEntry, CacheStore};
pub use diag::{DiagRecorder, DiagSnapshot, DownloadRecord, TransferOutcome};
pub use error::{Error, Result};
pub use fetch::{check_freshness, fetch, FileFormat, Freshness, RemoteFileDescriptor};
pub use merge::{merge_all, MappingTable, StepOutcome};
pub use pipeline::{DataCollection, MappingSource, Pipeline, PipelineConfig};
pub use table::{Column, ColumnKind, RawTable, TypedTable, Value};
