//! PanelFeed Core — domain types, remote extraction and point-in-time alignment.
//!
//! This crate contains the per-instrument half of the pipeline:
//! - Domain types (instruments, raw series, aligned panels)
//! - Quotation session trait with HTTP and synthetic implementations
//! - Retrying remote query with an explicit retry policy
//! - Provider → canonical field mapping
//! - As-of alignment of quarterly fundamentals onto the daily grid
//! - Parquet snapshot persistence

pub mod data;
pub mod domain;
