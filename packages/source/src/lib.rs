#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reading and decoding the Companies House basic company data extract.
//!
//! The extract is a single multi-gigabyte CSV. [`reader::CompanyCsvReader`]
//! streams it row by row and hands each row to [`decode::decode_record`],
//! which normalizes dates, integers, and empty strings into a
//! [`company_registry_company_models::CompanyRecord`].

pub mod decode;
pub mod header;
pub mod parsing;
pub mod reader;

pub use decode::DecodeError;
pub use reader::{CompanyCsvReader, SourceRow};

/// Errors that can occur while reading a source file.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The source file could not be opened.
    #[error("Cannot open source file {path}: {source}")]
    Open {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// I/O error while streaming the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV framing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is not present in the header row.
    #[error("Source file has no {column} column")]
    MissingColumn {
        /// Header name of the missing column.
        column: String,
    },
}
