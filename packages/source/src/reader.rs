//! Streaming reader over a registry extract.
//!
//! Rows are pulled one at a time into a reused buffer, so memory use does
//! not depend on file size. Per-row problems (bad UTF-8, wrong field count,
//! missing key) come back as [`SourceRow::Rejected`] and the caller keeps
//! reading; only I/O and CSV framing failures are returned as errors.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use company_registry_company_models::CompanyRecord;
use csv::{ByteRecord, StringRecord};

use crate::SourceError;
use crate::decode::{DecodeError, decode_record};
use crate::header::HeaderMap;

/// One row pulled from the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRow {
    /// The row decoded cleanly.
    Decoded(CompanyRecord),
    /// The row was rejected and should be counted as a decode failure.
    Rejected {
        /// 1-based line number the row started on.
        line: u64,
        /// Why it was rejected.
        error: DecodeError,
    },
}

/// A CSV reader that yields decoded company rows.
pub struct CompanyCsvReader<R: Read> {
    reader: csv::Reader<R>,
    headers: HeaderMap,
    buffer: ByteRecord,
    total_bytes: Option<u64>,
}

impl CompanyCsvReader<File> {
    /// Opens a registry extract from disk and resolves its header row.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the file cannot be opened, the header row
    /// cannot be read, or the company number column is missing.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(|e| SourceError::Open {
            path: path.display().to_string(),
            source: e,
        })?;
        let total_bytes = file.metadata().ok().map(|m| m.len());
        Self::from_reader(file, total_bytes)
    }
}

impl<R: Read> CompanyCsvReader<R> {
    /// Wraps any reader. `total_bytes` is used only for progress estimates.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the header row cannot be read or the
    /// company number column is missing.
    pub fn from_reader(inner: R, total_bytes: Option<u64>) -> Result<Self, SourceError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .buffer_capacity(1 << 20)
            .from_reader(inner);

        let header_row = reader.headers()?.clone();
        let headers = HeaderMap::from_headers(header_row.iter())?;

        Ok(Self {
            reader,
            headers,
            buffer: ByteRecord::new(),
            total_bytes,
        })
    }

    /// Size of the underlying file, when known.
    #[must_use]
    pub const fn total_bytes(&self) -> Option<u64> {
        self.total_bytes
    }

    /// Bytes consumed so far, including the header row.
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.reader.position().byte()
    }

    /// Reads and decodes the next row. Returns `Ok(None)` at end of file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on I/O failure or unrecoverable CSV framing
    /// errors.
    pub fn next_row(&mut self) -> Result<Option<SourceRow>, SourceError> {
        if !self.reader.read_byte_record(&mut self.buffer)? {
            return Ok(None);
        }

        let line = self.buffer.position().map_or(0, csv::Position::line);
        let bytes = std::mem::take(&mut self.buffer);

        let row = match StringRecord::from_byte_record(bytes) {
            Ok(record) => {
                let row = match decode_record(&self.headers, &record) {
                    Ok(company) => SourceRow::Decoded(company),
                    Err(error) => SourceRow::Rejected { line, error },
                };
                self.buffer = record.into_byte_record();
                row
            }
            Err(e) => {
                let message = format!("invalid UTF-8: {}", e.utf8_error());
                self.buffer = e.into_byte_record();
                SourceRow::Rejected {
                    line,
                    error: DecodeError::Malformed { message },
                }
            }
        };

        Ok(Some(row))
    }
}
