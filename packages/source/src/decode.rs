//! Row decoding: one CSV record in, one [`CompanyRecord`] (or a
//! [`DecodeError`]) out. No I/O happens here.

use company_registry_company_models::{
    AccountsInfo, CompanyRecord, MAX_COMPANY_NUMBER_LEN, RegisteredAddress,
};

use crate::header::{HeaderMap, SourceColumn};
use crate::parsing::{non_empty, parse_optional_int, parse_uk_date};

/// Why a single row could not be decoded. These are recoverable: the row
/// is skipped and counted, and the stream continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The row has no company number.
    #[error("row has no company number")]
    MissingNaturalKey,

    /// The company number cannot be a registered number.
    #[error("invalid company number {key:?}")]
    InvalidNaturalKey {
        /// The trimmed key as read.
        key: String,
    },

    /// The row does not line up with the header.
    #[error("malformed row: {message}")]
    Malformed {
        /// Description of what went wrong.
        message: String,
    },
}

/// Read-only access to the cells of one row.
pub trait RowCells {
    /// Number of cells in the row.
    fn len(&self) -> usize;

    /// Returns `true` if the row has no cells.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at `idx`, if present.
    fn cell(&self, idx: usize) -> Option<&str>;
}

impl RowCells for csv::StringRecord {
    fn len(&self) -> usize {
        Self::len(self)
    }

    fn cell(&self, idx: usize) -> Option<&str> {
        Self::get(self, idx)
    }
}

impl RowCells for [&str] {
    fn len(&self) -> usize {
        <[&str]>::len(self)
    }

    fn cell(&self, idx: usize) -> Option<&str> {
        self.get(idx).copied()
    }
}

/// Decodes one row against a resolved header.
///
/// # Errors
///
/// * [`DecodeError::Malformed`] if the row's field count differs from the
///   header's.
/// * [`DecodeError::MissingNaturalKey`] if the company number is blank.
/// * [`DecodeError::InvalidNaturalKey`] if the company number is longer
///   than [`MAX_COMPANY_NUMBER_LEN`] or not ASCII alphanumeric.
pub fn decode_record<R>(headers: &HeaderMap, row: &R) -> Result<CompanyRecord, DecodeError>
where
    R: RowCells + ?Sized,
{
    if row.len() != headers.width() {
        return Err(DecodeError::Malformed {
            message: format!(
                "expected {} fields, found {}",
                headers.width(),
                row.len()
            ),
        });
    }

    let raw = |column: SourceColumn| {
        headers
            .position(column)
            .and_then(|idx| row.cell(idx))
            .unwrap_or("")
    };
    let text = |column: SourceColumn| non_empty(raw(column));
    let date = |column: SourceColumn| parse_uk_date(raw(column));
    let int = |column: SourceColumn| parse_optional_int(raw(column));

    let company_number = text(SourceColumn::CompanyNumber).ok_or(DecodeError::MissingNaturalKey)?;
    if !is_valid_company_number(&company_number) {
        return Err(DecodeError::InvalidNaturalKey {
            key: company_number,
        });
    }

    Ok(CompanyRecord {
        company_number,
        company_name: text(SourceColumn::CompanyName),
        company_status: text(SourceColumn::CompanyStatus),
        company_category: text(SourceColumn::CompanyCategory),
        address: RegisteredAddress {
            care_of: text(SourceColumn::CareOf),
            po_box: text(SourceColumn::PoBox),
            line1: text(SourceColumn::AddressLine1),
            line2: text(SourceColumn::AddressLine2),
            post_town: text(SourceColumn::PostTown),
            county: text(SourceColumn::County),
            country: text(SourceColumn::Country),
            postcode: text(SourceColumn::PostCode),
        },
        country_of_origin: text(SourceColumn::CountryOfOrigin),
        dissolution_date: date(SourceColumn::DissolutionDate),
        incorporation_date: date(SourceColumn::IncorporationDate),
        accounts: AccountsInfo {
            ref_day: int(SourceColumn::AccountRefDay),
            ref_month: int(SourceColumn::AccountRefMonth),
            next_due_date: date(SourceColumn::AccountsNextDueDate),
            last_made_up_date: date(SourceColumn::AccountsLastMadeUpDate),
            category: text(SourceColumn::AccountCategory),
        },
        sic_codes: [
            text(SourceColumn::SicText1),
            text(SourceColumn::SicText2),
            text(SourceColumn::SicText3),
            text(SourceColumn::SicText4),
        ],
    })
}

/// Registered numbers are at most eight ASCII letters and digits.
#[must_use]
pub fn is_valid_company_number(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= MAX_COMPANY_NUMBER_LEN
        && key.bytes().all(|b| b.is_ascii_alphanumeric())
}
