//! Source column names and header resolution.
//!
//! The extract has been published with and without a leading space in
//! front of column names (`" CompanyNumber"`), so headers are matched
//! after trimming. Resolution happens once per file; rows are then read
//! by index.

use strum::{EnumCount, IntoEnumIterator};
use strum_macros::{EnumCount as EnumCountMacro, EnumIter, IntoStaticStr};

use crate::SourceError;

/// A column of the basic company data extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, EnumIter, EnumCountMacro)]
pub enum SourceColumn {
    #[strum(serialize = "CompanyName")]
    CompanyName,
    #[strum(serialize = "CompanyNumber")]
    CompanyNumber,
    #[strum(serialize = "RegAddress.CareOf")]
    CareOf,
    #[strum(serialize = "RegAddress.POBox")]
    PoBox,
    #[strum(serialize = "RegAddress.AddressLine1")]
    AddressLine1,
    #[strum(serialize = "RegAddress.AddressLine2")]
    AddressLine2,
    #[strum(serialize = "RegAddress.PostTown")]
    PostTown,
    #[strum(serialize = "RegAddress.County")]
    County,
    #[strum(serialize = "RegAddress.Country")]
    Country,
    #[strum(serialize = "RegAddress.PostCode")]
    PostCode,
    #[strum(serialize = "CompanyCategory")]
    CompanyCategory,
    #[strum(serialize = "CompanyStatus")]
    CompanyStatus,
    #[strum(serialize = "CountryOfOrigin")]
    CountryOfOrigin,
    #[strum(serialize = "DissolutionDate")]
    DissolutionDate,
    #[strum(serialize = "IncorporationDate")]
    IncorporationDate,
    #[strum(serialize = "Accounts.AccountRefDay")]
    AccountRefDay,
    #[strum(serialize = "Accounts.AccountRefMonth")]
    AccountRefMonth,
    #[strum(serialize = "Accounts.NextDueDate")]
    AccountsNextDueDate,
    #[strum(serialize = "Accounts.LastMadeUpDate")]
    AccountsLastMadeUpDate,
    #[strum(serialize = "Accounts.AccountCategory")]
    AccountCategory,
    #[strum(serialize = "SICCode.SicText_1")]
    SicText1,
    #[strum(serialize = "SICCode.SicText_2")]
    SicText2,
    #[strum(serialize = "SICCode.SicText_3")]
    SicText3,
    #[strum(serialize = "SICCode.SicText_4")]
    SicText4,
}

impl SourceColumn {
    /// Header name as published in the extract.
    #[must_use]
    pub fn header(self) -> &'static str {
        self.into()
    }

    const fn slot(self) -> usize {
        self as usize
    }
}

/// Maps each known [`SourceColumn`] to its position in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderMap {
    positions: [Option<usize>; SourceColumn::COUNT],
    width: usize,
}

impl HeaderMap {
    /// Resolves column positions from a header row.
    ///
    /// Unknown columns are ignored. Known columns that are absent resolve
    /// to `None` and decode as missing values.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingColumn`] if the natural key column is
    /// not present.
    pub fn from_headers<'a, I>(headers: I) -> Result<Self, SourceError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut positions = [None; SourceColumn::COUNT];
        let mut width = 0;

        for (idx, raw) in headers.into_iter().enumerate() {
            width = idx + 1;
            let name = raw.trim().trim_start_matches('\u{feff}').trim();
            if let Some(column) = SourceColumn::iter().find(|c| c.header() == name) {
                // First occurrence wins.
                if positions[column.slot()].is_none() {
                    positions[column.slot()] = Some(idx);
                }
            }
        }

        if positions[SourceColumn::CompanyNumber.slot()].is_none() {
            return Err(SourceError::MissingColumn {
                column: SourceColumn::CompanyNumber.header().to_string(),
            });
        }

        let missing: Vec<&str> = SourceColumn::iter()
            .filter(|c| positions[c.slot()].is_none())
            .map(SourceColumn::header)
            .collect();
        if !missing.is_empty() {
            log::warn!(
                "Source file is missing {} known column(s), they will load as NULL: {}",
                missing.len(),
                missing.join(", ")
            );
        }

        Ok(Self { positions, width })
    }

    /// Position of `column` in each row, if present.
    #[must_use]
    pub const fn position(&self, column: SourceColumn) -> Option<usize> {
        self.positions[column.slot()]
    }

    /// Number of fields in the header row.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_headers_with_leading_spaces() {
        let map = HeaderMap::from_headers([
            "CompanyName",
            " CompanyNumber",
            " RegAddress.PostCode",
            " CompanyStatus ",
        ])
        .unwrap();

        assert_eq!(map.width(), 4);
        assert_eq!(map.position(SourceColumn::CompanyName), Some(0));
        assert_eq!(map.position(SourceColumn::CompanyNumber), Some(1));
        assert_eq!(map.position(SourceColumn::PostCode), Some(2));
        assert_eq!(map.position(SourceColumn::CompanyStatus), Some(3));
        assert_eq!(map.position(SourceColumn::SicText4), None);
    }

    #[test]
    fn strips_byte_order_mark() {
        let map = HeaderMap::from_headers(["\u{feff}CompanyNumber"]).unwrap();
        assert_eq!(map.position(SourceColumn::CompanyNumber), Some(0));
    }

    #[test]
    fn requires_natural_key_column() {
        let err = HeaderMap::from_headers(["CompanyName", "CompanyStatus"]).unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn { column } if column == "CompanyNumber"));
    }

    #[test]
    fn every_column_has_a_distinct_header() {
        let mut names: Vec<&str> = SourceColumn::iter().map(SourceColumn::header).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SourceColumn::COUNT);
    }

    #[test]
    fn header_names_match_the_extract() {
        assert_eq!(SourceColumn::CompanyNumber.header(), "CompanyNumber");
        assert_eq!(SourceColumn::PoBox.header(), "RegAddress.POBox");
        assert_eq!(SourceColumn::SicText4.header(), "SICCode.SicText_4");
    }
}
