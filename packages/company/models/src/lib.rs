#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Company registry record types.
//!
//! A [`CompanyRecord`] is one decoded row of the Companies House basic
//! company data extract. Every field except the company number is
//! optional: an empty cell in the source is represented as `None`, never
//! as an empty string, so the database can tell "no data" apart from an
//! empty value.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Target table columns in bind order.
///
/// Statement builders emit one placeholder per entry for every record, so
/// the length of this list is the number of bound parameters a single
/// record costs.
pub const COMPANY_COLUMNS: [&str; FIELDS_PER_RECORD] = [
    "company_name",
    "company_number",
    "reg_address_care_of",
    "reg_address_po_box",
    "reg_address_line1",
    "reg_address_line2",
    "reg_address_post_town",
    "reg_address_county",
    "reg_address_country",
    "reg_address_postcode",
    "company_category",
    "company_status",
    "country_of_origin",
    "dissolution_date",
    "incorporation_date",
    "accounts_ref_day",
    "accounts_ref_month",
    "accounts_next_due_date",
    "accounts_last_made_up_date",
    "accounts_category",
    "sic_code_1",
    "sic_code_2",
    "sic_code_3",
    "sic_code_4",
];

/// Number of bound parameters per record.
pub const FIELDS_PER_RECORD: usize = 24;

/// Name of the natural key column.
pub const NATURAL_KEY_COLUMN: &str = "company_number";

/// Width of the `company_number` column. Registered numbers are eight
/// characters, zero-padded (`01234567`) or prefixed (`SC000001`).
pub const MAX_COMPANY_NUMBER_LEN: usize = 8;

/// Registered office address. All lines are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredAddress {
    /// "Care of" name.
    pub care_of: Option<String>,
    /// PO box number.
    pub po_box: Option<String>,
    /// First address line.
    pub line1: Option<String>,
    /// Second address line.
    pub line2: Option<String>,
    /// Post town.
    pub post_town: Option<String>,
    /// County.
    pub county: Option<String>,
    /// Country.
    pub country: Option<String>,
    /// Postcode.
    pub postcode: Option<String>,
}

/// Accounting reference data filed with the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountsInfo {
    /// Day of month of the accounting reference date.
    pub ref_day: Option<i32>,
    /// Month of the accounting reference date.
    pub ref_month: Option<i32>,
    /// When the next accounts are due.
    pub next_due_date: Option<NaiveDate>,
    /// The period end of the last filed accounts.
    pub last_made_up_date: Option<NaiveDate>,
    /// Filing category (e.g. "MICRO ENTITY", "DORMANT").
    pub category: Option<String>,
}

/// One company from the registry extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyRecord {
    /// Registration number, the natural key (e.g. `"00000006"`, `"SC123456"`).
    pub company_number: String,
    /// Registered company name.
    pub company_name: Option<String>,
    /// Registry status (e.g. "Active", "Dissolved", "Liquidation").
    pub company_status: Option<String>,
    /// Company category (e.g. "Private Limited Company").
    pub company_category: Option<String>,
    /// Registered office address.
    pub address: RegisteredAddress,
    /// Country of origin.
    pub country_of_origin: Option<String>,
    /// Date the company was dissolved.
    pub dissolution_date: Option<NaiveDate>,
    /// Date the company was incorporated.
    pub incorporation_date: Option<NaiveDate>,
    /// Accounts filing information.
    pub accounts: AccountsInfo,
    /// Up to four SIC classification codes, in source order.
    pub sic_codes: [Option<String>; 4],
}

impl CompanyRecord {
    /// Creates a record with only the natural key set.
    #[must_use]
    pub fn new(company_number: impl Into<String>) -> Self {
        Self {
            company_number: company_number.into(),
            company_name: None,
            company_status: None,
            company_category: None,
            address: RegisteredAddress::default(),
            country_of_origin: None,
            dissolution_date: None,
            incorporation_date: None,
            accounts: AccountsInfo::default(),
            sic_codes: [None, None, None, None],
        }
    }

    /// Sets the company status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.company_status = Some(status.into());
        self
    }

    /// Sets the company name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.company_name = Some(name.into());
        self
    }
}

/// Row count for one status value, used for post-import summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    /// Status value, `None` for rows with no status.
    pub status: Option<String>,
    /// Number of rows with this status.
    pub count: u64,
}
