//! SQL for the `companies` table.
//!
//! Every value reaches the database as a bound `$n` parameter. Statement
//! text is built only from the fixed column list and placeholder indexes.

use std::fmt::Write as _;

use chrono::NaiveDate;
use company_registry_company_models::{
    COMPANY_COLUMNS, CompanyRecord, FIELDS_PER_RECORD, NATURAL_KEY_COLUMN, StatusCount,
};
use company_registry_ingest_models::ConflictPolicy;
use moosicbox_json_utils::database::ToValue as _;
use switchy_database::{Database, DatabaseValue, Row};

use crate::{DbError, PG_MAX_PARAMS};

/// Target table name.
pub const COMPANIES_TABLE: &str = "companies";

/// Secondary indexes dropped before a fresh load and rebuilt afterwards,
/// as `(index name, column)`. The unique constraint on `company_number`
/// is not in this list: `ON CONFLICT` needs it during the load.
pub const SECONDARY_INDEXES: &[(&str, &str)] = &[
    ("idx_companies_name", "company_name"),
    ("idx_companies_status", "company_status"),
    ("idx_companies_postcode", "reg_address_postcode"),
    ("idx_companies_incorporation_date", "incorporation_date"),
];

/// Per-record column casts. Dates travel as ISO text and are cast on the
/// server so the driver never has to guess a parameter type.
fn placeholder_cast(column: &str) -> &'static str {
    match column {
        "dissolution_date"
        | "incorporation_date"
        | "accounts_next_due_date"
        | "accounts_last_made_up_date" => "::text::date",
        _ => "",
    }
}

/// Columns overwritten by the merge policy: everything except the key.
fn merge_assignments() -> String {
    let mut sql = String::new();
    for column in COMPANY_COLUMNS
        .iter()
        .filter(|c| **c != NATURAL_KEY_COLUMN)
    {
        write!(sql, "{column} = EXCLUDED.{column}, ").unwrap();
    }
    sql.push_str("updated_at = NOW()");
    sql
}

/// Builds the multi-row upsert statement for `rows` records.
///
/// `RETURNING (xmax = 0)` is `true` for freshly inserted rows and `false`
/// for rows the merge policy updated; rows skipped by `DO NOTHING` return
/// nothing.
#[must_use]
pub fn build_upsert_sql(rows: usize, policy: ConflictPolicy) -> String {
    let mut sql = format!(
        "INSERT INTO {COMPANIES_TABLE} ({}) VALUES ",
        COMPANY_COLUMNS.join(", ")
    );

    let mut idx = 1usize;
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (i, column) in COMPANY_COLUMNS.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            write!(sql, "${idx}{}", placeholder_cast(column)).unwrap();
            idx += 1;
        }
        sql.push(')');
    }

    match policy {
        ConflictPolicy::Skip => sql.push_str(" ON CONFLICT (company_number) DO NOTHING"),
        ConflictPolicy::Merge => {
            write!(
                sql,
                " ON CONFLICT (company_number) DO UPDATE SET {}",
                merge_assignments()
            )
            .unwrap();
        }
    }

    sql.push_str(" RETURNING (xmax = 0) AS inserted");
    sql
}

fn text(value: Option<&String>) -> DatabaseValue {
    value.map_or(DatabaseValue::Null, |v| DatabaseValue::String(v.clone()))
}

/// Appends one record's parameters in [`COMPANY_COLUMNS`] order.
pub fn bind_record(record: &CompanyRecord, params: &mut Vec<DatabaseValue>) {
    let date = |d: Option<NaiveDate>| {
        d.map_or(DatabaseValue::Null, |d| DatabaseValue::String(d.to_string()))
    };
    let int = |v: Option<i32>| v.map_or(DatabaseValue::Null, DatabaseValue::Int32);

    let address = &record.address;
    params.push(text(record.company_name.as_ref()));
    params.push(DatabaseValue::String(record.company_number.clone()));
    params.push(text(address.care_of.as_ref()));
    params.push(text(address.po_box.as_ref()));
    params.push(text(address.line1.as_ref()));
    params.push(text(address.line2.as_ref()));
    params.push(text(address.post_town.as_ref()));
    params.push(text(address.county.as_ref()));
    params.push(text(address.country.as_ref()));
    params.push(text(address.postcode.as_ref()));
    params.push(text(record.company_category.as_ref()));
    params.push(text(record.company_status.as_ref()));
    params.push(text(record.country_of_origin.as_ref()));
    params.push(date(record.dissolution_date));
    params.push(date(record.incorporation_date));
    params.push(int(record.accounts.ref_day));
    params.push(int(record.accounts.ref_month));
    params.push(date(record.accounts.next_due_date));
    params.push(date(record.accounts.last_made_up_date));
    params.push(text(record.accounts.category.as_ref()));
    for code in &record.sic_codes {
        params.push(text(code.as_ref()));
    }
}

/// Counts produced by one upsert statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    /// Rows created.
    pub inserted: u64,
    /// Rows overwritten by the merge policy.
    pub updated: u64,
}

/// Upserts a batch of companies in a single statement.
///
/// With [`ConflictPolicy::Merge`] the batch must not contain the same
/// company number twice; `PostgreSQL` refuses to update one row twice in a
/// single statement.
///
/// # Errors
///
/// * [`DbError::ParameterLimit`] if the batch would bind more than
///   [`PG_MAX_PARAMS`] parameters.
/// * [`DbError::Database`] if the statement fails.
pub async fn upsert_companies(
    db: &dyn Database,
    records: &[CompanyRecord],
    policy: ConflictPolicy,
) -> Result<UpsertCounts, DbError> {
    if records.is_empty() {
        return Ok(UpsertCounts::default());
    }

    let required = records.len() * FIELDS_PER_RECORD;
    if required > PG_MAX_PARAMS {
        return Err(DbError::ParameterLimit {
            required,
            limit: PG_MAX_PARAMS,
        });
    }

    let sql = build_upsert_sql(records.len(), policy);
    let mut params: Vec<DatabaseValue> = Vec::with_capacity(required);
    for record in records {
        bind_record(record, &mut params);
    }

    let rows = db.query_raw_params(&sql, &params).await?;

    let mut counts = UpsertCounts::default();
    for row in &rows {
        let inserted: bool = row.to_value("inserted").map_err(|e| DbError::Conversion {
            message: format!("Failed to read upsert result: {e}"),
        })?;
        if inserted {
            counts.inserted += 1;
        } else {
            counts.updated += 1;
        }
    }

    Ok(counts)
}

/// Empties the table and resets its identity sequence.
///
/// # Errors
///
/// Returns [`DbError`] if the statement fails.
pub async fn truncate_companies(db: &dyn Database) -> Result<(), DbError> {
    db.exec_raw(&format!(
        "TRUNCATE TABLE {COMPANIES_TABLE} RESTART IDENTITY"
    ))
    .await?;
    Ok(())
}

/// Drops every index in [`SECONDARY_INDEXES`].
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails.
pub async fn drop_secondary_indexes(db: &dyn Database) -> Result<(), DbError> {
    for (name, _) in SECONDARY_INDEXES {
        db.exec_raw(&format!("DROP INDEX IF EXISTS {name}")).await?;
        log::debug!("Dropped index {name}");
    }
    Ok(())
}

/// Creates every index in [`SECONDARY_INDEXES`] that does not exist.
///
/// # Errors
///
/// Returns [`DbError`] if a statement fails.
pub async fn create_secondary_indexes(db: &dyn Database) -> Result<(), DbError> {
    for (name, column) in SECONDARY_INDEXES {
        log::info!("Building index {name} on {COMPANIES_TABLE}({column})...");
        db.exec_raw(&format!(
            "CREATE INDEX IF NOT EXISTS {name} ON {COMPANIES_TABLE} ({column})"
        ))
        .await?;
    }
    Ok(())
}

/// Refreshes planner statistics for the table.
///
/// # Errors
///
/// Returns [`DbError`] if the statement fails.
pub async fn analyze_companies(db: &dyn Database) -> Result<(), DbError> {
    db.exec_raw(&format!("ANALYZE {COMPANIES_TABLE}")).await?;
    Ok(())
}

/// Returns the number of rows in the table.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn count_companies(db: &dyn Database) -> Result<u64, DbError> {
    let rows = db
        .query_raw_params(
            &format!("SELECT COUNT(*) AS cnt FROM {COMPANIES_TABLE}"),
            &[],
        )
        .await?;

    row_count(&rows)
}

fn row_count(rows: &[Row]) -> Result<u64, DbError> {
    let row = rows.first().ok_or_else(|| DbError::Conversion {
        message: "COUNT(*) returned no rows".to_string(),
    })?;
    let n: i64 = row.to_value("cnt").map_err(|e| DbError::Conversion {
        message: format!("Failed to read row count: {e}"),
    })?;

    u64::try_from(n).map_err(|e| DbError::Conversion {
        message: format!("Negative row count {n}: {e}"),
    })
}

/// Returns row counts per `company_status`, largest first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub async fn status_breakdown(db: &dyn Database) -> Result<Vec<StatusCount>, DbError> {
    let rows = db
        .query_raw_params(
            &format!(
                "SELECT company_status, COUNT(*) AS cnt FROM {COMPANIES_TABLE}
                 GROUP BY company_status
                 ORDER BY cnt DESC, company_status"
            ),
            &[],
        )
        .await?;

    status_counts(&rows)
}

fn status_counts(rows: &[Row]) -> Result<Vec<StatusCount>, DbError> {
    let mut counts = Vec::with_capacity(rows.len());
    for row in rows {
        let cnt: i64 = row.to_value("cnt").map_err(|e| DbError::Conversion {
            message: format!("Failed to read status count: {e}"),
        })?;
        let status: Option<String> = row
            .to_value("company_status")
            .map_err(|e| DbError::Conversion {
                message: format!("Failed to read company status: {e}"),
            })?;
        counts.push(StatusCount {
            status,
            count: u64::try_from(cnt).map_err(|e| DbError::Conversion {
                message: format!("Negative status count {cnt}: {e}"),
            })?,
        });
    }

    Ok(counts)
}
