#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bulk ingestion of the Companies House basic company data extract into
//! the `companies` table.
//!
//! [`controller::run_ingestion`] streams the CSV through the decoder,
//! groups records with [`accumulator::BatchAccumulator`], and writes each
//! batch through [`writer::UpsertWriter`] before reading further.

pub mod accumulator;
pub mod config;
pub mod controller;
pub mod error;
pub mod interactive;
pub mod report;
pub mod run;
pub mod writer;

pub use controller::{cancel_on_interrupt, run_ingestion, run_ingestion_from_reader};
pub use error::IngestError;
