//! A small Rust client for the NREL National Solar Radiation Database (NSRDB) API.
//!
//! This crate implements a request-and-parse flow:
//! build a query for a point or an area, fetch the CSV (or zipped CSV) the API
//! returns, and parse it into a [`Table`] with typed columns.
//!
//! ## Quick start
//! - Put your credentials in `~/.nsrdb` (`API_KEY=...` and `EMAIL=...`, plus
//!   optional `FULL_NAME`, `AFFILIATION`, `REASON`, `MAILING_LIST`), or pass
//!   them per call through [`CredentialOverrides`].
//! - Call one of the presets on [`Client`], e.g.
//!   [`Client::typical_meteorological_year`].
//!
//! ```no_run
//! use nsrdb::{Client, RequestOptions};
//!
//! fn main() -> nsrdb::Result<()> {
//!     let client = Client::new()?;
//!     let retrieval = client.typical_meteorological_year(
//!         (-93.1567288182409, 45.15793882400205),
//!         RequestOptions::default().with_names(["tmy-2020"]),
//!     )?;
//!     if let Some(table) = retrieval.table() {
//!         println!("{} hourly rows", table.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Areas, multiple sites and multi-year requests are answered with a queued
//! zip file instead: see [`Client::area_aggregate`] and [`Client::download`].

#![forbid(unsafe_code)]

mod client;
mod config;
mod error;
mod geometry;
mod query;
mod request;
mod response;
mod submission;
mod table;
mod util;

pub use client::{Client, ClientConfig, Retrieval};
pub use config::{CREDENTIAL_FILE_NAME, CredentialOverrides, CredentialSource, Credentials};
pub use error::{NsrdbError, Result};
pub use geometry::{Geometry, MultiPoint, Polygon, ToWkt};
pub use query::{
    DEFAULT_DATA_QUERY_URL, DataQueryKind, DataQueryOptions, DataQueryResponse,
    DatasetAvailability, DatasetLink, prepare_data_query,
};
pub use request::{
    DEFAULT_BASE_URL, Dataset, PreparedRequest, RequestOptions, ResponseFormat, prepare,
};
pub use response::{
    CSV_ENTRY_SUFFIX, METADATA_LINES, MaterializeOptions, PayloadKind, materialize,
    materialize_archive_entries, parse_csv, single_entry,
};
pub use submission::{Submission, SubmissionOutputs};
pub use table::{Column, ColumnKind, INTEGER_COLUMNS, Table, Value};
