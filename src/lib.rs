//! A client for the [Metabase](https://www.metabase.com) API.
//!
//! Log in, pick a database, and run native (SQL) queries, getting results
//! back either as the raw JSON response or as an Arrow [RecordBatch].
//!
//! ```no_run
//! use metabasic::{Client, select::Prompt};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut client = Client::new("https://metabase.example.com")?;
//! client
//!     .authenticate("ada@example.com", "hunter2")?
//!     .select_database(Prompt::stdio())?;
//!
//! let batch = client.get_dataframe("SELECT id, total FROM orders LIMIT 10")?;
//! println!("{} rows", batch.num_rows());
//! # Ok(())
//! # }
//! ```
//!
//! # HTTP Requests and Responses
//!
//! The request types in [session], [database] and [dataset] are plain
//! descriptions of API calls and work with any HTTP client built on the
//! [`http`] crate. Use [`ApiRequest::into_request`] to create a request,
//! [`check_status`] to check it against [`ApiRequest::expected_status`], and
//! [`ApiResponse::from_response`] to parse the response.
//!
//! ```no_run
//! use metabasic::{ApiRequest, ApiResponse, Connection, check_status, database::ListDatabases};
//!
//! # fn main() -> anyhow::Result<()> {
//! let conn = Connection::new("https://metabase.example.com".parse()?).with_session("token");
//!
//! let req = ListDatabases;
//! let expected = req.expected_status();
//! let resp = ureq::run(req.into_request(&conn)?)?;
//! let resp = check_status(resp.map(ureq::Body::into_reader), expected)?;
//!
//! for db in <ListDatabases as ApiRequest>::Response::from_response(resp)? {
//!     println!("{}: {}", db.id, db.name);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [RecordBatch]: arrow::array::RecordBatch

#![warn(
    anonymous_parameters,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    single_use_lifetimes,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_qualifications,
    variant_size_differences
)]

mod api;
mod client;
mod config;
pub mod frame;
pub mod select;
pub mod transport;

pub use api::database::DatabaseId;
pub use api::*;
pub use client::{Client, Connection, Error};
pub use config::{Error as ConfigError, Profile};
pub use select::{DatabaseSelector, SelectError};
