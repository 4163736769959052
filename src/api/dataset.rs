//! API operations for running queries.

use serde::{Deserialize, Serialize};

use crate::api::{ApiRequest, BodyEncoding, JsonResponse, database::DatabaseId};

/// Run a native (SQL) query against a database.
///
/// The query document is sent JSON-encoded inside the `query` field of a
/// form body, and the server answers with `202 Accepted` once the query has
/// run. The response is the full result envelope, returned untouched; see
/// [QueryResults] for a typed view of it.
#[derive(Debug, Clone)]
pub struct RunNativeQuery<'a> {
    /// The database to run the query against.
    pub database: DatabaseId,
    /// The query text, passed to the database as-is.
    pub query: &'a str,
}

#[derive(Debug, Serialize)]
struct DatasetQuery<'a> {
    database: DatabaseId,
    native: NativeQuery<'a>,
    r#type: &'static str,
}

#[derive(Debug, Serialize)]
struct NativeQuery<'a> {
    query: &'a str,
}

impl ApiRequest for RunNativeQuery<'_> {
    type Response = serde_json::Value;

    fn path(&self) -> String {
        "/api/dataset".to_string()
    }

    fn method(&self) -> http::Method {
        http::Method::POST
    }

    fn expected_status(&self) -> http::StatusCode {
        http::StatusCode::ACCEPTED
    }

    fn body(&self) -> Option<impl Serialize> {
        Some(DatasetQuery {
            database: self.database,
            native: NativeQuery { query: self.query },
            r#type: "native",
        })
    }

    fn body_encoding(&self) -> BodyEncoding {
        BodyEncoding::JsonInFormField("query")
    }
}

/// The result envelope of a query, as returned by `POST /api/dataset`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueryResults {
    /// The result set.
    pub data: ResultData,
    /// The number of rows returned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    /// The query status, usually `completed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl JsonResponse for QueryResults {}

impl QueryResults {
    /// Decode the typed envelope from a raw response body.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}

/// The rows and column metadata of a result set.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ResultData {
    /// The rows. Each row is either a list of values (positional, matching
    /// `cols`) or an object keyed by column name.
    pub rows: Vec<serde_json::Value>,
    /// Column metadata, in row order. May be empty.
    #[serde(default)]
    pub cols: Vec<Column>,
}

/// Metadata for one column of a result set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Column {
    /// The column name.
    pub name: String,
    /// The human-friendly column name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// The Metabase base type, e.g. `type/Integer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_type: Option<String>,
}
