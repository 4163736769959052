//! API operations concerning the databases connected to Metabase.

use std::{fmt, io::Read};

use serde::{Deserialize, Serialize};

use crate::api::{ApiError, ApiRequest, ApiResponse};

/// The numeric id Metabase assigns to a connected database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DatabaseId(pub u64);

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<u64> for DatabaseId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A database connected to Metabase.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Database {
    /// The database id.
    pub id: DatabaseId,
    /// The display name of the database.
    pub name: String,
    /// The driver, e.g. `postgres` or `h2`.
    #[serde(default)]
    pub engine: Option<String>,
}

/// List the databases visible to the current session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListDatabases;

impl ApiRequest for ListDatabases {
    type Response = Vec<Database>;

    fn path(&self) -> String {
        "/api/database".to_string()
    }
}

// Older servers answer with a bare list, newer ones wrap it.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawDatabaseList {
    Bare(Vec<Database>),
    Wrapped { data: Vec<Database> },
}

impl ApiResponse for Vec<Database> {
    fn from_response_parts(
        parts: http::response::Parts,
        body: impl Read,
    ) -> Result<Self, ApiError> {
        let raw: RawDatabaseList = serde_json::from_reader(body).map_err(|e| {
            tracing::error!("Failed to parse API response: {e:#?}");
            ApiError::InvalidResponse(parts.status)
        })?;

        match raw {
            RawDatabaseList::Bare(dbs) | RawDatabaseList::Wrapped { data: dbs } => Ok(dbs),
        }
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;
    use crate::Connection;

    fn parse(body: &str) -> Result<Vec<Database>, ApiError> {
        let resp = http::Response::builder()
            .status(200)
            .body(body.as_bytes())
            .unwrap();
        Vec::<Database>::from_response(resp)
    }

    #[test]
    fn bare_list() -> anyhow::Result<()> {
        let dbs = parse(r#"[{"id": 1, "name": "foo", "engine": "h2"}, {"id": 2, "name": "bar"}]"#)?;

        assert_eq!(dbs.len(), 2);
        assert_eq!(dbs[0].id, DatabaseId(1));
        assert_eq!(dbs[0].engine.as_deref(), Some("h2"));
        assert_eq!(dbs[1].name, "bar");
        assert_eq!(dbs[1].engine, None);

        Ok(())
    }

    #[test]
    fn wrapped_list() -> anyhow::Result<()> {
        let dbs = parse(r#"{"data": [{"id": 3, "name": "Sample Database"}], "total": 1}"#)?;

        assert_eq!(dbs.len(), 1);
        assert_eq!(dbs[0].id, DatabaseId(3));

        Ok(())
    }

    #[test]
    fn not_a_list() {
        assert_matches!(parse(r#"{"id": 1}"#), Err(ApiError::InvalidResponse(_)));
    }

    #[test]
    fn list_request_carries_session() -> anyhow::Result<()> {
        let conn = Connection::new("https://metabase.example.com".parse()?).with_session("s3cr3t");

        let req = ListDatabases.into_request(&conn)?;
        assert_eq!(req.method(), http::Method::GET);
        assert_eq!(req.uri(), "https://metabase.example.com/api/database");
        assert_eq!(req.headers()[crate::api::SESSION_HEADER], "s3cr3t");
        assert!(req.body().is_empty());

        Ok(())
    }
}
