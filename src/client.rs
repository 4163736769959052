use std::{collections::BTreeMap, fmt, io::Cursor};

use arrow::{array::RecordBatch, error::ArrowError};
use tracing::{debug, error, info};

use crate::{
    ApiError, ApiRequest, ApiResponse, DatabaseSelector, Profile, SelectError,
    api::{
        check_status,
        database::{Database, DatabaseId, ListDatabases},
        dataset::{QueryResults, RunNativeQuery},
        session::CreateSession,
    },
    config::make_ua,
    frame,
    transport::{self, Transport, TransportError},
};

/// An error returned by a [Client] operation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The operation needs a session token, but the client has not
    /// authenticated.
    #[error("Not authenticated")]
    NotAuthenticated,
    /// The operation needs a database, but none has been selected.
    #[error("No database selected")]
    NoDatabase,
    /// The API answered with an unexpected status or an unreadable body.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// The request never got an answer.
    #[error("Request failed")]
    Transport(#[source] TransportError),
    /// The request could not be built.
    #[error("Invalid request")]
    Request(#[from] http::Error),
    /// The domain is not a valid URL.
    #[error("Invalid domain")]
    InvalidDomain(#[from] http::uri::InvalidUri),
    /// Choosing a database failed.
    #[error(transparent)]
    Selection(#[from] SelectError),
    /// The selector chose a name that isn't in the list.
    #[error("Unknown database: {0:?}")]
    UnknownDatabase(String),
    /// The result rows could not be turned into a record batch.
    #[error("Failed to build record batch")]
    Frame(#[from] ArrowError),
}

/// The connection state of a [Client]: where requests go, and the session
/// and database they run with.
#[derive(Clone)]
pub struct Connection {
    /// The base URL of the Metabase instance.
    pub domain: http::Uri,
    /// The session token, set by logging in.
    pub session_token: Option<String>,
    /// The database that queries run against.
    pub database_id: Option<DatabaseId>,
    /// The user-agent sent on every request.
    pub user_agent: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("domain", &self.domain)
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "********"),
            )
            .field("database_id", &self.database_id)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Connection {
    /// A connection to the given domain, with no session and no database.
    pub fn new(domain: http::Uri) -> Self {
        Self {
            domain,
            session_token: None,
            database_id: None,
            user_agent: make_ua(None),
        }
    }

    /// Use an existing session token.
    pub fn with_session(self, token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
            ..self
        }
    }

    /// Run queries against the given database.
    pub fn with_database(self, id: DatabaseId) -> Self {
        Self {
            database_id: Some(id),
            ..self
        }
    }
}

impl From<&Profile> for Connection {
    fn from(profile: &Profile) -> Self {
        Self {
            domain: profile.domain.clone(),
            session_token: profile.session_token.clone(),
            database_id: profile.database_id,
            user_agent: profile.user_agent.clone(),
        }
    }
}

/// A blocking client for the Metabase API.
///
/// The client moves through three states: unauthenticated, authenticated
/// (after [Client::authenticate]) and ready to query (after
/// [Client::select_database]). A session token or database can also be
/// supplied up front with [Client::with_session] and
/// [Client::with_database].
pub struct Client<T = ureq::Agent> {
    conn: Connection,
    transport: T,
}

impl<T> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").field("conn", &self.conn).finish()
    }
}

impl Client {
    /// Create a client for the Metabase instance at `domain`. If the domain
    /// has no scheme, `https` is assumed.
    pub fn new(domain: &str) -> Result<Self, Error> {
        let domain = parse_domain(domain)?;
        Ok(Self::with_transport(domain, transport::agent(None)))
    }

    /// Create a client from a resolved [Profile], including any stored
    /// session token and database.
    pub fn from_profile(profile: &Profile) -> Self {
        Self::from_connection(profile.into(), transport::agent(None))
    }
}

impl<T: Transport> Client<T> {
    /// Create a client that sends requests over the given transport.
    pub fn with_transport(domain: http::Uri, transport: T) -> Self {
        Self::from_connection(Connection::new(domain), transport)
    }

    /// Create a client from existing connection state.
    pub fn from_connection(conn: Connection, transport: T) -> Self {
        Self { conn, transport }
    }

    /// Use an existing session token instead of logging in.
    pub fn with_session(self, token: impl Into<String>) -> Self {
        Self {
            conn: self.conn.with_session(token),
            ..self
        }
    }

    /// Run queries against the given database.
    pub fn with_database(self, id: impl Into<DatabaseId>) -> Self {
        Self {
            conn: self.conn.with_database(id.into()),
            ..self
        }
    }

    /// The base URL of the Metabase instance.
    pub fn domain(&self) -> &http::Uri {
        &self.conn.domain
    }

    /// The current session token, if authenticated.
    pub fn session_token(&self) -> Option<&str> {
        self.conn.session_token.as_deref()
    }

    /// The selected database, if any.
    pub fn database_id(&self) -> Option<DatabaseId> {
        self.conn.database_id
    }

    /// The full connection state.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Log in with an email and password and keep the session token.
    pub fn authenticate(&mut self, email: &str, password: &str) -> Result<&mut Self, Error> {
        let session = self.roundtrip(CreateSession {
            username: email,
            password,
        })?;

        info!(domain = %self.conn.domain, "authenticated");
        self.conn.session_token = Some(session.id);
        Ok(self)
    }

    /// List the databases visible to the current session.
    pub fn list_databases(&self) -> Result<Vec<Database>, Error> {
        self.roundtrip(ListDatabases)
    }

    /// Fetch the list of databases, let `selector` pick one by name, and run
    /// later queries against it. If two databases share a name, the one
    /// listed last wins.
    pub fn select_database(
        &mut self,
        mut selector: impl DatabaseSelector,
    ) -> Result<&mut Self, Error> {
        let by_name: BTreeMap<String, DatabaseId> = self
            .list_databases()?
            .into_iter()
            .map(|db| (db.name, db.id))
            .collect();

        let name = selector.select(&by_name)?;
        let Some(&id) = by_name.get(&name) else {
            return Err(Error::UnknownDatabase(name));
        };

        debug!(name = %name, %id, "selected database");
        self.conn.database_id = Some(id);
        Ok(self)
    }

    /// Run a native query against the selected database and return the
    /// decoded response body as-is.
    pub fn query(&self, query: &str) -> Result<serde_json::Value, Error> {
        self.require_session()?;
        let Some(database) = self.conn.database_id else {
            return Err(Error::NoDatabase);
        };

        self.roundtrip(RunNativeQuery { database, query })
    }

    /// Run a native query and convert the result rows into a
    /// [RecordBatch]. See [frame::to_record_batch] for how columns are
    /// named and typed.
    pub fn get_dataframe(&self, query: &str) -> Result<RecordBatch, Error> {
        let value = self.query(query)?;
        let results = QueryResults::from_value(value).map_err(|e| {
            error!("Query response is not a result set: {e}");
            ApiError::InvalidResponse(http::StatusCode::ACCEPTED)
        })?;

        Ok(frame::to_record_batch(&results)?)
    }

    /// Send any API request with this client's connection state, checking
    /// the response status and decoding the body.
    pub fn roundtrip<R: ApiRequest>(&self, req: R) -> Result<R::Response, Error> {
        if req.requires_session() {
            self.require_session()?;
        }

        let expected = req.expected_status();
        let req = req.into_request(&self.conn)?;
        debug!(method = %req.method(), uri = %req.uri(), "sending request");

        let resp = self.transport.send(req).map_err(Error::Transport)?;
        debug!(status = %resp.status(), "received response");

        let resp = check_status(resp.map(Cursor::new), expected)?;
        Ok(R::Response::from_response(resp)?)
    }

    fn require_session(&self) -> Result<(), Error> {
        if self.conn.session_token.is_none() {
            return Err(Error::NotAuthenticated);
        }

        Ok(())
    }
}

/// Parse a domain, assuming `https` if no scheme is given.
pub(crate) fn parse_domain(s: &str) -> Result<http::Uri, http::uri::InvalidUri> {
    let s = s.trim();
    if s.contains("://") {
        s.parse()
    } else {
        format!("https://{s}").parse()
    }
}

#[cfg(test)]
mod test {
    use arrow::array::{Array, Int64Array, StringArray};
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::api::{
        SESSION_HEADER,
        testutil::{MockTransport, UnreachableTransport},
    };

    fn mock_client(transport: MockTransport) -> Client<MockTransport> {
        Client::with_transport("https://metabase.example.com".parse().unwrap(), transport)
    }

    fn configured(transport: MockTransport) -> Client<MockTransport> {
        mock_client(transport)
            .with_session("123abc")
            .with_database(DatabaseId(123))
    }

    fn pick(name: &'static str) -> impl DatabaseSelector {
        move |_: &BTreeMap<String, DatabaseId>| -> Result<String, SelectError> {
            Ok(name.to_string())
        }
    }

    #[test]
    fn domain_without_scheme() -> anyhow::Result<()> {
        let client = Client::new("metabase.example.com")?;
        assert_eq!(client.domain(), "https://metabase.example.com/");

        let client = Client::new("http://localhost:3000")?;
        assert_eq!(client.domain().port_u16(), Some(3000));

        Ok(())
    }

    #[test]
    fn authenticate_success() -> anyhow::Result<()> {
        let transport = MockTransport::new().respond_json(200, json!({"id": "abc123"}));
        let mut client = mock_client(transport);

        let chained = client.authenticate("email", "password")?;
        assert_eq!(chained.session_token(), Some("abc123"));
        assert_eq!(client.session_token(), Some("abc123"));

        let reqs = client.transport.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].uri().path(), "/api/session");
        assert_eq!(reqs[0].method(), http::Method::POST);

        Ok(())
    }

    #[test]
    fn authenticate_error() {
        let mut client = mock_client(MockTransport::new().respond_text(401, "Unauthenticated"));

        let err = client.authenticate("email", "password").unwrap_err();
        assert_matches!(err, Error::Api(ApiError::UnexpectedResponse(resp)) => {
            assert_eq!(resp.status(), http::StatusCode::UNAUTHORIZED);
            assert_eq!(resp.body(), "Unauthenticated");
        });
        assert_eq!(client.session_token(), None);
    }

    #[test]
    fn authenticate_missing_id() {
        let mut client = mock_client(MockTransport::new().respond_json(200, json!({"token": "x"})));

        assert_matches!(
            client.authenticate("email", "password"),
            Err(Error::Api(ApiError::InvalidResponse(http::StatusCode::OK)))
        );
        assert_eq!(client.session_token(), None);
    }

    #[test]
    fn select_database_success() -> anyhow::Result<()> {
        let transport = MockTransport::new().respond_json(
            200,
            json!([{"id": 1, "name": "foo"}, {"id": 2, "name": "bar"}]),
        );
        let mut client = configured(transport);

        let chained = client.select_database(pick("foo"))?;
        assert_eq!(chained.database_id(), Some(DatabaseId(1)));

        let reqs = client.transport.requests();
        assert_eq!(reqs[0].uri().path(), "/api/database");
        assert_eq!(reqs[0].headers()[SESSION_HEADER], "123abc");

        Ok(())
    }

    #[test]
    fn select_database_sees_all_names() -> anyhow::Result<()> {
        let transport = MockTransport::new().respond_json(
            200,
            json!([{"id": 1, "name": "foo"}, {"id": 2, "name": "bar"}]),
        );
        let mut client = mock_client(transport).with_session("123abc");

        let mut seen = Vec::new();
        let record = |dbs: &BTreeMap<String, DatabaseId>| -> Result<String, SelectError> {
            seen.extend(dbs.iter().map(|(name, id)| (name.clone(), *id)));
            Ok("bar".to_string())
        };
        client.select_database(record)?;

        assert_eq!(
            seen,
            [
                ("bar".to_string(), DatabaseId(2)),
                ("foo".to_string(), DatabaseId(1))
            ]
        );
        assert_eq!(client.database_id(), Some(DatabaseId(2)));

        Ok(())
    }

    #[test]
    fn select_database_unknown_name() {
        let transport = MockTransport::new().respond_json(200, json!([{"id": 1, "name": "foo"}]));
        let mut client = configured(transport);

        assert_matches!(
            client.select_database(pick("baz")),
            Err(Error::UnknownDatabase(name)) if name == "baz"
        );
        assert_eq!(client.database_id(), Some(DatabaseId(123)));
    }

    #[test]
    fn select_database_cancelled() {
        let transport = MockTransport::new().respond_json(200, json!([{"id": 1, "name": "foo"}]));
        let mut client = configured(transport);

        let cancel = |_: &BTreeMap<String, DatabaseId>| -> Result<String, SelectError> {
            Err(SelectError::Cancelled)
        };
        assert_matches!(
            client.select_database(cancel),
            Err(Error::Selection(SelectError::Cancelled))
        );
    }

    #[test]
    fn select_database_error() {
        let mut client = configured(MockTransport::new().respond_text(401, ""));

        assert_matches!(
            client.select_database(pick("foo")),
            Err(Error::Api(ApiError::UnexpectedResponse(resp))) if resp.status() == 401
        );
    }

    #[test]
    fn select_database_unauthenticated() {
        let mut client = mock_client(MockTransport::new()).with_database(DatabaseId(123));

        assert_matches!(
            client.select_database(pick("foo")),
            Err(Error::NotAuthenticated)
        );
        assert!(client.transport.requests().is_empty());
    }

    #[test]
    fn query_success() -> anyhow::Result<()> {
        let body = json!({
            "data": {"rows": [[1], [2], [3]], "cols": [{"name": "a"}]},
            "row_count": 3,
            "status": "completed",
        });
        let client = configured(MockTransport::new().respond_json(202, body.clone()));

        assert_eq!(client.query("SELECT * FROM tests")?, body);

        let reqs = client.transport.requests();
        assert_eq!(reqs[0].uri().path(), "/api/dataset");
        assert_eq!(reqs[0].method(), http::Method::POST);
        assert_eq!(reqs[0].headers()[SESSION_HEADER], "123abc");
        assert!(reqs[0].body().starts_with("query="));

        Ok(())
    }

    #[test]
    fn query_requires_202() {
        // 200 is a success status, but not the one this endpoint promises.
        let client = configured(MockTransport::new().respond_json(200, json!({"data": {}})));

        assert_matches!(
            client.query("SELECT 1"),
            Err(Error::Api(ApiError::UnexpectedResponse(resp))) if resp.status() == 200
        );
    }

    #[test]
    fn query_error() {
        let client = configured(
            MockTransport::new().respond_json(401, json!({"message": "Unauthenticated"})),
        );

        let err = client.query("SELECT * FROM tests").unwrap_err();
        assert_matches!(&err, Error::Api(api) => {
            assert_eq!(api.status(), http::StatusCode::UNAUTHORIZED);
            assert_eq!(api.message().as_deref(), Some("Unauthenticated"));
        });
    }

    #[test]
    fn query_unconfigured() {
        let client = mock_client(MockTransport::new()).with_session("123abc");

        assert_matches!(client.query("SELECT * FROM tests"), Err(Error::NoDatabase));
        assert!(client.transport.requests().is_empty());
    }

    #[test]
    fn query_unauthenticated() {
        let client = mock_client(MockTransport::new()).with_database(DatabaseId(123));
        assert_matches!(
            client.query("SELECT * FROM tests"),
            Err(Error::NotAuthenticated)
        );

        let client = mock_client(MockTransport::new());
        assert_matches!(
            client.query("SELECT * FROM tests"),
            Err(Error::NotAuthenticated)
        );
        assert!(client.transport.requests().is_empty());
    }

    #[test]
    fn query_transport_error() {
        let client = Client::with_transport(
            "https://metabase.example.com".parse().unwrap(),
            UnreachableTransport,
        )
        .with_session("123abc")
        .with_database(DatabaseId(123));

        assert_matches!(client.query("SELECT 1"), Err(Error::Transport(_)));
    }

    #[test]
    fn get_dataframe_success() -> anyhow::Result<()> {
        let body = json!({
            "data": {
                "rows": [["a", 1], ["b", 2]],
                "cols": [{"name": "name"}, {"name": "id"}],
            },
        });
        let client = configured(MockTransport::new().respond_json(202, body));

        let batch = client.get_dataframe("SELECT name, id FROM tests")?;
        let names: Vec<_> = batch.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, ["name", "id"]);
        assert_eq!(batch.num_rows(), 2);

        let name = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        let id = batch.column(1).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(name.value(0), "a");
        assert_eq!(name.value(1), "b");
        assert_eq!(id.value(0), 1);
        assert_eq!(id.value(1), 2);
        assert_eq!(id.null_count(), 0);

        Ok(())
    }

    #[test]
    fn get_dataframe_error() {
        let client = configured(MockTransport::new().respond_text(401, ""));

        assert_matches!(
            client.get_dataframe("SELECT * FROM tests"),
            Err(Error::Api(ApiError::UnexpectedResponse(_)))
        );
    }

    #[test]
    fn get_dataframe_flat_rows() {
        let client = configured(
            MockTransport::new().respond_json(202, json!([{"a": 1, "b": 2}, {"a": 4, "b": 5}])),
        );

        assert_matches!(
            client.get_dataframe("SELECT * FROM tests"),
            Err(Error::Api(ApiError::InvalidResponse(http::StatusCode::ACCEPTED)))
        );
    }

    #[test]
    fn get_dataframe_preconditions() {
        let client = mock_client(MockTransport::new()).with_session("123abc");
        assert_matches!(client.get_dataframe("SELECT 1"), Err(Error::NoDatabase));

        let client = mock_client(MockTransport::new()).with_database(DatabaseId(123));
        assert_matches!(client.get_dataframe("SELECT 1"), Err(Error::NotAuthenticated));
    }

    #[test]
    fn full_flow() -> anyhow::Result<()> {
        let transport = MockTransport::new()
            .respond_json(200, json!({"id": "tok"}))
            .respond_json(200, json!({"data": [{"id": 9, "name": "warehouse"}]}))
            .respond_json(202, json!({"data": {"rows": [{"n": 42}]}, "row_count": 1}));

        let mut client = mock_client(transport);
        let batch = client
            .authenticate("ada@example.com", "hunter2")?
            .select_database(pick("warehouse"))?
            .get_dataframe("SELECT 42 AS n")?;

        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.schema().field(0).name(), "n");
        assert_eq!(client.database_id(), Some(DatabaseId(9)));

        let reqs = client.transport.requests();
        assert_eq!(reqs.len(), 3);
        assert!(reqs[0].headers().get(SESSION_HEADER).is_none());
        assert_eq!(reqs[1].headers()[SESSION_HEADER], "tok");
        assert_eq!(reqs[2].headers()[SESSION_HEADER], "tok");

        Ok(())
    }
}
