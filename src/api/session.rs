//! API operations concerning login sessions.

use serde::{Deserialize, Serialize};

use crate::api::{ApiRequest, JsonResponse};

/// A login session.
#[derive(Clone, Deserialize, Serialize)]
pub struct Session {
    /// The session token, sent back on later requests.
    pub id: String,
}

impl JsonResponse for Session {}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &"********").finish()
    }
}

/// Log in with an email and password, creating a new session.
#[derive(Clone, Serialize)]
pub struct CreateSession<'a> {
    /// The email (or LDAP username) to log in with.
    pub username: &'a str,
    /// The password.
    pub password: &'a str,
}

impl std::fmt::Debug for CreateSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateSession")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

impl ApiRequest for CreateSession<'_> {
    type Response = Session;

    fn path(&self) -> String {
        "/api/session".to_string()
    }

    fn method(&self) -> http::Method {
        http::Method::POST
    }

    fn requires_session(&self) -> bool {
        false
    }

    fn body(&self) -> Option<impl Serialize> {
        Some(self)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ApiResponse, Connection};

    #[test]
    fn create_session_request() -> anyhow::Result<()> {
        let conn = Connection::new("https://metabase.example.com".parse()?);
        let req = CreateSession {
            username: "ada@example.com",
            password: "hunter2",
        };

        assert!(!format!("{req:?}").contains("hunter2"));

        let req = req.into_request(&conn)?;
        assert_eq!(req.method(), http::Method::POST);
        assert_eq!(req.uri(), "https://metabase.example.com/api/session");
        assert_eq!(req.headers()[http::header::CONTENT_TYPE], "application/json");
        assert!(req.headers().get(crate::api::SESSION_HEADER).is_none());

        let body: serde_json::Value = serde_json::from_str(req.body())?;
        assert_eq!(
            body,
            serde_json::json!({"username": "ada@example.com", "password": "hunter2"})
        );

        Ok(())
    }

    #[test]
    fn session_response() -> anyhow::Result<()> {
        let resp = http::Response::builder()
            .status(200)
            .body(&br#"{"id": "abc123"}"#[..])?;

        let session = Session::from_response(resp)?;
        assert_eq!(session.id, "abc123");
        assert!(!format!("{session:?}").contains("abc123"));

        Ok(())
    }
}
