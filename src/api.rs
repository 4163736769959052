use std::io::Read;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Serialize, de::DeserializeOwned};

use crate::Connection;

pub mod database;
pub mod dataset;
mod error;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::*;

/// The header carrying the session token on authenticated requests.
pub const SESSION_HEADER: &str = "X-Metabase-Session";

/// Characters escaped in `application/x-www-form-urlencoded` values. Spaces
/// are escaped as `%20` rather than `+`.
const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

/// How a request body is put on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyEncoding {
    /// A plain `application/json` body.
    Json,
    /// The JSON document is serialized to a string and sent as the single
    /// named field of an `application/x-www-form-urlencoded` body.
    JsonInFormField(&'static str),
}

/// Implemented by types that can be sent as requests to the Metabase API.
pub trait ApiRequest: Sized {
    /// The corresponding response type.
    type Response: ApiResponse;

    /// The path that the request should take, relative to the domain.
    fn path(&self) -> String;

    /// The method to use.
    fn method(&self) -> http::Method {
        http::Method::GET
    }

    /// The status code the API answers with on success. Anything else is an
    /// [ApiError::UnexpectedResponse].
    fn expected_status(&self) -> http::StatusCode {
        http::StatusCode::OK
    }

    /// Whether the request must carry a session token.
    fn requires_session(&self) -> bool {
        true
    }

    /// The serializable request body.
    fn body(&self) -> Option<impl Serialize> {
        None::<&()>
    }

    /// How the body should be encoded.
    fn body_encoding(&self) -> BodyEncoding {
        BodyEncoding::Json
    }

    /// Consume the request and return an [http::Request] suitable for passing
    /// to your favorite HTTP client.
    fn into_request(self, conn: &Connection) -> Result<http::Request<String>, http::Error> {
        let method = self.method();
        let path = join_path(&conn.domain, &self.path());
        let mut parts = conn.domain.clone().into_parts();
        parts.path_and_query = Some(path.parse()?);

        let uri = http::Uri::from_parts(parts)?;
        let mut req = http::Request::builder()
            .method(method)
            .uri(uri)
            .header(http::header::USER_AGENT, &conn.user_agent);

        if self.requires_session()
            && let Some(token) = &conn.session_token
        {
            req = req.header(SESSION_HEADER, token);
        }

        let Some(body) = self.body() else {
            return req.body("".to_string());
        };

        let json = serde_json::to_string(&body).expect("JSON serialization should be infallible");
        let (content_type, body_str) = match self.body_encoding() {
            BodyEncoding::Json => ("application/json", json),
            BodyEncoding::JsonInFormField(field) => (
                "application/x-www-form-urlencoded",
                format!("{field}={}", utf8_percent_encode(&json, FORM_VALUE)),
            ),
        };

        req.header(http::header::CONTENT_TYPE, content_type)
            .header(http::header::CONTENT_LENGTH, body_str.len())
            .body(body_str)
    }
}

/// Implemented by types that can be read as responses from the Metabase API.
pub trait ApiResponse: Sized {
    /// Read the response from an [http::Response] object. The status code is
    /// not checked; see [check_status].
    fn from_response(resp: http::Response<impl Read>) -> Result<Self, ApiError> {
        let (parts, body) = resp.into_parts();
        Self::from_response_parts(parts, body)
    }

    /// Read the response from pre-parsed parts. Useful for async HTTP clients
    /// where the body must be collected before parsing.
    fn from_response_parts(parts: http::response::Parts, body: impl Read)
    -> Result<Self, ApiError>;
}

/// A private trait for types that deserialize directly from a JSON body.
pub(crate) trait JsonResponse: DeserializeOwned {}

impl<T: JsonResponse> ApiResponse for T {
    fn from_response_parts(
        parts: http::response::Parts,
        body: impl Read,
    ) -> Result<Self, ApiError> {
        serde_json::from_reader(body).map_err(|e| {
            tracing::error!("Failed to parse API response: {e:#?}");
            ApiError::InvalidResponse(parts.status)
        })
    }
}

impl JsonResponse for serde_json::Value {}

/// Pass the response through if it has the expected status. Otherwise, the
/// body is read to the end and the whole response is returned inside
/// [ApiError::UnexpectedResponse].
pub fn check_status<R: Read>(
    resp: http::Response<R>,
    expected: http::StatusCode,
) -> Result<http::Response<R>, ApiError> {
    if resp.status() == expected {
        return Ok(resp);
    }

    let (parts, mut body) = resp.into_parts();
    let mut buf = Vec::new();
    if let Err(e) = body.read_to_end(&mut buf) {
        tracing::debug!(error = %e, "failed to read body of unexpected response");
    }

    let body = String::from_utf8_lossy(&buf).into_owned();
    Err(ApiError::UnexpectedResponse(Box::new(
        http::Response::from_parts(parts, body),
    )))
}

fn join_path(domain: &http::Uri, path: &str) -> String {
    let prefix = domain.path().trim_end_matches('/');
    format!("{prefix}/{}", path.trim_start_matches('/'))
}
