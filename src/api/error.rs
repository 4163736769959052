use serde::Deserialize;

/// An error response from the API.
#[derive(Debug, thiserror::Error)]
#[allow(variant_size_differences)]
pub enum ApiError {
    /// The API answered with a status other than the one documented for
    /// success. The raw response (status, headers and body) is kept for
    /// inspection.
    UnexpectedResponse(Box<http::Response<String>>),
    /// The API answered with the expected status, but the body could not be
    /// decoded.
    InvalidResponse(http::StatusCode),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::UnexpectedResponse(resp) => {
                write!(f, "Unexpected response ({})", resp.status())?;
                if let Some(message) = self.message() {
                    write!(f, ": {message}")?;
                }
            }
            ApiError::InvalidResponse(status) => {
                write!(f, "Invalid response ({status})")?;
            }
        }

        Ok(())
    }
}

// Metabase reports most failures either as plain text or as a JSON object
// with a `message` field.
#[derive(Debug, Deserialize)]
struct RawApiError {
    message: String,
}

impl ApiError {
    /// The HTTP status of the offending response.
    pub fn status(&self) -> http::StatusCode {
        match self {
            ApiError::UnexpectedResponse(resp) => resp.status(),
            ApiError::InvalidResponse(status) => *status,
        }
    }

    /// The raw response, if the error carries one.
    pub fn response(&self) -> Option<&http::Response<String>> {
        match self {
            ApiError::UnexpectedResponse(resp) => Some(resp),
            ApiError::InvalidResponse(_) => None,
        }
    }

    /// A human-readable message extracted from the response body, if any.
    pub fn message(&self) -> Option<String> {
        const MAX_LEN: usize = 200;

        let body = self.response()?.body().trim();
        if body.is_empty() {
            return None;
        }

        if let Ok(raw) = serde_json::from_str::<RawApiError>(body) {
            return Some(raw.message);
        }

        if body.starts_with('<') {
            // Probably an HTML error page from a proxy.
            return None;
        }

        let mut end = body.len().min(MAX_LEN);
        while !body.is_char_boundary(end) {
            end -= 1;
        }

        Some(body[..end].to_owned())
    }
}
