//! Test utilities for exercising the client without a server.

use std::{
    collections::VecDeque,
    sync::{Mutex, MutexGuard},
};

use crate::transport::{Transport, TransportError};

/// A transport that answers with canned responses, in order, and records
/// every request it is sent.
#[derive(Debug, Default)]
pub(crate) struct MockTransport {
    responses: Mutex<VecDeque<http::Response<Vec<u8>>>>,
    requests: Mutex<Vec<http::Request<String>>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a response with the given status and JSON body.
    pub(crate) fn respond_json(self, status: u16, body: serde_json::Value) -> Self {
        let resp = http::Response::builder()
            .status(status)
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&body).expect("JSON serialization should be infallible"))
            .expect("valid response");

        self.responses.lock().unwrap().push_back(resp);
        self
    }

    /// Queue a response with the given status and a plain text body.
    pub(crate) fn respond_text(self, status: u16, body: &str) -> Self {
        let resp = http::Response::builder()
            .status(status)
            .body(body.as_bytes().to_vec())
            .expect("valid response");

        self.responses.lock().unwrap().push_back(resp);
        self
    }

    /// The requests sent so far.
    pub(crate) fn requests(&self) -> MutexGuard<'_, Vec<http::Request<String>>> {
        self.requests.lock().unwrap()
    }
}

impl Transport for MockTransport {
    fn send(&self, req: http::Request<String>) -> Result<http::Response<Vec<u8>>, TransportError> {
        self.requests.lock().unwrap().push(req);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| "no response queued".into())
    }
}

/// A transport that fails every request, as if the server were unreachable.
#[derive(Debug, Default)]
pub(crate) struct UnreachableTransport;

impl Transport for UnreachableTransport {
    fn send(&self, _req: http::Request<String>) -> Result<http::Response<Vec<u8>>, TransportError> {
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused").into())
    }
}
