//! The HTTP transport underneath [Client](crate::Client).

use std::{io::Read as _, time};

/// An error raised by the transport itself, as opposed to an error status
/// from the API.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Sends a single request and collects the full response. Implementations
/// must not treat non-2xx statuses as errors; status checking happens in the
/// API layer.
pub trait Transport {
    /// Send the request and read the whole body.
    fn send(&self, req: http::Request<String>) -> Result<http::Response<Vec<u8>>, TransportError>;
}

impl Transport for ureq::Agent {
    fn send(&self, req: http::Request<String>) -> Result<http::Response<Vec<u8>>, TransportError> {
        let resp = self.run(req)?;
        let (parts, body) = resp.into_parts();

        let mut buf = Vec::new();
        body.into_reader().read_to_end(&mut buf)?;

        Ok(http::Response::from_parts(parts, buf))
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, req: http::Request<String>) -> Result<http::Response<Vec<u8>>, TransportError> {
        (**self).send(req)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, req: http::Request<String>) -> Result<http::Response<Vec<u8>>, TransportError> {
        (**self).send(req)
    }
}

/// Build a [ureq::Agent] that hands error statuses back as responses, with
/// an optional overall timeout per request.
pub fn agent(timeout: Option<time::Duration>) -> ureq::Agent {
    let cfg = ureq::config::Config::builder()
        .http_status_as_error(false)
        .timeout_global(timeout)
        .build();

    ureq::Agent::new_with_config(cfg)
}
