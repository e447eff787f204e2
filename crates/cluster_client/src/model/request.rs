// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, Uri};

use crate::error::RequestValidationError;

/// Logical request sent to a cluster of replicas.
///
/// The target is an origin-form [`Uri`] (path plus optional query, e.g. `/foo/bar?x=1`); the
/// replica endpoint is combined with it by the transport. Requests are immutable once built and
/// cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Request {
    /// Creates a request with the given method and target.
    #[must_use]
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a `GET` request.
    #[must_use]
    pub fn get(uri: Uri) -> Self {
        Self::new(Method::GET, uri)
    }

    /// Creates a `POST` request.
    #[must_use]
    pub fn post(uri: Uri) -> Self {
        Self::new(Method::POST, uri)
    }

    /// Appends a header. Header names are case-insensitive.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replaces all headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request target.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The target path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The request body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Length of the body in bytes, `0` when there is none.
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.body.as_ref().map_or(0, Bytes::len)
    }

    /// Checks that the request can be sent to a replica.
    ///
    /// # Errors
    ///
    /// Returns [`RequestValidationError`] when the target is absolute, the method is not a
    /// standard HTTP method, or a `GET`/`HEAD` request carries a body.
    pub fn validate(&self) -> Result<(), RequestValidationError> {
        if self.uri.scheme().is_some() || self.uri.authority().is_some() {
            return Err(RequestValidationError::new(format!(
                "request target '{}' must be relative to the replica",
                self.uri
            )));
        }

        if !is_standard_method(&self.method) {
            return Err(RequestValidationError::new(format!(
                "request method '{}' is not a standard HTTP method",
                self.method
            )));
        }

        if self.body.is_some() && (self.method == Method::GET || self.method == Method::HEAD) {
            return Err(RequestValidationError::new(format!(
                "{} request must not carry a body",
                self.method
            )));
        }

        Ok(())
    }
}

fn is_standard_method(method: &Method) -> bool {
    [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::HEAD,
        Method::OPTIONS,
        Method::PATCH,
        Method::TRACE,
        Method::CONNECT,
    ]
    .contains(method)
}
