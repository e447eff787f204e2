// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display};

use bytes::Bytes;
use http::HeaderMap;

/// Numeric status of a [`Response`].
///
/// Covers regular HTTP status codes plus the client-side codes used to describe transport
/// failures that never produced a real response from the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResponseCode(u16);

impl ResponseCode {
    /// No meaningful code is available.
    pub const UNKNOWN: Self = Self(0);

    /// `200 OK`.
    pub const OK: Self = Self(200);

    /// `404 Not Found`.
    pub const NOT_FOUND: Self = Self(404);

    /// The attempt did not complete within its timeout.
    pub const REQUEST_TIMEOUT: Self = Self(408);

    /// `429 Too Many Requests`.
    pub const TOO_MANY_REQUESTS: Self = Self(429);

    /// The connection to the replica could not be established.
    pub const CONNECT_FAILURE: Self = Self(450);

    /// The response could not be received from the replica.
    pub const RECEIVE_FAILURE: Self = Self(451);

    /// The request could not be sent to the replica.
    pub const SEND_FAILURE: Self = Self(452);

    /// The transport failed for an unclassified reason.
    pub const UNKNOWN_FAILURE: Self = Self(459);

    /// The attempt was abandoned by the caller.
    pub const CANCELED: Self = Self(499);

    /// `500 Internal Server Error`.
    pub const INTERNAL_SERVER_ERROR: Self = Self(500);

    /// `501 Not Implemented`.
    pub const NOT_IMPLEMENTED: Self = Self(501);

    /// `503 Service Unavailable`.
    pub const SERVICE_UNAVAILABLE: Self = Self(503);

    /// Creates a code from its numeric value.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// Returns the numeric value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Returns `true` for codes describing a failure to talk to the replica at all.
    #[must_use]
    pub const fn is_network_error(self) -> bool {
        self.0 == Self::REQUEST_TIMEOUT.0 || (self.0 >= 450 && self.0 <= 459)
    }

    /// Returns `true` for `2xx` codes.
    #[must_use]
    pub const fn is_successful(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// Returns `true` for `5xx` codes.
    #[must_use]
    pub const fn is_server_error(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }
}

impl Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl From<http::StatusCode> for ResponseCode {
    fn from(status: http::StatusCode) -> Self {
        Self(status.as_u16())
    }
}

impl From<u16> for ResponseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

/// Response received from a single replica.
///
/// Transport failures are represented as synthetic responses carrying a network error code
/// and no body. Use [`Response::timeout`] and friends to build them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    code: ResponseCode,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Response {
    /// Creates a response with the given code and no headers or body.
    #[must_use]
    pub fn new(code: ResponseCode) -> Self {
        Self {
            code,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates the response used when an attempt runs out of time.
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(ResponseCode::REQUEST_TIMEOUT)
    }

    /// Creates the response used when the connection could not be established.
    #[must_use]
    pub fn connect_failure() -> Self {
        Self::new(ResponseCode::CONNECT_FAILURE)
    }

    /// Creates the response used when the transport failed for an unclassified reason.
    #[must_use]
    pub fn unknown_failure() -> Self {
        Self::new(ResponseCode::UNKNOWN_FAILURE)
    }

    /// Replaces the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Replaces the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The response code.
    #[must_use]
    pub fn code(&self) -> ResponseCode {
        self.code
    }

    /// The response headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The response body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Length of the body in bytes, `0` when there is none.
    #[must_use]
    pub fn content_length(&self) -> usize {
        self.body.as_ref().map_or(0, Bytes::len)
    }
}
