// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Debug};
use std::sync::Arc;

use super::{Response, ResponseCode};

/// Classification of a single replica's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseVerdict {
    /// The response is usable and ends the request.
    Accept,

    /// The response is not usable; another replica should be tried.
    Reject,
}

/// Maps a replica [`Response`] to a [`ResponseVerdict`].
///
/// The default classifier rejects network errors, `429 Too Many Requests` and every `5xx`
/// code except `501 Not Implemented`; everything else is accepted.
///
/// # Examples
///
/// ```
/// use cluster_client::{Response, ResponseClassifier, ResponseCode, ResponseVerdict};
///
/// let classifier = ResponseClassifier::new(|response: &Response| {
///     if response.code() == ResponseCode::NOT_FOUND {
///         ResponseVerdict::Reject
///     } else {
///         ResponseClassifier::default().classify(response)
///     }
/// });
///
/// assert_eq!(classifier.classify(&Response::new(ResponseCode::NOT_FOUND)), ResponseVerdict::Reject);
/// ```
#[derive(Clone)]
pub struct ResponseClassifier(Option<Arc<dyn Fn(&Response) -> ResponseVerdict + Send + Sync>>);

impl ResponseClassifier {
    /// Creates a classifier from a closure.
    pub fn new(classify: impl Fn(&Response) -> ResponseVerdict + Send + Sync + 'static) -> Self {
        Self(Some(Arc::new(classify)))
    }

    /// Classifies the response.
    #[must_use]
    pub fn classify(&self, response: &Response) -> ResponseVerdict {
        match &self.0 {
            Some(classify) => classify(response),
            None => default_verdict(response.code()),
        }
    }
}

impl Default for ResponseClassifier {
    fn default() -> Self {
        Self(None)
    }
}

impl Debug for ResponseClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseClassifier")
            .field("custom", &self.0.is_some())
            .finish()
    }
}

fn default_verdict(code: ResponseCode) -> ResponseVerdict {
    if code.is_network_error()
        || code == ResponseCode::TOO_MANY_REQUESTS
        || (code.is_server_error() && code != ResponseCode::NOT_IMPLEMENTED)
    {
        ResponseVerdict::Reject
    } else {
        ResponseVerdict::Accept
    }
}
