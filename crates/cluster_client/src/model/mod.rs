// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Value types describing requests, replica outcomes and cluster outcomes.

mod cluster_result;
mod replica_result;
mod request;
mod response;
mod verdict;

pub use cluster_result::{ClusterResult, ClusterResultStatus};
pub use replica_result::ReplicaResult;
pub use request::Request;
pub use response::{Response, ResponseCode};
pub use verdict::{ResponseClassifier, ResponseVerdict};
