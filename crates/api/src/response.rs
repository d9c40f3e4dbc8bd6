//! Shared response envelope for API handlers.
//!
//! Successful responses use `{ "data": ..., "requestId": ... }` so every
//! answer, success or failure, carries the correlation id.

use serde::Serialize;

/// Standard `{ "data": T, "requestId": String }` response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataResponse<T: Serialize> {
    pub data: T,
    pub request_id: String,
}

impl<T: Serialize> DataResponse<T> {
    pub fn new(data: T, request_id: impl Into<String>) -> Self {
        Self {
            data,
            request_id: request_id.into(),
        }
    }
}
