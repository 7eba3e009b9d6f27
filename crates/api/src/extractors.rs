//! Extractors that reject malformed input with [`ApiError`].

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ApiError;

/// JSON body extractor; failures become a 400 `{error, message}` response.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

/// Query string extractor; failures become a 400 `{error, message}` response.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct AppQuery<T>(pub T);
