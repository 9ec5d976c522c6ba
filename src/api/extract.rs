//! Extractors whose rejections render as the `{success, error}` envelope.

use axum::extract::{FromRequest, FromRequestParts};

use crate::infrastructure::error::AppError;

/// JSON body; malformed or incomplete bodies become `400 VALIDATION_ERROR`.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Query string; unparsable parameters become `400 VALIDATION_ERROR`.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);
