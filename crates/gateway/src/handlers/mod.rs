//! API handlers module

pub mod auth;
pub mod chat;
pub mod courses;
pub mod health;
pub mod upload;

use axum::extract::FromRequest;
use cognify_common::errors::{AppError, Result};

/// JSON body extractor whose rejections use the API error format
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Trimmed value of a required text field; blank counts as missing
pub(crate) fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::missing(field))
}

/// Trimmed value of an optional text field; blank becomes `None`
pub(crate) fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
