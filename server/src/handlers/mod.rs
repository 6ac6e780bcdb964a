use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Query};
use axum::response::Response;
use serde::Serialize;
use uuid::Uuid;

use crate::utils::error::{AppError, Result};
use crate::utils::response::success;

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod orders;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "pulse-api",
    };

    success(payload, "Health check successful")
}

/// Path ids are taken as strings so a malformed id gets the JSON error body.
pub(crate) fn parse_id(raw: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::validation(field, format!("'{}' is not a valid id", raw)))
}

pub(crate) fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::validation("body", e.body_text()))
}

pub(crate) fn query_params<T>(
    params: std::result::Result<Query<T>, QueryRejection>,
) -> Result<T> {
    params
        .map(|Query(query)| query)
        .map_err(|e| AppError::validation("query", e.body_text()))
}
