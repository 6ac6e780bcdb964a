use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Response;

use crate::handlers::{json_body, parse_id};
use crate::services::orders::CreateOrderRequest;
use crate::services::proofs::ProofUpload;
use crate::state::AppState;
use crate::utils::error::{AppError, Result};
use crate::utils::response::{created, success};

const FILE_FIELD: &str = "file";

pub async fn create_order(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Response> {
    let request = json_body(payload)?;
    let order = state.orders.create_order(request).await?;
    Ok(created(order, "Order created successfully"))
}

pub async fn get_order_by_reference(
    State(state): State<AppState>,
    Path(reference_code): Path<String>,
) -> Result<Response> {
    let order = state.orders.get_order_by_reference(&reference_code).await?;
    Ok(success(order, "Order retrieved successfully"))
}

pub async fn upload_payment_proof(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Response> {
    let order_id = parse_id(&order_id, "order_id")?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let original_file_name = field.file_name().map(str::to_string);
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some(ProofUpload {
            original_file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let upload = upload.ok_or_else(|| AppError::validation(FILE_FIELD, "No file uploaded"))?;
    let attached = state.orders.attach_payment_proof(order_id, upload).await?;
    let message = if attached.replaced {
        "Payment proof updated successfully"
    } else {
        "Payment proof uploaded successfully"
    };
    Ok(success(attached, message))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::validation(FILE_FIELD, "File size exceeds maximum allowed size")
    } else {
        AppError::validation(FILE_FIELD, e.body_text())
    }
}
