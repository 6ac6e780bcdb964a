use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Json, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::handlers::{json_body, parse_id, query_params};
use crate::models::{EventUpdate, NewEvent, OrderFilter, TierUpdate};
use crate::state::AppState;
use crate::utils::error::{AppError, Result};
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyTicketRequest {
    #[serde(alias = "qr_data")]
    pub credential: String,
}

pub async fn list_orders(
    State(state): State<AppState>,
    filter: std::result::Result<Query<OrderFilter>, QueryRejection>,
) -> Result<Response> {
    let filter = query_params(filter)?;
    let page = state.orders.list_orders(filter).await?;
    Ok(success(page, "Orders retrieved successfully"))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Response> {
    let order = state.orders.get_order(parse_id(&order_id, "order_id")?).await?;
    Ok(success(order, "Order retrieved successfully"))
}

pub async fn get_payment_proof(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Response> {
    let order_id = parse_id(&order_id, "order_id")?;
    let (proof, file) = state.orders.payment_proof_file(order_id).await?;

    let headers = [
        (header::CONTENT_TYPE, file.content_type),
        (
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{}\"", proof.storage_key),
        ),
    ];
    Ok((headers, file.bytes).into_response())
}

pub async fn verify_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Response> {
    let verified = state
        .orders
        .verify_order(parse_id(&order_id, "order_id")?)
        .await?;
    Ok(success(verified, "Order verified and tickets generated"))
}

pub async fn reject_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    payload: std::result::Result<Json<RejectRequest>, JsonRejection>,
) -> Result<Response> {
    let order_id = parse_id(&order_id, "order_id")?;
    let reason = match payload {
        Ok(Json(body)) => body.reason,
        // The reason is optional, so is the body.
        Err(JsonRejection::MissingJsonContentType(_)) => None,
        Err(e) => return Err(AppError::validation("body", e.body_text())),
    };

    let order = state.orders.reject_order(order_id, reason).await?;
    Ok(success(order, "Order rejected"))
}

pub async fn verify_ticket(
    State(state): State<AppState>,
    payload: std::result::Result<Json<VerifyTicketRequest>, JsonRejection>,
) -> Result<Response> {
    let request = json_body(payload)?;
    let check = state.orders.verify_credential(&request.credential).await?;
    Ok(success(check, "Ticket is valid"))
}

pub async fn order_stats(State(state): State<AppState>) -> Result<Response> {
    let stats = state.orders.order_stats().await?;
    Ok(success(stats, "Statistics retrieved successfully"))
}

pub async fn sales_summary(State(state): State<AppState>) -> Result<Response> {
    let sales = state.orders.sales_summary().await?;
    Ok(success(sales, "Sales summary retrieved successfully"))
}

pub async fn list_all_events(State(state): State<AppState>) -> Result<Response> {
    let events = state.catalog.list_all_events().await?;
    Ok(success(events, "Events retrieved successfully"))
}

pub async fn create_event(
    State(state): State<AppState>,
    payload: std::result::Result<Json<NewEvent>, JsonRejection>,
) -> Result<Response> {
    let event = state.catalog.create_event(json_body(payload)?).await?;
    Ok(created(event, "Event created successfully"))
}

pub async fn update_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
    payload: std::result::Result<Json<EventUpdate>, JsonRejection>,
) -> Result<Response> {
    let event_id = parse_id(&event_id, "event_id")?;
    let event = state
        .catalog
        .update_event(event_id, json_body(payload)?)
        .await?;
    Ok(success(event, "Event updated successfully"))
}

pub async fn deactivate_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Response> {
    let event_id = parse_id(&event_id, "event_id")?;
    let event = state.catalog.deactivate_event(event_id).await?;
    Ok(success(event, "Event deactivated"))
}

pub async fn update_tier(
    State(state): State<AppState>,
    Path(tier_id): Path<String>,
    payload: std::result::Result<Json<TierUpdate>, JsonRejection>,
) -> Result<Response> {
    let tier_id = parse_id(&tier_id, "tier_id")?;
    let tier = state
        .catalog
        .update_tier(tier_id, json_body(payload)?)
        .await?;
    Ok(success(tier, "Ticket tier updated successfully"))
}
