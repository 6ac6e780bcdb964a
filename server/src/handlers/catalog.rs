use axum::extract::{Path, State};
use axum::response::Response;

use crate::handlers::parse_id;
use crate::state::AppState;
use crate::utils::error::Result;
use crate::utils::response::success;

pub async fn list_events(State(state): State<AppState>) -> Result<Response> {
    let events = state.catalog.list_events().await?;
    Ok(success(events, "Events retrieved successfully"))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Response> {
    let event_id = parse_id(&event_id, "event_id")?;
    let event = state.catalog.get_event(event_id).await?;
    Ok(success(event, "Event retrieved successfully"))
}
