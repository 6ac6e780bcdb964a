use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub venue: String,
    pub city: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A priced admission category. `price` is only ever read when an order is
/// created; orders keep their own copy.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventWithTiers {
    #[serde(flatten)]
    pub event: Event,
    pub tiers: Vec<TicketTier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub name: String,
    pub starts_at: DateTime<Utc>,
    pub venue: String,
    pub city: String,
    pub description: Option<String>,
    pub tiers: Vec<NewTicketTier>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTicketTier {
    pub name: String,
    pub price: Decimal,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TierUpdate {
    pub price: Option<Decimal>,
    pub is_active: Option<bool>,
}

/// Admin listing row: any event, active or not, with all of its tiers.
#[derive(Debug, Clone, Serialize)]
pub struct EventSummary {
    #[serde(flatten)]
    pub event: Event,
    pub tiers: Vec<TicketTier>,
    pub order_count: i64,
}

/// Partial event edit. An empty `description` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventUpdate {
    pub name: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub venue: Option<String>,
    pub city: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl EventUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.starts_at.is_none()
            && self.venue.is_none()
            && self.city.is_none()
            && self.description.is_none()
            && self.is_active.is_none()
    }
}
