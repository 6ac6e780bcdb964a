use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An admission credential. Written once when its order is verified and
/// never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Copied from the line item, not a reference to the live tier.
    pub tier_name: String,
    /// The exact string encoded into the QR code.
    pub credential: String,
    pub created_at: DateTime<Utc>,
}

/// Contents of a ticket's QR code. Carries only copied descriptive values
/// so it stays meaningful if catalog rows change later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialPayload {
    pub ticket_id: Uuid,
    pub reference_code: String,
    pub tier: String,
    pub event: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedTicket {
    #[serde(flatten)]
    pub ticket: Ticket,
    /// `data:` URL of the rendered QR image.
    pub qr_code: String,
}

/// What an entry gate shows after a successful scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialCheck {
    pub ticket_id: Uuid,
    pub tier_name: String,
    pub event_name: String,
    pub order_reference: String,
}
