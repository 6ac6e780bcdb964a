use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Evidence of a bank transfer. One per order; re-uploads replace it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PaymentProof {
    pub id: Uuid,
    pub order_id: Uuid,
    /// Key under which the file store holds the bytes. Generated, never user supplied.
    #[serde(skip_serializing)]
    pub storage_key: String,
    pub original_file_name: Option<String>,
    pub file_size: i64,
    pub mime_type: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPaymentProof {
    pub storage_key: String,
    pub original_file_name: Option<String>,
    pub file_size: i64,
    pub mime_type: String,
}

/// Result of recording a proof: the stored record plus whatever it replaced.
#[derive(Debug, Clone)]
pub struct ProofReplacement {
    pub current: PaymentProof,
    pub previous: Option<PaymentProof>,
}
