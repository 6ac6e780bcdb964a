//! Persistence seams for the order lifecycle.
//!
//! Every method that changes order state is a single atomic unit in each
//! implementation. Status transitions are conditional on the current status,
//! so two racing transitions can never both succeed.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    CustomerInfo, Event, EventSummary, EventUpdate, EventWithTiers, NewEvent, NewPaymentProof,
    Order, OrderDetails, OrderFilter, OrderStats, OrderStatus, ProofReplacement, SalesLine,
    Ticket, TicketTier, TierUpdate,
};
use crate::services::pricing::PricingSnapshot;
use crate::utils::error::{AppError, Result};

pub mod files;
pub mod memory;
pub mod postgres;

pub use files::{FileStore, LocalFileStore, MemoryFileStore, StoredFile};
pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Active events by date, each with its active tiers by ascending price.
    async fn list_active_events(&self) -> Result<Vec<EventWithTiers>>;

    async fn get_active_event(&self, event_id: Uuid) -> Result<Option<Event>>;

    async fn get_active_tiers(&self, event_id: Uuid) -> Result<Vec<TicketTier>>;

    /// `None` when the tier is missing, inactive or belongs to another event.
    async fn get_active_tier(&self, tier_id: Uuid, event_id: Uuid) -> Result<Option<TicketTier>>;

    /// Fails with `Conflict` if an event with the same name exists.
    async fn create_event(&self, event: NewEvent) -> Result<EventWithTiers>;

    async fn update_tier(&self, tier_id: Uuid, update: TierUpdate) -> Result<Option<TicketTier>>;

    /// Every event including inactive ones, by date, with all tiers and order counts.
    async fn list_all_events(&self) -> Result<Vec<EventSummary>>;

    /// `None` when the event does not exist. A name taken by another event
    /// yields `Conflict`.
    async fn update_event(
        &self,
        event_id: Uuid,
        update: EventUpdate,
    ) -> Result<Option<EventWithTiers>>;
}

#[async_trait]
pub trait ReferenceIndex: Send + Sync {
    async fn reference_exists(&self, reference_code: &str) -> Result<bool>;
}

/// Input to [`OrderStore::insert_order`]. The store assigns ids and timestamps.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub reference_code: String,
    pub customer: CustomerInfo,
    pub snapshot: PricingSnapshot,
}

#[async_trait]
pub trait OrderStore: ReferenceIndex {
    /// Inserts the order and its line items in one transaction with status
    /// `PendingVerification`. A reference code already in use yields `Conflict`.
    async fn insert_order(&self, order: NewOrder) -> Result<OrderDetails>;

    async fn find_order(&self, order_id: Uuid) -> Result<Option<OrderDetails>>;

    async fn find_order_by_reference(&self, reference_code: &str) -> Result<Option<OrderDetails>>;

    /// One page of orders, newest first, plus the total matching the filter.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<(Vec<Order>, i64)>;

    /// Creates or replaces the order's proof while it is still pending.
    async fn record_payment_proof(
        &self,
        order_id: Uuid,
        proof: NewPaymentProof,
    ) -> Result<ProofReplacement>;

    /// Moves a pending order to `Verified` and inserts its tickets, or does
    /// neither.
    async fn commit_verification(&self, order_id: Uuid, tickets: &[Ticket]) -> Result<Order>;

    async fn commit_rejection(&self, order_id: Uuid, reason: Option<&str>) -> Result<Order>;

    /// Exact match on the stored credential string, with the owning order.
    async fn find_ticket_by_credential(&self, credential: &str) -> Result<Option<(Ticket, Order)>>;

    async fn order_stats(&self) -> Result<OrderStats>;

    /// Tickets and revenue of verified orders per event and tier name.
    async fn sales_summary(&self) -> Result<Vec<SalesLine>>;
}

/// Error for a transition that found the order missing or no longer pending.
pub(crate) fn transition_refused(
    order_id: Uuid,
    current: Option<OrderStatus>,
    action: &str,
) -> AppError {
    match current {
        None => AppError::NotFound(format!("Order '{}' was not found", order_id)),
        Some(status) => AppError::InvalidState(format!("Order is {}, cannot {}", status, action)),
    }
}
