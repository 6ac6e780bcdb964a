//! In-memory store used by tests and local runs without Postgres.
//!
//! All tables live behind one `RwLock`, so every trait method observes and
//! mutates a consistent snapshot, the same way a single transaction would.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{transition_refused, Catalog, NewOrder, OrderStore, ReferenceIndex};
use crate::models::{
    Event, EventSummary, EventUpdate, EventWithTiers, NewEvent, NewPaymentProof, Order,
    OrderDetails, OrderFilter, OrderLineItem, OrderStats, OrderStatus, PaymentProof,
    ProofReplacement, SalesLine, Ticket, TicketTier, TierUpdate,
};
use crate::utils::error::{AppError, Result};

#[derive(Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    tiers: HashMap<Uuid, TicketTier>,
    orders: HashMap<Uuid, Order>,
    references: HashMap<String, Uuid>,
    line_items: HashMap<Uuid, Vec<OrderLineItem>>,
    proofs: HashMap<Uuid, PaymentProof>,
    tickets: HashMap<Uuid, Vec<Ticket>>,
    credentials: HashMap<String, Uuid>,
}

impl Tables {
    fn details(&self, order_id: Uuid) -> Option<OrderDetails> {
        let order = self.orders.get(&order_id)?.clone();
        Some(OrderDetails {
            order,
            items: self.line_items.get(&order_id).cloned().unwrap_or_default(),
            payment_proof: self.proofs.get(&order_id).cloned(),
            tickets: self.tickets.get(&order_id).cloned().unwrap_or_default(),
        })
    }

    fn active_tiers(&self, event_id: Uuid) -> Vec<TicketTier> {
        self.tiers_where(|t| t.event_id == event_id && t.is_active)
    }

    fn all_tiers(&self, event_id: Uuid) -> Vec<TicketTier> {
        self.tiers_where(|t| t.event_id == event_id)
    }

    fn tiers_where(&self, keep: impl Fn(&TicketTier) -> bool) -> Vec<TicketTier> {
        let mut tiers: Vec<TicketTier> = self.tiers.values().filter(|t| keep(t)).cloned().collect();
        tiers.sort_by(|a, b| a.price.cmp(&b.price).then_with(|| a.name.cmp(&b.name)));
        tiers
    }

    fn pending_order_mut(&mut self, order_id: Uuid, action: &str) -> Result<&mut Order> {
        match self.orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::PendingVerification => Ok(order),
            Some(order) => Err(transition_refused(order_id, Some(order.status), action)),
            None => Err(transition_refused(order_id, None, action)),
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalog for MemoryStore {
    async fn list_active_events(&self) -> Result<Vec<EventWithTiers>> {
        let tables = self.tables.read().await;
        let mut events: Vec<EventWithTiers> = tables
            .events
            .values()
            .filter(|e| e.is_active)
            .map(|event| EventWithTiers {
                event: event.clone(),
                tiers: tables.active_tiers(event.id),
            })
            .collect();
        events.sort_by_key(|e| e.event.starts_at);
        Ok(events)
    }

    async fn get_active_event(&self, event_id: Uuid) -> Result<Option<Event>> {
        let tables = self.tables.read().await;
        Ok(tables.events.get(&event_id).filter(|e| e.is_active).cloned())
    }

    async fn get_active_tiers(&self, event_id: Uuid) -> Result<Vec<TicketTier>> {
        Ok(self.tables.read().await.active_tiers(event_id))
    }

    async fn get_active_tier(&self, tier_id: Uuid, event_id: Uuid) -> Result<Option<TicketTier>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tiers
            .get(&tier_id)
            .filter(|t| t.event_id == event_id && t.is_active)
            .cloned())
    }

    async fn create_event(&self, new_event: NewEvent) -> Result<EventWithTiers> {
        let mut tables = self.tables.write().await;
        if tables.events.values().any(|e| e.name == new_event.name) {
            return Err(AppError::Conflict(format!(
                "Event '{}' already exists",
                new_event.name
            )));
        }

        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4(),
            name: new_event.name,
            starts_at: new_event.starts_at,
            venue: new_event.venue,
            city: new_event.city,
            description: new_event.description,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let tiers: Vec<TicketTier> = new_event
            .tiers
            .into_iter()
            .map(|tier| TicketTier {
                id: Uuid::new_v4(),
                event_id: event.id,
                name: tier.name,
                description: tier.description,
                price: tier.price,
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .collect();

        tables.events.insert(event.id, event.clone());
        for tier in &tiers {
            tables.tiers.insert(tier.id, tier.clone());
        }
        Ok(EventWithTiers { event, tiers })
    }

    async fn update_tier(&self, tier_id: Uuid, update: TierUpdate) -> Result<Option<TicketTier>> {
        let mut tables = self.tables.write().await;
        let Some(tier) = tables.tiers.get_mut(&tier_id) else {
            return Ok(None);
        };
        if let Some(price) = update.price {
            tier.price = price;
        }
        if let Some(is_active) = update.is_active {
            tier.is_active = is_active;
        }
        tier.updated_at = Utc::now();
        Ok(Some(tier.clone()))
    }

    async fn list_all_events(&self) -> Result<Vec<EventSummary>> {
        let tables = self.tables.read().await;
        let mut events: Vec<EventSummary> = tables
            .events
            .values()
            .map(|event| EventSummary {
                event: event.clone(),
                tiers: tables.all_tiers(event.id),
                order_count: tables
                    .orders
                    .values()
                    .filter(|o| o.event_id == event.id)
                    .count() as i64,
            })
            .collect();
        events.sort_by_key(|e| e.event.starts_at);
        Ok(events)
    }

    async fn update_event(
        &self,
        event_id: Uuid,
        update: EventUpdate,
    ) -> Result<Option<EventWithTiers>> {
        let mut tables = self.tables.write().await;
        if !tables.events.contains_key(&event_id) {
            return Ok(None);
        }
        if let Some(name) = &update.name {
            if tables
                .events
                .values()
                .any(|e| e.id != event_id && &e.name == name)
            {
                return Err(AppError::Conflict(format!("Event '{}' already exists", name)));
            }
        }

        let Some(event) = tables.events.get_mut(&event_id) else {
            return Ok(None);
        };
        if let Some(name) = update.name {
            event.name = name;
        }
        if let Some(starts_at) = update.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(venue) = update.venue {
            event.venue = venue;
        }
        if let Some(city) = update.city {
            event.city = city;
        }
        if let Some(description) = update.description {
            event.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(is_active) = update.is_active {
            event.is_active = is_active;
        }
        event.updated_at = Utc::now();

        let event = event.clone();
        let tiers = tables.all_tiers(event_id);
        Ok(Some(EventWithTiers { event, tiers }))
    }
}

#[async_trait]
impl ReferenceIndex for MemoryStore {
    async fn reference_exists(&self, reference_code: &str) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .await
            .references
            .contains_key(reference_code))
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert_order(&self, new_order: NewOrder) -> Result<OrderDetails> {
        let mut tables = self.tables.write().await;
        if tables.references.contains_key(&new_order.reference_code) {
            return Err(AppError::Conflict(format!(
                "Reference code '{}' is already taken",
                new_order.reference_code
            )));
        }

        let now = Utc::now();
        let snapshot = new_order.snapshot;
        let order = Order {
            id: Uuid::new_v4(),
            reference_code: new_order.reference_code,
            event_id: snapshot.event_id,
            event_name: snapshot.event_name,
            customer_name: new_order.customer.name,
            customer_email: new_order.customer.email,
            customer_phone: new_order.customer.phone,
            total_amount: snapshot.total_amount,
            status: OrderStatus::PendingVerification,
            rejection_reason: None,
            created_at: now,
            status_changed_at: now,
        };
        let items: Vec<OrderLineItem> = snapshot
            .lines
            .into_iter()
            .map(|line| OrderLineItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                ticket_tier_id: line.tier_id,
                tier_name: line.tier_name,
                quantity: line.quantity,
                unit_price: line.unit_price,
                subtotal: line.subtotal,
            })
            .collect();

        tables
            .references
            .insert(order.reference_code.clone(), order.id);
        tables.orders.insert(order.id, order.clone());
        tables.line_items.insert(order.id, items.clone());

        Ok(OrderDetails {
            order,
            items,
            payment_proof: None,
            tickets: Vec::new(),
        })
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<OrderDetails>> {
        Ok(self.tables.read().await.details(order_id))
    }

    async fn find_order_by_reference(&self, reference_code: &str) -> Result<Option<OrderDetails>> {
        let tables = self.tables.read().await;
        Ok(tables
            .references
            .get(reference_code)
            .and_then(|id| tables.details(*id)))
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<(Vec<Order>, i64)> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|o| filter.status.map_or(true, |s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));

        let total = orders.len() as i64;
        let page = orders
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn record_payment_proof(
        &self,
        order_id: Uuid,
        proof: NewPaymentProof,
    ) -> Result<ProofReplacement> {
        let mut tables = self.tables.write().await;
        tables.pending_order_mut(order_id, "accept a payment proof")?;

        let current = PaymentProof {
            id: Uuid::new_v4(),
            order_id,
            storage_key: proof.storage_key,
            original_file_name: proof.original_file_name,
            file_size: proof.file_size,
            mime_type: proof.mime_type,
            uploaded_at: Utc::now(),
        };
        let previous = tables.proofs.insert(order_id, current.clone());
        debug!(order_id = %order_id, replaced = previous.is_some(), "Recorded payment proof");

        Ok(ProofReplacement { current, previous })
    }

    async fn commit_verification(&self, order_id: Uuid, tickets: &[Ticket]) -> Result<Order> {
        let mut tables = self.tables.write().await;
        tables.pending_order_mut(order_id, "verify")?;

        if tickets
            .iter()
            .any(|t| t.order_id != order_id || tables.credentials.contains_key(&t.credential))
        {
            return Err(AppError::Conflict(
                "Ticket credential collides with an issued ticket".to_string(),
            ));
        }

        for ticket in tickets {
            tables.credentials.insert(ticket.credential.clone(), order_id);
        }
        tables
            .tickets
            .entry(order_id)
            .or_default()
            .extend(tickets.iter().cloned());

        let order = tables.pending_order_mut(order_id, "verify")?;
        order.status = OrderStatus::Verified;
        order.status_changed_at = Utc::now();
        Ok(order.clone())
    }

    async fn commit_rejection(&self, order_id: Uuid, reason: Option<&str>) -> Result<Order> {
        let mut tables = self.tables.write().await;
        let order = tables.pending_order_mut(order_id, "reject")?;
        order.status = OrderStatus::Rejected;
        order.rejection_reason = reason.map(str::to_string);
        order.status_changed_at = Utc::now();
        Ok(order.clone())
    }

    async fn find_ticket_by_credential(&self, credential: &str) -> Result<Option<(Ticket, Order)>> {
        let tables = self.tables.read().await;
        let Some(order_id) = tables.credentials.get(credential) else {
            return Ok(None);
        };
        let ticket = tables
            .tickets
            .get(order_id)
            .and_then(|tickets| tickets.iter().find(|t| t.credential == credential));
        let order = tables.orders.get(order_id);
        Ok(ticket.cloned().zip(order.cloned()))
    }

    async fn order_stats(&self) -> Result<OrderStats> {
        let tables = self.tables.read().await;
        let mut stats = OrderStats::default();
        for order in tables.orders.values() {
            stats.total += 1;
            match order.status {
                OrderStatus::PendingVerification => stats.pending += 1,
                OrderStatus::Verified => {
                    stats.verified += 1;
                    stats.revenue += order.total_amount;
                }
                OrderStatus::Rejected => stats.rejected += 1,
            }
        }
        Ok(stats)
    }

    async fn sales_summary(&self) -> Result<Vec<SalesLine>> {
        let tables = self.tables.read().await;
        let mut grouped: BTreeMap<(String, String, Uuid), (i64, Decimal)> = BTreeMap::new();
        for order in tables
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Verified)
        {
            for item in tables.line_items.get(&order.id).into_iter().flatten() {
                let entry = grouped
                    .entry((order.event_name.clone(), item.tier_name.clone(), order.event_id))
                    .or_insert((0, Decimal::ZERO));
                entry.0 += i64::from(item.quantity);
                entry.1 += item.subtotal;
            }
        }

        Ok(grouped
            .into_iter()
            .map(|((event_name, tier_name, event_id), (tickets, revenue))| SalesLine {
                event_id,
                event_name,
                tier_name,
                tickets,
                revenue,
            })
            .collect())
    }
}
