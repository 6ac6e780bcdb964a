//! Postgres-backed store.
//!
//! Status transitions are conditional `UPDATE ... WHERE status = 'PENDING_VERIFICATION'`
//! statements; a zero-row result is reported as `InvalidState` (or `NotFound`),
//! never ignored.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use super::{transition_refused, Catalog, NewOrder, OrderStore, ReferenceIndex};
use crate::models::{
    Event, EventSummary, EventUpdate, EventWithTiers, NewEvent, NewPaymentProof, Order,
    OrderDetails, OrderFilter, OrderLineItem, OrderStats, OrderStatus, PaymentProof,
    ProofReplacement, SalesLine, Ticket, TicketTier, TierUpdate,
};
use crate::utils::error::{AppError, Result};

const LINE_ITEM_COLUMNS: &str =
    "id, order_id, ticket_tier_id, tier_name, quantity, unit_price, subtotal";

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, order_id: Uuid) -> Result<Option<OrderStatus>> {
        let status = sqlx::query_scalar::<_, OrderStatus>("SELECT status FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(status)
    }

    async fn load_details(&self, order: Order) -> Result<OrderDetails> {
        let items = sqlx::query_as::<_, OrderLineItem>(&format!(
            "SELECT {} FROM order_line_items WHERE order_id = $1 ORDER BY position",
            LINE_ITEM_COLUMNS
        ))
        .bind(order.id)
        .fetch_all(&self.pool)
        .await?;

        let payment_proof =
            sqlx::query_as::<_, PaymentProof>("SELECT * FROM payment_proofs WHERE order_id = $1")
                .bind(order.id)
                .fetch_optional(&self.pool)
                .await?;

        let tickets = sqlx::query_as::<_, Ticket>(
            "SELECT * FROM tickets WHERE order_id = $1 ORDER BY created_at, id",
        )
        .bind(order.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(OrderDetails {
            order,
            items,
            payment_proof,
            tickets,
        })
    }
}

#[async_trait]
impl Catalog for PgStore {
    async fn list_active_events(&self) -> Result<Vec<EventWithTiers>> {
        let events = sqlx::query_as::<_, Event>(
            "SELECT * FROM events WHERE is_active ORDER BY starts_at",
        )
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        let tiers = sqlx::query_as::<_, TicketTier>(
            "SELECT * FROM ticket_tiers WHERE is_active AND event_id = ANY($1) ORDER BY price, name",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_event: HashMap<Uuid, Vec<TicketTier>> = HashMap::new();
        for tier in tiers {
            by_event.entry(tier.event_id).or_default().push(tier);
        }

        Ok(events
            .into_iter()
            .map(|event| {
                let tiers = by_event.remove(&event.id).unwrap_or_default();
                EventWithTiers { event, tiers }
            })
            .collect())
    }

    async fn get_active_event(&self, event_id: Uuid) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1 AND is_active")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn get_active_tiers(&self, event_id: Uuid) -> Result<Vec<TicketTier>> {
        let tiers = sqlx::query_as::<_, TicketTier>(
            "SELECT * FROM ticket_tiers WHERE event_id = $1 AND is_active ORDER BY price, name",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(tiers)
    }

    async fn get_active_tier(&self, tier_id: Uuid, event_id: Uuid) -> Result<Option<TicketTier>> {
        let tier = sqlx::query_as::<_, TicketTier>(
            "SELECT * FROM ticket_tiers WHERE id = $1 AND event_id = $2 AND is_active",
        )
        .bind(tier_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tier)
    }

    async fn create_event(&self, new_event: NewEvent) -> Result<EventWithTiers> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        let event = sqlx::query_as::<_, Event>(
            "INSERT INTO events (id, name, starts_at, venue, city, description, is_active, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, TRUE, $7, $7)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&new_event.name)
        .bind(new_event.starts_at)
        .bind(&new_event.venue)
        .bind(&new_event.city)
        .bind(&new_event.description)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!("Event '{}' already exists", new_event.name))
            } else {
                AppError::DatabaseError(e)
            }
        })?;

        let mut tiers = Vec::with_capacity(new_event.tiers.len());
        for tier in &new_event.tiers {
            let tier = sqlx::query_as::<_, TicketTier>(
                "INSERT INTO ticket_tiers (id, event_id, name, description, price, is_active, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, TRUE, $6, $6)
                 RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(event.id)
            .bind(&tier.name)
            .bind(&tier.description)
            .bind(tier.price)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            tiers.push(tier);
        }

        tx.commit().await?;
        Ok(EventWithTiers { event, tiers })
    }

    async fn update_tier(&self, tier_id: Uuid, update: TierUpdate) -> Result<Option<TicketTier>> {
        let tier = sqlx::query_as::<_, TicketTier>(
            "UPDATE ticket_tiers
             SET price = COALESCE($2, price),
                 is_active = COALESCE($3, is_active),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(tier_id)
        .bind(update.price)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(tier)
    }

    async fn list_all_events(&self) -> Result<Vec<EventSummary>> {
        let events = sqlx::query_as::<_, Event>("SELECT * FROM events ORDER BY starts_at")
            .fetch_all(&self.pool)
            .await?;

        let tiers = sqlx::query_as::<_, TicketTier>(
            "SELECT * FROM ticket_tiers ORDER BY price, name",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut by_event: HashMap<Uuid, Vec<TicketTier>> = HashMap::new();
        for tier in tiers {
            by_event.entry(tier.event_id).or_default().push(tier);
        }

        let counts: HashMap<Uuid, i64> = sqlx::query_as::<_, (Uuid, i64)>(
            "SELECT event_id, COUNT(*) FROM orders GROUP BY event_id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        Ok(events
            .into_iter()
            .map(|event| EventSummary {
                tiers: by_event.remove(&event.id).unwrap_or_default(),
                order_count: counts.get(&event.id).copied().unwrap_or(0),
                event,
            })
            .collect())
    }

    async fn update_event(
        &self,
        event_id: Uuid,
        update: EventUpdate,
    ) -> Result<Option<EventWithTiers>> {
        let event = sqlx::query_as::<_, Event>(
            "UPDATE events
             SET name = COALESCE($2, name),
                 starts_at = COALESCE($3, starts_at),
                 venue = COALESCE($4, venue),
                 city = COALESCE($5, city),
                 description = CASE WHEN $6::TEXT IS NULL THEN description ELSE NULLIF($6, '') END,
                 is_active = COALESCE($7, is_active),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(event_id)
        .bind(&update.name)
        .bind(update.starts_at)
        .bind(&update.venue)
        .bind(&update.city)
        .bind(&update.description)
        .bind(update.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!(
                    "Event '{}' already exists",
                    update.name.as_deref().unwrap_or_default()
                ))
            } else {
                AppError::DatabaseError(e)
            }
        })?;

        let Some(event) = event else {
            return Ok(None);
        };
        let tiers = sqlx::query_as::<_, TicketTier>(
            "SELECT * FROM ticket_tiers WHERE event_id = $1 ORDER BY price, name",
        )
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(Some(EventWithTiers { event, tiers }))
    }
}

#[async_trait]
impl ReferenceIndex for PgStore {
    async fn reference_exists(&self, reference_code: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM orders WHERE reference_code = $1)",
        )
        .bind(reference_code)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert_order(&self, new_order: NewOrder) -> Result<OrderDetails> {
        let now = Utc::now();
        let snapshot = new_order.snapshot;
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(
            "INSERT INTO orders (id, reference_code, event_id, event_name, customer_name,
                                 customer_email, customer_phone, total_amount, status,
                                 created_at, status_changed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(&new_order.reference_code)
        .bind(snapshot.event_id)
        .bind(&snapshot.event_name)
        .bind(&new_order.customer.name)
        .bind(&new_order.customer.email)
        .bind(&new_order.customer.phone)
        .bind(snapshot.total_amount)
        .bind(OrderStatus::PendingVerification)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict(format!(
                    "Reference code '{}' is already taken",
                    new_order.reference_code
                ))
            } else {
                AppError::DatabaseError(e)
            }
        })?;

        let mut items = Vec::with_capacity(snapshot.lines.len());
        for (position, line) in snapshot.lines.iter().enumerate() {
            let item = sqlx::query_as::<_, OrderLineItem>(&format!(
                "INSERT INTO order_line_items
                     (id, order_id, ticket_tier_id, tier_name, quantity, unit_price, subtotal, position)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                 RETURNING {}",
                LINE_ITEM_COLUMNS
            ))
            .bind(Uuid::new_v4())
            .bind(order.id)
            .bind(line.tier_id)
            .bind(&line.tier_name)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.subtotal)
            .bind(position as i32)
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        tx.commit().await?;

        Ok(OrderDetails {
            order,
            items,
            payment_proof: None,
            tickets: Vec::new(),
        })
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<OrderDetails>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        match order {
            Some(order) => Ok(Some(self.load_details(order).await?)),
            None => Ok(None),
        }
    }

    async fn find_order_by_reference(&self, reference_code: &str) -> Result<Option<OrderDetails>> {
        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE reference_code = $1")
            .bind(reference_code)
            .fetch_optional(&self.pool)
            .await?;
        match order {
            Some(order) => Ok(Some(self.load_details(order).await?)),
            None => Ok(None),
        }
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<(Vec<Order>, i64)> {
        let orders = sqlx::query_as::<_, Order>(
            "SELECT * FROM orders
             WHERE ($1::order_status IS NULL OR status = $1)
             ORDER BY created_at DESC, id DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(filter.status)
        .bind(i64::from(filter.limit()))
        .bind(filter.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM orders WHERE ($1::order_status IS NULL OR status = $1)",
        )
        .bind(filter.status)
        .fetch_one(&self.pool)
        .await?;

        Ok((orders, total))
    }

    async fn record_payment_proof(
        &self,
        order_id: Uuid,
        proof: NewPaymentProof,
    ) -> Result<ProofReplacement> {
        let mut tx = self.pool.begin().await?;

        let status = sqlx::query_scalar::<_, OrderStatus>(
            "SELECT status FROM orders WHERE id = $1 FOR UPDATE",
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;
        if status != Some(OrderStatus::PendingVerification) {
            return Err(transition_refused(order_id, status, "accept a payment proof"));
        }

        let previous =
            sqlx::query_as::<_, PaymentProof>("SELECT * FROM payment_proofs WHERE order_id = $1")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?;

        let current = sqlx::query_as::<_, PaymentProof>(
            "INSERT INTO payment_proofs
                 (id, order_id, storage_key, original_file_name, file_size, mime_type, uploaded_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (order_id) DO UPDATE SET
                 id = EXCLUDED.id,
                 storage_key = EXCLUDED.storage_key,
                 original_file_name = EXCLUDED.original_file_name,
                 file_size = EXCLUDED.file_size,
                 mime_type = EXCLUDED.mime_type,
                 uploaded_at = EXCLUDED.uploaded_at
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(order_id)
        .bind(&proof.storage_key)
        .bind(&proof.original_file_name)
        .bind(proof.file_size)
        .bind(&proof.mime_type)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ProofReplacement { current, previous })
    }

    async fn commit_verification(&self, order_id: Uuid, tickets: &[Ticket]) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let order = sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = $2, status_changed_at = $3
             WHERE id = $1 AND status = $4
             RETURNING *",
        )
        .bind(order_id)
        .bind(OrderStatus::Verified)
        .bind(Utc::now())
        .bind(OrderStatus::PendingVerification)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(order) = order else {
            drop(tx);
            let current = self.current_status(order_id).await?;
            return Err(transition_refused(order_id, current, "verify"));
        };

        for ticket in tickets {
            sqlx::query(
                "INSERT INTO tickets (id, order_id, tier_name, credential, created_at)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(ticket.id)
            .bind(order_id)
            .bind(&ticket.tier_name)
            .bind(&ticket.credential)
            .bind(ticket.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AppError::Conflict(
                        "Ticket credential collides with an issued ticket".to_string(),
                    )
                } else {
                    AppError::DatabaseError(e)
                }
            })?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn commit_rejection(&self, order_id: Uuid, reason: Option<&str>) -> Result<Order> {
        let order = sqlx::query_as::<_, Order>(
            "UPDATE orders SET status = $2, rejection_reason = $3, status_changed_at = $4
             WHERE id = $1 AND status = $5
             RETURNING *",
        )
        .bind(order_id)
        .bind(OrderStatus::Rejected)
        .bind(reason)
        .bind(Utc::now())
        .bind(OrderStatus::PendingVerification)
        .fetch_optional(&self.pool)
        .await?;

        match order {
            Some(order) => Ok(order),
            None => {
                let current = self.current_status(order_id).await?;
                Err(transition_refused(order_id, current, "reject"))
            }
        }
    }

    async fn find_ticket_by_credential(&self, credential: &str) -> Result<Option<(Ticket, Order)>> {
        let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE credential = $1")
            .bind(credential)
            .fetch_optional(&self.pool)
            .await?;
        let Some(ticket) = ticket else {
            return Ok(None);
        };

        let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
            .bind(ticket.order_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(Some((ticket, order)))
    }

    async fn order_stats(&self) -> Result<OrderStats> {
        let (total, pending, verified, rejected, revenue) =
            sqlx::query_as::<_, (i64, i64, i64, i64, Decimal)>(
                "SELECT COUNT(*),
                        COUNT(*) FILTER (WHERE status = 'PENDING_VERIFICATION'),
                        COUNT(*) FILTER (WHERE status = 'VERIFIED'),
                        COUNT(*) FILTER (WHERE status = 'REJECTED'),
                        COALESCE(SUM(total_amount) FILTER (WHERE status = 'VERIFIED'), 0)
                 FROM orders",
            )
            .fetch_one(&self.pool)
            .await?;

        Ok(OrderStats {
            total,
            pending,
            verified,
            rejected,
            revenue,
        })
    }

    async fn sales_summary(&self) -> Result<Vec<SalesLine>> {
        let lines = sqlx::query_as::<_, SalesLine>(
            "SELECT o.event_id, o.event_name, li.tier_name,
                    SUM(li.quantity)::BIGINT AS tickets,
                    SUM(li.subtotal) AS revenue
             FROM orders o
             JOIN order_line_items li ON li.order_id = o.id
             WHERE o.status = 'VERIFIED'
             GROUP BY o.event_id, o.event_name, li.tier_name
             ORDER BY o.event_name, li.tier_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }
}
