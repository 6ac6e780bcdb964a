//! Validates a purchase request against the live catalog and freezes the
//! prices it finds into an immutable snapshot.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::TicketTier;
use crate::store::Catalog;
use crate::utils::error::{AppError, Result};

pub const MIN_QUANTITY: i32 = 1;
pub const MAX_QUANTITY: i32 = 10;
/// 99,999,999.99, the largest value a `NUMERIC(10, 2)` price column holds.
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(0x540B_E3FF, 0x2, 0, false, 2);
/// 9,999,999,999.99, the largest value a `NUMERIC(12, 2)` total column holds.
pub const MAX_ORDER_TOTAL: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRequest {
    pub ticket_tier_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricedLine {
    pub tier_id: Uuid,
    pub tier_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

impl PricedLine {
    fn from_tier(tier: &TicketTier, quantity: i32) -> Option<Self> {
        let subtotal = tier.price.checked_mul(Decimal::from(quantity))?;
        Some(PricedLine {
            tier_id: tier.id,
            tier_name: tier.name.clone(),
            quantity,
            unit_price: tier.price,
            subtotal,
        })
    }
}

fn amount_too_large(field: String) -> AppError {
    AppError::validation(
        field,
        format!("Order amount exceeds the maximum of {}", MAX_ORDER_TOTAL),
    )
}

/// Prices as they were when the order was placed.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingSnapshot {
    pub event_id: Uuid,
    pub event_name: String,
    pub lines: Vec<PricedLine>,
    pub total_amount: Decimal,
}

impl PricingSnapshot {
    pub fn ticket_units(&self) -> i32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

/// Checks shape before touching the catalog, so malformed input never costs a lookup.
fn check_request_shape(requested: &[LineRequest]) -> Result<()> {
    if requested.is_empty() {
        return Err(AppError::validation("items", "At least one item required"));
    }

    let mut seen = HashSet::with_capacity(requested.len());
    for (i, line) in requested.iter().enumerate() {
        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&line.quantity) {
            return Err(AppError::validation(
                format!("items[{}].quantity", i),
                format!(
                    "Quantity for ticket type '{}' must be {}-{}",
                    line.ticket_tier_id, MIN_QUANTITY, MAX_QUANTITY
                ),
            ));
        }
        if !seen.insert(line.ticket_tier_id) {
            return Err(AppError::validation(
                format!("items[{}].ticket_tier_id", i),
                format!("Ticket type '{}' is listed more than once", line.ticket_tier_id),
            ));
        }
    }
    Ok(())
}

pub async fn snapshot<C>(catalog: &C, event_id: Uuid, requested: &[LineRequest]) -> Result<PricingSnapshot>
where
    C: Catalog + ?Sized,
{
    check_request_shape(requested)?;

    let event = catalog
        .get_active_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{}' not found or inactive", event_id)))?;

    let mut lines = Vec::with_capacity(requested.len());
    for (i, line) in requested.iter().enumerate() {
        let tier = catalog
            .get_active_tier(line.ticket_tier_id, event.id)
            .await?
            .ok_or_else(|| {
                AppError::validation(
                    format!("items[{}].ticket_tier_id", i),
                    format!("Invalid ticket type: {}", line.ticket_tier_id),
                )
            })?;
        let field = format!("items[{}].quantity", i);
        let priced = PricedLine::from_tier(&tier, line.quantity)
            .filter(|l| l.subtotal <= MAX_ORDER_TOTAL)
            .ok_or_else(|| amount_too_large(field))?;
        lines.push(priced);
    }

    let total_amount = lines
        .iter()
        .try_fold(Decimal::ZERO, |total, l| total.checked_add(l.subtotal))
        .filter(|total| *total <= MAX_ORDER_TOTAL)
        .ok_or_else(|| amount_too_large("items".to_string()))?;

    Ok(PricingSnapshot {
        event_id: event.id,
        event_name: event.name,
        lines,
        total_amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewEvent, NewTicketTier, TierUpdate};
    use crate::store::MemoryStore;
    use chrono::Utc;

    async fn seeded() -> (MemoryStore, Uuid, Uuid, Uuid) {
        let store = MemoryStore::new();
        let event = store
            .create_event(NewEvent {
                name: "Spring Prom".into(),
                starts_at: Utc::now(),
                venue: "Grand Hall".into(),
                city: "Springfield".into(),
                description: None,
                tiers: vec![
                    NewTicketTier {
                        name: "Standing".into(),
                        price: Decimal::new(7500, 2),
                        description: None,
                    },
                    NewTicketTier {
                        name: "VIP".into(),
                        price: Decimal::new(12000, 2),
                        description: None,
                    },
                ],
            })
            .await
            .unwrap();
        let standing = event.tiers[0].id;
        let vip = event.tiers[1].id;
        (store, event.event.id, standing, vip)
    }

    fn line(ticket_tier_id: Uuid, quantity: i32) -> LineRequest {
        LineRequest {
            ticket_tier_id,
            quantity,
        }
    }

    #[tokio::test]
    async fn test_totals_are_exact_sums() {
        let (store, event_id, standing, vip) = seeded().await;
        let snap = snapshot(&store, event_id, &[line(standing, 2), line(vip, 1)])
            .await
            .unwrap();

        assert_eq!(snap.total_amount, Decimal::new(27000, 2));
        assert_eq!(snap.lines[0].subtotal, Decimal::new(15000, 2));
        assert_eq!(snap.lines[1].unit_price, Decimal::new(12000, 2));
        assert_eq!(snap.ticket_units(), 3);
        assert_eq!(snap.event_name, "Spring Prom");
    }

    #[tokio::test]
    async fn test_snapshot_is_detached_from_later_price_changes() {
        let (store, event_id, standing, _) = seeded().await;
        let snap = snapshot(&store, event_id, &[line(standing, 3)]).await.unwrap();

        store
            .update_tier(
                standing,
                TierUpdate {
                    price: Some(Decimal::new(9900, 2)),
                    is_active: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(snap.lines[0].unit_price, Decimal::new(7500, 2));
        assert_eq!(snap.total_amount, Decimal::new(22500, 2));
    }

    #[tokio::test]
    async fn test_out_of_range_quantities_are_rejected_not_clamped() {
        let (store, event_id, standing, vip) = seeded().await;
        for qty in [0, -1, 11] {
            let err = snapshot(&store, event_id, &[line(vip, 1), line(standing, qty)])
                .await
                .unwrap_err();
            match err {
                AppError::ValidationError { field, .. } => assert_eq!(field, "items[1].quantity"),
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_foreign_or_inactive_tier_names_the_line() {
        let (store, event_id, standing, vip) = seeded().await;
        store
            .update_tier(
                vip,
                TierUpdate {
                    price: None,
                    is_active: Some(false),
                },
            )
            .await
            .unwrap();

        let err = snapshot(&store, event_id, &[line(standing, 1), line(vip, 1)])
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::ValidationError { ref field, .. } if field == "items[1].ticket_tier_id")
        );

        let err = snapshot(&store, event_id, &[line(Uuid::new_v4(), 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError { .. }));
    }

    #[test]
    fn test_amount_limits_match_column_precision() {
        assert_eq!(MAX_UNIT_PRICE, Decimal::new(9_999_999_999, 2));
        assert_eq!(MAX_ORDER_TOTAL, Decimal::new(999_999_999_999, 2));
    }

    #[tokio::test]
    async fn test_overflowing_amounts_are_validation_errors() {
        let store = MemoryStore::new();
        let event = store
            .create_event(NewEvent {
                name: "Gold Gala".into(),
                starts_at: Utc::now(),
                venue: "Vault".into(),
                city: "Springfield".into(),
                description: None,
                tiers: vec![NewTicketTier {
                    name: "Everything".into(),
                    price: Decimal::MAX,
                    description: None,
                }],
            })
            .await
            .unwrap();

        let err = snapshot(&store, event.event.id, &[line(event.tiers[0].id, 2)])
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::ValidationError { ref field, .. } if field == "items[0].quantity")
        );
    }

    #[tokio::test]
    async fn test_total_above_column_limit_is_rejected() {
        let store = MemoryStore::new();
        let tiers = (0..11)
            .map(|i| NewTicketTier {
                name: format!("Tier {}", i),
                price: MAX_UNIT_PRICE,
                description: None,
            })
            .collect();
        let event = store
            .create_event(NewEvent {
                name: "Big Night".into(),
                starts_at: Utc::now(),
                venue: "Arena".into(),
                city: "Springfield".into(),
                description: None,
                tiers,
            })
            .await
            .unwrap();

        let ok = snapshot(&store, event.event.id, &[line(event.tiers[0].id, 10)])
            .await
            .unwrap();
        assert_eq!(ok.total_amount, Decimal::new(9_999_999_999, 1));

        let lines: Vec<_> = event.tiers.iter().map(|t| line(t.id, 10)).collect();
        let err = snapshot(&store, event.event.id, &lines).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError { ref field, .. } if field == "items"));
    }

    #[tokio::test]
    async fn test_missing_event_and_empty_or_duplicate_items() {
        let (store, event_id, standing, _) = seeded().await;

        let err = snapshot(&store, Uuid::new_v4(), &[line(standing, 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = snapshot(&store, event_id, &[]).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError { ref field, .. } if field == "items"));

        let err = snapshot(&store, event_id, &[line(standing, 1), line(standing, 2)])
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::ValidationError { ref field, .. } if field == "items[1].ticket_tier_id")
        );
    }
}
