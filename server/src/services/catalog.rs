use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    EventSummary, EventUpdate, EventWithTiers, NewEvent, NewTicketTier, TicketTier, TierUpdate,
};
use crate::services::pricing::MAX_UNIT_PRICE;
use crate::store::Catalog;
use crate::utils::error::{AppError, Result};

pub struct CatalogService {
    catalog: Arc<dyn Catalog>,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog }
    }

    pub async fn list_events(&self) -> Result<Vec<EventWithTiers>> {
        self.catalog.list_active_events().await
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<EventWithTiers> {
        let event = self
            .catalog
            .get_active_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))?;
        let tiers = self.catalog.get_active_tiers(event_id).await?;
        Ok(EventWithTiers { event, tiers })
    }

    #[tracing::instrument(skip(self, event), fields(name = %event.name))]
    pub async fn create_event(&self, event: NewEvent) -> Result<EventWithTiers> {
        let event = validate_new_event(event)?;
        let created = self.catalog.create_event(event).await?;
        info!(event_id = %created.event.id, tiers = created.tiers.len(), "Event created");
        Ok(created)
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_tier(&self, tier_id: Uuid, update: TierUpdate) -> Result<TicketTier> {
        if update.price.is_none() && update.is_active.is_none() {
            return Err(AppError::validation("tier", "Nothing to update"));
        }
        if let Some(price) = update.price {
            check_price("price", price)?;
        }

        let tier = self
            .catalog
            .update_tier(tier_id, update)
            .await?
            .ok_or_else(|| AppError::NotFound("Ticket tier not found".to_string()))?;
        info!(price = %tier.price, is_active = tier.is_active, "Ticket tier updated");
        Ok(tier)
    }

    pub async fn list_all_events(&self) -> Result<Vec<EventSummary>> {
        self.catalog.list_all_events().await
    }

    #[tracing::instrument(skip(self, update))]
    pub async fn update_event(
        &self,
        event_id: Uuid,
        update: EventUpdate,
    ) -> Result<EventWithTiers> {
        if update.is_empty() {
            return Err(AppError::validation("event", "Nothing to update"));
        }
        let update = validate_event_update(update)?;
        let updated = self.apply_event_update(event_id, update).await?;
        info!(is_active = updated.event.is_active, "Event updated");
        Ok(updated)
    }

    /// Soft delete: the event and its orders stay, it just stops being listed.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate_event(&self, event_id: Uuid) -> Result<EventWithTiers> {
        let update = EventUpdate {
            is_active: Some(false),
            ..EventUpdate::default()
        };
        let deactivated = self.apply_event_update(event_id, update).await?;
        info!("Event deactivated");
        Ok(deactivated)
    }

    async fn apply_event_update(
        &self,
        event_id: Uuid,
        update: EventUpdate,
    ) -> Result<EventWithTiers> {
        self.catalog
            .update_event(event_id, update)
            .await?
            .ok_or_else(|| AppError::NotFound("Event not found".to_string()))
    }
}

fn validate_event_update(update: EventUpdate) -> Result<EventUpdate> {
    let description = match update.description {
        Some(d) => Some(optional("description", Some(d.as_str()), 500)?.unwrap_or_default()),
        None => None,
    };
    Ok(EventUpdate {
        name: update.name.map(|v| bounded("name", &v, 2, 100)).transpose()?,
        starts_at: update.starts_at,
        venue: update.venue.map(|v| bounded("venue", &v, 2, 200)).transpose()?,
        city: update.city.map(|v| bounded("city", &v, 2, 100)).transpose()?,
        description,
        is_active: update.is_active,
    })
}

fn validate_new_event(event: NewEvent) -> Result<NewEvent> {
    let name = bounded("name", &event.name, 2, 100)?;
    let venue = bounded("venue", &event.venue, 2, 200)?;
    let city = bounded("city", &event.city, 2, 100)?;
    let description = optional("description", event.description.as_deref(), 500)?;

    if event.tiers.is_empty() {
        return Err(AppError::validation(
            "tiers",
            "At least one ticket tier is required",
        ));
    }

    let tiers = event
        .tiers
        .iter()
        .enumerate()
        .map(|(i, tier)| -> Result<NewTicketTier> {
            check_price(&format!("tiers[{}].price", i), tier.price)?;
            Ok(NewTicketTier {
                name: bounded(&format!("tiers[{}].name", i), &tier.name, 2, 50)?,
                price: tier.price,
                description: optional(
                    &format!("tiers[{}].description", i),
                    tier.description.as_deref(),
                    200,
                )?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(NewEvent {
        name,
        starts_at: event.starts_at,
        venue,
        city,
        description,
        tiers,
    })
}

fn bounded(field: &str, value: &str, min: usize, max: usize) -> Result<String> {
    let value = value.trim();
    let len = value.chars().count();
    if len < min || len > max {
        return Err(AppError::validation(
            field,
            format!("Must be between {} and {} characters", min, max),
        ));
    }
    Ok(value.to_string())
}

fn optional(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) if v.chars().count() > max => Err(AppError::validation(
            field,
            format!("Must be at most {} characters", max),
        )),
        Some(v) => Ok(Some(v.to_string())),
    }
}

fn check_price(field: &str, price: Decimal) -> Result<()> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(AppError::validation(field, "Price cannot be negative"));
    }
    if price > MAX_UNIT_PRICE {
        return Err(AppError::validation(
            field,
            format!("Price cannot exceed {}", MAX_UNIT_PRICE),
        ));
    }
    if price.normalize().scale() > 2 {
        return Err(AppError::validation(
            field,
            "Price must have at most 2 decimal places",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn service() -> CatalogService {
        CatalogService::new(Arc::new(MemoryStore::new()))
    }

    fn new_event(name: &str) -> NewEvent {
        NewEvent {
            name: name.into(),
            starts_at: Utc::now(),
            venue: "  Grand Hall ".into(),
            city: "Springfield".into(),
            description: Some("   ".into()),
            tiers: vec![
                NewTicketTier {
                    name: "VIP".into(),
                    price: Decimal::new(12000, 2),
                    description: None,
                },
                NewTicketTier {
                    name: "Standing".into(),
                    price: Decimal::new(7500, 2),
                    description: None,
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_create_and_get_event() {
        let service = service();
        let created = service.create_event(new_event("Spring Prom")).await.unwrap();
        assert_eq!(created.event.venue, "Grand Hall");
        assert!(created.event.description.is_none());

        let fetched = service.get_event(created.event.id).await.unwrap();
        let names: Vec<_> = fetched.tiers.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Standing", "VIP"]);

        let dup = service.create_event(new_event("Spring Prom")).await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_create_event_validation() {
        let service = service();

        let mut event = new_event("X");
        let err = service.create_event(event.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError { ref field, .. } if field == "name"));

        event = new_event("Spring Prom");
        event.tiers.clear();
        let err = service.create_event(event).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError { ref field, .. } if field == "tiers"));

        let mut event = new_event("Spring Prom");
        event.tiers[1].price = Decimal::new(-1, 0);
        let err = service.create_event(event).await.unwrap_err();
        assert!(
            matches!(err, AppError::ValidationError { ref field, .. } if field == "tiers[1].price")
        );

        let mut event = new_event("Spring Prom");
        event.tiers[0].price = Decimal::new(12345, 3);
        assert!(service.create_event(event).await.is_err());
    }

    #[tokio::test]
    async fn test_update_tier() {
        let service = service();
        let created = service.create_event(new_event("Spring Prom")).await.unwrap();
        let vip = created.tiers[0].id;

        let updated = service
            .update_tier(
                vip,
                TierUpdate {
                    price: Some(Decimal::new(15000, 2)),
                    is_active: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.price, Decimal::new(15000, 2));

        service
            .update_tier(
                vip,
                TierUpdate {
                    price: None,
                    is_active: Some(false),
                },
            )
            .await
            .unwrap();
        let fetched = service.get_event(created.event.id).await.unwrap();
        assert_eq!(fetched.tiers.len(), 1);

        let missing = service
            .update_tier(
                Uuid::new_v4(),
                TierUpdate {
                    price: Some(Decimal::ONE),
                    is_active: None,
                },
            )
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));

        let empty = service.update_tier(vip, TierUpdate::default()).await;
        assert!(matches!(empty, Err(AppError::ValidationError { .. })));
    }

    #[tokio::test]
    async fn test_prices_above_column_precision_are_rejected() {
        let service = service();

        let mut event = new_event("Spring Prom");
        event.tiers[0].price = Decimal::MAX;
        let err = service.create_event(event).await.unwrap_err();
        assert!(
            matches!(err, AppError::ValidationError { ref field, .. } if field == "tiers[0].price")
        );

        let mut event = new_event("Spring Prom");
        event.tiers[0].price = MAX_UNIT_PRICE;
        let created = service.create_event(event).await.unwrap();

        let err = service
            .update_tier(
                created.tiers[1].id,
                TierUpdate {
                    price: Some(MAX_UNIT_PRICE + Decimal::new(1, 2)),
                    is_active: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError { ref field, .. } if field == "price"));
    }

    #[tokio::test]
    async fn test_update_event() {
        let service = service();
        let mut first = new_event("Spring Prom");
        first.description = Some("Formal dress".into());
        let created = service.create_event(first).await.unwrap();
        service.create_event(new_event("Winter Ball")).await.unwrap();

        let updated = service
            .update_event(
                created.event.id,
                EventUpdate {
                    venue: Some("  Rooftop ".into()),
                    description: Some("  ".into()),
                    ..EventUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.event.venue, "Rooftop");
        assert_eq!(updated.event.name, "Spring Prom");
        assert!(updated.event.description.is_none());
        assert_eq!(updated.tiers.len(), 2);

        let taken = service
            .update_event(
                created.event.id,
                EventUpdate {
                    name: Some("Winter Ball".into()),
                    ..EventUpdate::default()
                },
            )
            .await;
        assert!(matches!(taken, Err(AppError::Conflict(_))));

        let short = service
            .update_event(
                created.event.id,
                EventUpdate {
                    city: Some("X".into()),
                    ..EventUpdate::default()
                },
            )
            .await;
        assert!(
            matches!(short, Err(AppError::ValidationError { ref field, .. }) if field == "city")
        );

        let empty = service
            .update_event(created.event.id, EventUpdate::default())
            .await;
        assert!(
            matches!(empty, Err(AppError::ValidationError { ref field, .. }) if field == "event")
        );

        let missing = service
            .update_event(
                Uuid::new_v4(),
                EventUpdate {
                    is_active: Some(true),
                    ..EventUpdate::default()
                },
            )
            .await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_deactivated_events_stay_in_the_admin_listing() {
        let service = service();
        let mut later = new_event("Winter Ball");
        later.starts_at = Utc::now() + chrono::Duration::days(30);
        let later = service.create_event(later).await.unwrap();
        let sooner = service.create_event(new_event("Spring Prom")).await.unwrap();

        service
            .update_tier(
                sooner.tiers[0].id,
                TierUpdate {
                    price: None,
                    is_active: Some(false),
                },
            )
            .await
            .unwrap();
        let deactivated = service.deactivate_event(later.event.id).await.unwrap();
        assert!(!deactivated.event.is_active);

        let public = service.list_events().await.unwrap();
        assert_eq!(public.len(), 1);
        assert!(matches!(
            service.get_event(later.event.id).await,
            Err(AppError::NotFound(_))
        ));

        let all = service.list_all_events().await.unwrap();
        let names: Vec<_> = all.iter().map(|e| e.event.name.as_str()).collect();
        assert_eq!(names, vec!["Spring Prom", "Winter Ball"]);
        let prices: Vec<_> = all[0].tiers.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![Decimal::new(7500, 2), Decimal::new(12000, 2)]);
        assert!(all.iter().all(|e| e.order_count == 0));

        let missing = service.deactivate_event(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_get_unknown_event() {
        let err = service().get_event(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
