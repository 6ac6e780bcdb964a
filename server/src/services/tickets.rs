//! Ticket issuance and entry-gate credential checks.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    CredentialCheck, CredentialPayload, IssuedTicket, OrderDetails, OrderStatus, Ticket,
};
use crate::store::OrderStore;
use crate::utils::error::{AppError, Result};

const QR_MIN_DIMENSION: u32 = 256;

/// Renders a credential payload as an SVG QR code. Pure: the same payload
/// always yields the same image.
pub fn render_credential(payload: &str) -> Result<String> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::H).map_err(
        |e| AppError::InternalServerError(format!("Credential cannot be encoded as QR: {}", e)),
    )?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
        .quiet_zone(true)
        .build())
}

pub fn credential_data_url(payload: &str) -> Result<String> {
    let image = render_credential(payload)?;
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(image)))
}

pub fn parse_credential(raw: &str) -> Result<CredentialPayload> {
    serde_json::from_str(raw.trim())
        .map_err(|_| AppError::validation("credential", "Invalid QR code format"))
}

/// Attaches rendered images to already issued tickets.
pub fn with_images(tickets: &[Ticket]) -> Result<Vec<IssuedTicket>> {
    tickets
        .iter()
        .map(|ticket| {
            Ok(IssuedTicket {
                qr_code: credential_data_url(&ticket.credential)?,
                ticket: ticket.clone(),
            })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TicketIssuer;

impl TicketIssuer {
    pub fn new() -> Self {
        TicketIssuer
    }

    /// Builds one ticket per purchased unit. Nothing is persisted here; the
    /// caller stores the result together with the status transition.
    pub fn issue(&self, details: &OrderDetails) -> Result<Vec<IssuedTicket>> {
        let expected = details.ticket_units();
        if expected == 0 {
            return Err(AppError::InternalServerError(format!(
                "Order {} has no ticket units to issue",
                details.order.id
            )));
        }

        let issued_at = Utc::now();
        let mut issued = Vec::with_capacity(expected);
        for item in &details.items {
            for _ in 0..item.quantity {
                let payload = CredentialPayload {
                    ticket_id: Uuid::new_v4(),
                    reference_code: details.order.reference_code.clone(),
                    tier: item.tier_name.clone(),
                    event: details.order.event_name.clone(),
                    issued_at,
                };
                let credential = serde_json::to_string(&payload).map_err(|e| {
                    AppError::InternalServerError(format!("Credential serialization failed: {}", e))
                })?;
                let qr_code = credential_data_url(&credential)?;

                issued.push(IssuedTicket {
                    ticket: Ticket {
                        id: payload.ticket_id,
                        order_id: details.order.id,
                        tier_name: item.tier_name.clone(),
                        credential,
                        created_at: issued_at,
                    },
                    qr_code,
                });
            }
        }

        if issued.len() != expected {
            return Err(AppError::InternalServerError(format!(
                "Issued {} tickets for order {}, expected {}",
                issued.len(),
                details.order.id,
                expected
            )));
        }

        debug!(
            order_id = %details.order.id,
            tickets = issued.len(),
            "Prepared tickets"
        );
        Ok(issued)
    }
}

/// Read-only lookup of a scanned credential.
pub async fn check_credential<S>(store: &S, raw: &str) -> Result<CredentialCheck>
where
    S: OrderStore + ?Sized,
{
    let raw = raw.trim();
    parse_credential(raw)?;

    let (ticket, order) = store
        .find_ticket_by_credential(raw)
        .await?
        .ok_or_else(|| AppError::NotFound("Ticket not found".to_string()))?;

    if order.status != OrderStatus::Verified {
        return Err(AppError::InvalidState(format!(
            "Order is {}, ticket is not valid",
            order.status
        )));
    }

    Ok(CredentialCheck {
        ticket_id: ticket.id,
        tier_name: ticket.tier_name,
        event_name: order.event_name,
        order_reference: order.reference_code,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Order, OrderLineItem};
    use rust_decimal::Decimal;
    use std::collections::HashSet;

    fn details(event_name: &str, lines: &[(&str, i32)]) -> OrderDetails {
        let order_id = Uuid::new_v4();
        let now = Utc::now();
        OrderDetails {
            order: Order {
                id: order_id,
                reference_code: "PULSE-20261016-ABC123".into(),
                event_id: Uuid::new_v4(),
                event_name: event_name.into(),
                customer_name: "Ada".into(),
                customer_email: "ada@example.com".into(),
                customer_phone: "5550109999".into(),
                total_amount: Decimal::ZERO,
                status: OrderStatus::PendingVerification,
                rejection_reason: None,
                created_at: now,
                status_changed_at: now,
            },
            items: lines
                .iter()
                .map(|(tier, qty)| OrderLineItem {
                    id: Uuid::new_v4(),
                    order_id,
                    ticket_tier_id: Uuid::new_v4(),
                    tier_name: tier.to_string(),
                    quantity: *qty,
                    unit_price: Decimal::ZERO,
                    subtotal: Decimal::ZERO,
                })
                .collect(),
            payment_proof: None,
            tickets: Vec::new(),
        }
    }

    #[test]
    fn test_issues_one_distinct_ticket_per_unit() {
        let order = details("Spring Prom", &[("Standing", 2), ("VIP", 1)]);
        let issued = TicketIssuer::new().issue(&order).unwrap();

        assert_eq!(issued.len(), 3);
        let credentials: HashSet<_> = issued.iter().map(|t| &t.ticket.credential).collect();
        assert_eq!(credentials.len(), 3);
        let vip: Vec<_> = issued.iter().filter(|t| t.ticket.tier_name == "VIP").collect();
        assert_eq!(vip.len(), 1);
        assert!(issued
            .iter()
            .all(|t| t.qr_code.starts_with("data:image/svg+xml;base64,")));
    }

    #[test]
    fn test_payload_carries_copied_descriptions_only() {
        let order = details("Spring Prom", &[("VIP", 1)]);
        let issued = TicketIssuer::new().issue(&order).unwrap();
        let payload = parse_credential(&issued[0].ticket.credential).unwrap();

        assert_eq!(payload.ticket_id, issued[0].ticket.id);
        assert_eq!(payload.reference_code, "PULSE-20261016-ABC123");
        assert_eq!(payload.tier, "VIP");
        assert_eq!(payload.event, "Spring Prom");
        assert!(!issued[0].ticket.credential.contains(&order.order.id.to_string()));
    }

    #[test]
    fn test_rendering_is_pure() {
        let first = render_credential("{\"ticket_id\":\"x\"}").unwrap();
        let second = render_credential("{\"ticket_id\":\"x\"}").unwrap();
        assert_eq!(first, second);
        assert!(first.contains("<svg"));
    }

    #[test]
    fn test_oversized_payload_fails_issuance() {
        let huge = "X".repeat(4000);
        let order = details(&huge, &[("VIP", 1)]);
        assert!(matches!(
            TicketIssuer::new().issue(&order),
            Err(AppError::InternalServerError(_))
        ));
    }

    #[test]
    fn test_garbage_credential_is_a_validation_error() {
        assert!(matches!(
            parse_credential("not json"),
            Err(AppError::ValidationError { .. })
        ));
    }
}
