//! SMTP delivery for customer notifications.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, Message, SmtpTransport, Transport};
use tracing::info;

use crate::config::{BankDetails, SmtpConfig};
use crate::models::{IssuedTicket, Order, OrderDetails};
use crate::services::notify::{
    confirmation_subject, rejection_subject, tickets_subject, Notifier, NotifyError,
};

const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Clone)]
pub struct SmtpNotifier {
    mailer: SmtpTransport,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Port 465 connects over TLS directly, any other port upgrades with STARTTLS.
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let builder = if config.port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&config.host)
        } else {
            SmtpTransport::starttls_relay(&config.host)
        }
        .map_err(|e| NotifyError::Config(format!("SMTP relay error: {e}")))?;

        let mailer = builder
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::Config(format!("Invalid from address: {e}")))?;

        Ok(Self { mailer, from })
    }

    fn message(
        &self,
        order: &Order,
        subject: String,
        html: String,
    ) -> Result<Message, NotifyError> {
        let address = order
            .customer_email
            .parse::<Address>()
            .map_err(|e| NotifyError::Delivery(format!("Invalid recipient address: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(Some(order.customer_name.clone()), address))
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html)
            .map_err(|e| NotifyError::Delivery(format!("Failed to build email: {e}")))
    }

    async fn deliver(&self, message: Message) -> Result<(), NotifyError> {
        let mailer = self.mailer.clone();
        tokio::task::spawn_blocking(move || mailer.send(&message))
            .await
            .map_err(|e| NotifyError::Delivery(format!("Email task failed: {e}")))?
            .map_err(|e| NotifyError::Delivery(format!("Failed to send email: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send_order_confirmation(
        &self,
        details: &OrderDetails,
        bank: &BankDetails,
    ) -> Result<(), NotifyError> {
        let order = &details.order;
        let message = self.message(
            order,
            confirmation_subject(order),
            confirmation_html(details, bank),
        )?;
        self.deliver(message).await?;
        info!(
            to = %order.customer_email,
            reference_code = %order.reference_code,
            "Order confirmation email sent"
        );
        Ok(())
    }

    async fn send_tickets(&self, order: &Order, tickets: &[IssuedTicket]) -> Result<(), NotifyError> {
        let message = self.message(order, tickets_subject(order), tickets_html(order, tickets))?;
        self.deliver(message).await?;
        info!(
            to = %order.customer_email,
            reference_code = %order.reference_code,
            tickets = tickets.len(),
            "Tickets email sent"
        );
        Ok(())
    }

    async fn send_rejection(&self, order: &Order) -> Result<(), NotifyError> {
        let message = self.message(order, rejection_subject(order), rejection_html(order))?;
        self.deliver(message).await?;
        info!(
            to = %order.customer_email,
            reference_code = %order.reference_code,
            "Rejection email sent"
        );
        Ok(())
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="UTF-8"><title>{title}</title></head>
<body style="font-family: Arial, sans-serif; line-height: 1.6; color: #333;">
<div style="max-width: 600px; margin: 0 auto; padding: 20px;">
<h2 style="color: #7C5CFF;">{title}</h2>
{body}
</div>
</body>
</html>"#
    )
}

fn confirmation_html(details: &OrderDetails, bank: &BankDetails) -> String {
    let order = &details.order;
    let reference = escape(&order.reference_code);
    let lines: String = details
        .items
        .iter()
        .map(|item| {
            format!(
                "<li>{} x {} at {} = {}</li>",
                item.quantity,
                escape(&item.tier_name),
                item.unit_price,
                item.subtotal
            )
        })
        .collect();

    let body = format!(
        r#"<p>Dear {name},</p>
<p>Your order for <strong>{event}</strong> has been received and is pending payment verification.</p>
<p><strong>Reference code:</strong> {reference}</p>
<ul>{lines}</ul>
<p><strong>Total:</strong> {total}</p>
<h3>Bank transfer details</h3>
<p>Bank: {bank_name}<br>Account number: {account_number}<br>Account name: {account_name}<br>SWIFT: {swift}</p>
<p>{instructions} Reference: <strong>{reference}</strong></p>
<p>After the transfer, upload your payment proof. Your tickets are emailed once it is verified.</p>"#,
        name = escape(&order.customer_name),
        event = escape(&order.event_name),
        total = order.total_amount,
        bank_name = escape(&bank.bank_name),
        account_number = escape(&bank.account_number),
        account_name = escape(&bank.account_name),
        swift = escape(&bank.swift_code),
        instructions = escape(&bank.instructions),
    );
    layout("Order Confirmation", &body)
}

fn tickets_html(order: &Order, tickets: &[IssuedTicket]) -> String {
    let cards: String = tickets
        .iter()
        .enumerate()
        .map(|(i, issued)| {
            format!(
                r#"<div style="border: 2px solid #7C5CFF; border-radius: 8px; padding: 15px; margin: 15px 0;">
<h4>Ticket {number} - {tier}</h4>
<p style="text-align: center;"><img src="{qr}" alt="QR Code" style="max-width: 200px;"></p>
<p><small>Present this QR code at the venue for entry.</small></p>
</div>"#,
                number = i + 1,
                tier = escape(&issued.ticket.tier_name),
                qr = escape(&issued.qr_code),
            )
        })
        .collect();

    let body = format!(
        r#"<p>Dear {name},</p>
<p>Your payment has been verified. Here are your tickets for <strong>{event}</strong>.</p>
<p><strong>Order reference:</strong> {reference}</p>
<h3>Your tickets ({count})</h3>
{cards}
<p>Bring these tickets, digital or printed, to the event.</p>"#,
        name = escape(&order.customer_name),
        event = escape(&order.event_name),
        reference = escape(&order.reference_code),
        count = tickets.len(),
    );
    layout("Your Tickets Are Ready", &body)
}

fn rejection_html(order: &Order) -> String {
    let reason = order
        .rejection_reason
        .as_deref()
        .map(|r| format!("<p><strong>Reason:</strong> {}</p>", escape(r)))
        .unwrap_or_default();
    let body = format!(
        r#"<p>Dear {name},</p>
<p>We could not verify the payment for order <strong>{reference}</strong> ({event}).</p>
{reason}
<p>Reply to this email if you believe this is a mistake.</p>"#,
        name = escape(&order.customer_name),
        reference = escape(&order.reference_code),
        event = escape(&order.event_name),
    );
    layout("Payment Not Verified", &body)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderLineItem, OrderStatus, Ticket};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn smtp_config() -> SmtpConfig {
        SmtpConfig {
            host: "localhost".into(),
            port: 587,
            username: "mailer".into(),
            password: "secret".into(),
            from: "Pulse Tickets <tickets@example.com>".into(),
        }
    }

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            reference_code: "PULSE-20261016-A1B2C3".into(),
            event_id: Uuid::new_v4(),
            event_name: "Spring <Prom>".into(),
            customer_name: "Ada & Co".into(),
            customer_email: "ada@example.com".into(),
            customer_phone: "+1 555 010 9999".into(),
            total_amount: Decimal::new(27000, 2),
            status: OrderStatus::PendingVerification,
            rejection_reason: None,
            created_at: now,
            status_changed_at: now,
        }
    }

    fn issued(order: &Order, tier: &str) -> IssuedTicket {
        IssuedTicket {
            ticket: Ticket {
                id: Uuid::new_v4(),
                order_id: order.id,
                tier_name: tier.into(),
                credential: "{}".into(),
                created_at: Utc::now(),
            },
            qr_code: "data:image/svg+xml;base64,PHN2Zz4=".into(),
        }
    }

    #[test]
    fn test_confirmation_carries_reference_and_bank_details() {
        let order = order();
        let details = OrderDetails {
            items: vec![OrderLineItem {
                id: Uuid::new_v4(),
                order_id: order.id,
                ticket_tier_id: Uuid::new_v4(),
                tier_name: "Standing".into(),
                quantity: 2,
                unit_price: Decimal::new(7500, 2),
                subtotal: Decimal::new(15000, 2),
            }],
            payment_proof: None,
            tickets: Vec::new(),
            order,
        };
        let html = confirmation_html(&details, &BankDetails::default());

        assert!(html.contains("PULSE-20261016-A1B2C3"));
        assert!(html.contains("1234567890"));
        assert!(html.contains("2 x Standing at 75.00 = 150.00"));
        assert!(html.contains("Ada &amp; Co"));
        assert!(html.contains("Spring &lt;Prom&gt;"));
        assert!(!html.contains("<Prom>"));
    }

    #[test]
    fn test_tickets_email_embeds_every_qr_code() {
        let order = order();
        let tickets = vec![issued(&order, "Standing"), issued(&order, "VIP")];
        let html = tickets_html(&order, &tickets);

        assert_eq!(html.matches("<img src=\"data:image/svg+xml;base64,").count(), 2);
        assert!(html.contains("Ticket 2 - VIP"));
        assert!(html.contains("Your tickets (2)"));
    }

    #[test]
    fn test_rejection_reason_is_optional() {
        let mut order = order();
        assert!(!rejection_html(&order).contains("Reason:"));
        order.rejection_reason = Some("Amount <missing>".into());
        assert!(rejection_html(&order).contains("Reason:</strong> Amount &lt;missing&gt;"));
    }

    #[test]
    fn test_message_headers() {
        let notifier = SmtpNotifier::new(&smtp_config()).unwrap();
        let order = order();
        let message = notifier
            .message(&order, confirmation_subject(&order), "<p>hi</p>".into())
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Order Confirmation - PULSE-20261016-A1B2C3"));
        assert!(raw.contains("ada@example.com"));
        assert!(raw.contains("tickets@example.com"));
        assert!(raw.contains("Content-Type: text/html"));
    }

    #[test]
    fn test_bad_addresses_are_reported() {
        let mut config = smtp_config();
        config.from = "not an address".into();
        assert!(matches!(
            SmtpNotifier::new(&config),
            Err(NotifyError::Config(_))
        ));

        let notifier = SmtpNotifier::new(&smtp_config()).unwrap();
        let mut order = order();
        order.customer_email = "nope".into();
        assert!(matches!(
            notifier.message(&order, rejection_subject(&order), String::new()),
            Err(NotifyError::Delivery(_))
        ));
    }
}
