//! Customer notifications.
//!
//! Dispatch happens on detached tasks after the state change has committed.
//! A failed delivery is logged and dropped; it never reaches the request that
//! caused it.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::BankDetails;
use crate::models::{IssuedTicket, Order, OrderDetails};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("delivery failed: {0}")]
    Delivery(String),
    #[error("mailer misconfigured: {0}")]
    Config(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_order_confirmation(
        &self,
        order: &OrderDetails,
        bank: &BankDetails,
    ) -> Result<(), NotifyError>;

    async fn send_tickets(&self, order: &Order, tickets: &[IssuedTicket]) -> Result<(), NotifyError>;

    async fn send_rejection(&self, order: &Order) -> Result<(), NotifyError>;
}

pub fn confirmation_subject(order: &Order) -> String {
    format!("Order Confirmation - {}", order.reference_code)
}

pub fn tickets_subject(order: &Order) -> String {
    format!("Your Tickets - {}", order.reference_code)
}

pub fn rejection_subject(order: &Order) -> String {
    format!("Payment Not Verified - {}", order.reference_code)
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_order_confirmation(
        &self,
        details: &OrderDetails,
        bank: &BankDetails,
    ) -> Result<(), NotifyError> {
        info!(
            to = %details.order.customer_email,
            subject = %confirmation_subject(&details.order),
            total = %details.order.total_amount,
            bank = %bank.bank_name,
            account = %bank.account_number,
            "Order confirmation"
        );
        Ok(())
    }

    async fn send_tickets(&self, order: &Order, tickets: &[IssuedTicket]) -> Result<(), NotifyError> {
        info!(
            to = %order.customer_email,
            subject = %tickets_subject(order),
            tickets = tickets.len(),
            "Ticket delivery"
        );
        Ok(())
    }

    async fn send_rejection(&self, order: &Order) -> Result<(), NotifyError> {
        info!(
            to = %order.customer_email,
            subject = %rejection_subject(order),
            reason = order.rejection_reason.as_deref().unwrap_or("none given"),
            "Rejection notice"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn order_confirmation(&self, details: OrderDetails, bank: BankDetails) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.send_order_confirmation(&details, &bank).await {
                warn!(
                    error = %e,
                    reference_code = %details.order.reference_code,
                    "Failed to send confirmation email"
                );
            }
        });
    }

    pub fn tickets(&self, order: Order, tickets: Vec<IssuedTicket>) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.send_tickets(&order, &tickets).await {
                warn!(
                    error = %e,
                    reference_code = %order.reference_code,
                    "Failed to send tickets email"
                );
            }
        });
    }

    pub fn rejection(&self, order: Order) {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if let Err(e) = notifier.send_rejection(&order).await {
                warn!(
                    error = %e,
                    reference_code = %order.reference_code,
                    "Failed to send rejection email"
                );
            }
        });
    }
}
