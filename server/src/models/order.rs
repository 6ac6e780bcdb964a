use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::payment_proof::PaymentProof;
use crate::models::ticket::Ticket;
use crate::utils::error::AppError;

/// Lifecycle of an order. `Verified` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    PendingVerification,
    Verified,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingVerification => "PENDING_VERIFICATION",
            OrderStatus::Verified => "VERIFIED",
            OrderStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::PendingVerification)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_VERIFICATION" => Ok(OrderStatus::PendingVerification),
            "VERIFIED" => Ok(OrderStatus::Verified),
            "REJECTED" => Ok(OrderStatus::Rejected),
            other => Err(AppError::validation(
                "status",
                format!("Unknown order status '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub reference_code: String,
    pub event_id: Uuid,
    /// Event name as it was when the order was placed.
    pub event_name: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
}

/// A priced line, frozen at order time. Never joined back to the live tier.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OrderLineItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub ticket_tier_id: Uuid,
    pub tier_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLineItem>,
    pub payment_proof: Option<PaymentProof>,
    pub tickets: Vec<Ticket>,
}

impl OrderDetails {
    pub fn ticket_units(&self) -> usize {
        self.items.iter().map(|item| item.quantity.max(0) as usize).sum()
    }
}

const NAME_LEN: (usize, usize) = (2, 100);
const PHONE_LEN: (usize, usize) = (10, 20);
const EMAIL_MAX_LEN: usize = 254;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl CustomerInfo {
    /// Trims every field, lower-cases the email and checks the contact rules.
    pub fn normalized(&self) -> Result<CustomerInfo, AppError> {
        let name = self.name.trim().to_string();
        let name_len = name.chars().count();
        if name_len < NAME_LEN.0 || name_len > NAME_LEN.1 {
            return Err(AppError::validation(
                "customer_name",
                "Name must be 2-100 characters",
            ));
        }

        let email = self.email.trim().to_lowercase();
        if !is_plausible_email(&email) {
            return Err(AppError::validation("customer_email", "Invalid email"));
        }

        let phone = self.phone.trim().to_string();
        let phone_len = phone.chars().count();
        let phone_chars_ok = phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'));
        if phone_len < PHONE_LEN.0 || phone_len > PHONE_LEN.1 || !phone_chars_ok {
            return Err(AppError::validation(
                "customer_phone",
                "Invalid phone number",
            ));
        }

        Ok(CustomerInfo { name, email, phone })
    }
}

fn is_plausible_email(email: &str) -> bool {
    if email.len() > EMAIL_MAX_LEN || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && tld.len() >= 2 && !domain.starts_with('.'),
        None => false,
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl OrderFilter {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 100;

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderPage {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderStats {
    pub total: i64,
    pub pending: i64,
    pub verified: i64,
    pub rejected: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct SalesLine {
    pub event_id: Uuid,
    pub event_name: String,
    pub tier_name: String,
    pub tickets: i64,
    pub revenue: Decimal,
}
