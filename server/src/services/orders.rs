//! The order lifecycle.
//!
//! ```text
//! PendingVerification ──verify──▶ Verified
//!          │
//!          └──────────reject───▶ Rejected
//! ```
//!
//! Every transition is committed by the store as a conditional write on the
//! current status. Notifications are dispatched only after that write has
//! committed and cannot undo it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::{BankDetails, Config};
use crate::models::{
    CredentialCheck, CustomerInfo, IssuedTicket, NewPaymentProof, Order, OrderDetails,
    OrderFilter, OrderLineItem, OrderPage, OrderStats, OrderStatus, Pagination, PaymentProof,
    SalesLine, Ticket,
};
use crate::services::notify::{NotificationDispatcher, Notifier};
use crate::services::pricing::{self, LineRequest};
use crate::services::proofs::{ProofUpload, UploadPolicy};
use crate::services::reference::{self, ReferenceCodeGenerator};
use crate::services::tickets::{self, TicketIssuer};
use crate::store::{Catalog, FileStore, NewOrder, OrderStore, StoredFile};
use crate::utils::error::{AppError, Result};

/// Inserts retried after a reference code collides at write time.
const MAX_CREATE_ATTEMPTS: u32 = 3;
pub const MAX_REJECTION_REASON_LEN: usize = 500;
const MAX_ORIGINAL_NAME_LEN: usize = 255;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub event_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub items: Vec<LineRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    pub order: OrderDetails,
    pub bank_details: BankDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifiedOrder {
    pub order: Order,
    pub tickets: Vec<IssuedTicket>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttachedProof {
    pub payment_proof: PaymentProof,
    pub replaced: bool,
}

/// An order as shown to customers and admins, with ticket images rendered.
#[derive(Debug, Clone, Serialize)]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderLineItem>,
    pub payment_proof: Option<PaymentProof>,
    pub tickets: Vec<IssuedTicket>,
}

impl OrderView {
    fn from_details(details: OrderDetails) -> Result<Self> {
        let tickets = tickets::with_images(&details.tickets)?;
        Ok(OrderView {
            order: details.order,
            items: details.items,
            payment_proof: details.payment_proof,
            tickets,
        })
    }
}

pub struct OrderService {
    catalog: Arc<dyn Catalog>,
    orders: Arc<dyn OrderStore>,
    files: Arc<dyn FileStore>,
    notifications: NotificationDispatcher,
    references: ReferenceCodeGenerator,
    issuer: TicketIssuer,
    upload_policy: UploadPolicy,
    bank: BankDetails,
}

impl OrderService {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        orders: Arc<dyn OrderStore>,
        files: Arc<dyn FileStore>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            catalog,
            orders,
            files,
            notifications: NotificationDispatcher::new(notifier),
            references: ReferenceCodeGenerator::new(config.reference_prefix.clone()),
            issuer: TicketIssuer::new(),
            upload_policy: UploadPolicy::new(
                config.upload.max_file_size,
                &config.upload.allowed_mime_types,
            ),
            bank: config.bank.clone(),
        }
    }

    #[instrument(skip(self, request), fields(event_id = %request.event_id))]
    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<CreatedOrder> {
        let customer = CustomerInfo {
            name: request.customer_name,
            email: request.customer_email,
            phone: request.customer_phone,
        }
        .normalized()?;
        let snapshot = pricing::snapshot(&*self.catalog, request.event_id, &request.items).await?;

        let mut attempt = 0;
        let details = loop {
            attempt += 1;
            let reference_code = self.references.generate(&*self.orders).await?;
            let new_order = NewOrder {
                reference_code,
                customer: customer.clone(),
                snapshot: snapshot.clone(),
            };
            match self.orders.insert_order(new_order).await {
                Ok(details) => break details,
                Err(AppError::Conflict(message)) if attempt < MAX_CREATE_ATTEMPTS => {
                    warn!(attempt, message = %message, "Reference code taken at insert, retrying");
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            order_id = %details.order.id,
            reference_code = %details.order.reference_code,
            total = %details.order.total_amount,
            "Order created"
        );

        self.notifications
            .order_confirmation(details.clone(), self.bank.clone());

        Ok(CreatedOrder {
            order: details,
            bank_details: self.bank.clone(),
        })
    }

    #[instrument(skip(self, upload), fields(order_id = %order_id, size = upload.bytes.len()))]
    pub async fn attach_payment_proof(
        &self,
        order_id: Uuid,
        upload: ProofUpload,
    ) -> Result<AttachedProof> {
        let mime_type = self.upload_policy.classify(&upload)?;

        let details = self.require_order(order_id).await?;
        if details.order.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Order is {}, cannot accept a payment proof",
                details.order.status
            )));
        }

        let storage_key = self.files.save(&upload.bytes, &mime_type).await?;
        let record = NewPaymentProof {
            storage_key: storage_key.clone(),
            original_file_name: upload.original_file_name.as_deref().and_then(clean_file_name),
            file_size: upload.bytes.len() as i64,
            mime_type,
        };

        let replacement = match self.orders.record_payment_proof(order_id, record).await {
            Ok(replacement) => replacement,
            Err(e) => {
                if let Err(cleanup) = self.files.delete(&storage_key).await {
                    warn!(error = %cleanup, storage_key = %storage_key, "Failed to remove unrecorded proof file");
                }
                return Err(e);
            }
        };

        // The new record is durable; the old file can go.
        if let Some(previous) = &replacement.previous {
            if previous.storage_key != storage_key {
                if let Err(e) = self.files.delete(&previous.storage_key).await {
                    warn!(error = %e, storage_key = %previous.storage_key, "Error deleting old proof file");
                }
            }
        }

        info!(replaced = replacement.previous.is_some(), "Payment proof stored");
        Ok(AttachedProof {
            replaced: replacement.previous.is_some(),
            payment_proof: replacement.current,
        })
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn verify_order(&self, order_id: Uuid) -> Result<VerifiedOrder> {
        let details = self.require_order(order_id).await?;
        if details.order.status != OrderStatus::PendingVerification {
            return Err(AppError::InvalidState(format!(
                "Order is {}, cannot verify",
                details.order.status
            )));
        }

        let issued = self.issuer.issue(&details)?;
        let tickets: Vec<Ticket> = issued.iter().map(|t| t.ticket.clone()).collect();
        let order = self.orders.commit_verification(order_id, &tickets).await?;

        info!(
            reference_code = %order.reference_code,
            tickets = issued.len(),
            "Order verified and tickets generated"
        );
        self.notifications.tickets(order.clone(), issued.clone());

        Ok(VerifiedOrder {
            order,
            tickets: issued,
        })
    }

    #[instrument(skip(self, reason), fields(order_id = %order_id))]
    pub async fn reject_order(&self, order_id: Uuid, reason: Option<String>) -> Result<Order> {
        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        if let Some(reason) = &reason {
            if reason.chars().count() > MAX_REJECTION_REASON_LEN {
                return Err(AppError::validation(
                    "reason",
                    format!("Reason must be at most {} characters", MAX_REJECTION_REASON_LEN),
                ));
            }
        }

        let order = self
            .orders
            .commit_rejection(order_id, reason.as_deref())
            .await?;

        info!(reference_code = %order.reference_code, "Order rejected");
        self.notifications.rejection(order.clone());
        Ok(order)
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_reference(&self, reference_code: &str) -> Result<OrderView> {
        let reference_code = reference_code.trim().to_ascii_uppercase();
        if !reference::is_well_formed(&reference_code, self.references.prefix()) {
            return Err(AppError::NotFound("Order not found".to_string()));
        }
        let details = self
            .orders
            .find_order_by_reference(&reference_code)
            .await?
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;
        OrderView::from_details(details)
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderView> {
        OrderView::from_details(self.require_order(order_id).await?)
    }

    pub async fn list_orders(&self, filter: OrderFilter) -> Result<OrderPage> {
        let (orders, total) = self.orders.list_orders(&filter).await?;
        let limit = filter.limit();
        Ok(OrderPage {
            orders,
            pagination: Pagination {
                page: filter.page(),
                limit,
                total,
                pages: (total + i64::from(limit) - 1) / i64::from(limit),
            },
        })
    }

    pub async fn order_stats(&self) -> Result<OrderStats> {
        self.orders.order_stats().await
    }

    pub async fn sales_summary(&self) -> Result<Vec<SalesLine>> {
        self.orders.sales_summary().await
    }

    pub async fn payment_proof_file(&self, order_id: Uuid) -> Result<(PaymentProof, StoredFile)> {
        let proof = self
            .require_order(order_id)
            .await?
            .payment_proof
            .ok_or_else(|| AppError::NotFound("Payment proof not found".to_string()))?;
        let bytes = self.files.load(&proof.storage_key).await?;
        let content_type = proof.mime_type.clone();
        Ok((
            proof,
            StoredFile {
                bytes,
                content_type,
            },
        ))
    }

    #[instrument(skip(self, credential))]
    pub async fn verify_credential(&self, credential: &str) -> Result<CredentialCheck> {
        tickets::check_credential(&*self.orders, credential).await
    }

    async fn require_order(&self, order_id: Uuid) -> Result<OrderDetails> {
        self.orders
            .find_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Order '{}' was not found", order_id)))
    }
}

/// Keeps only the final path component of a client-supplied name.
fn clean_file_name(name: &str) -> Option<String> {
    let base = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() {
        None
    } else {
        Some(base.chars().take(MAX_ORIGINAL_NAME_LEN).collect())
    }
}
