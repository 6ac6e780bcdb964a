pub mod event;
pub mod order;
pub mod payment_proof;
pub mod ticket;

pub use event::{
    Event, EventSummary, EventUpdate, EventWithTiers, NewEvent, NewTicketTier, TicketTier,
    TierUpdate,
};
pub use order::{
    CustomerInfo, Order, OrderDetails, OrderFilter, OrderLineItem, OrderPage, OrderStats,
    OrderStatus, Pagination, SalesLine,
};
pub use payment_proof::{NewPaymentProof, PaymentProof, ProofReplacement};
pub use ticket::{CredentialCheck, CredentialPayload, IssuedTicket, Ticket};
