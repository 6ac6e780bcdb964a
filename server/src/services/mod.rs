pub mod catalog;
pub mod email;
pub mod notify;
pub mod orders;
pub mod pricing;
pub mod proofs;
pub mod reference;
pub mod tickets;

pub use catalog::CatalogService;
pub use email::SmtpNotifier;
pub use notify::{LogNotifier, NotificationDispatcher, Notifier};
pub use orders::OrderService;
