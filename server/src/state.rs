use std::sync::Arc;

use crate::config::Config;
use crate::services::{CatalogService, Notifier, OrderService};
use crate::store::{Catalog, FileStore, OrderStore};

/// Shared by every handler. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<CatalogService>,
    pub orders: Arc<OrderService>,
    pub admin_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        orders: Arc<dyn OrderStore>,
        files: Arc<dyn FileStore>,
        notifier: Arc<dyn Notifier>,
        config: &Config,
    ) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(Arc::clone(&catalog))),
            orders: Arc::new(OrderService::new(catalog, orders, files, notifier, config)),
            admin_token: config.admin_token.as_deref().map(Arc::from),
        }
    }
}
