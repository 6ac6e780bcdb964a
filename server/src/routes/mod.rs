use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post, put};
use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, with_security_headers, Config};
use crate::handlers::{admin, auth, catalog, health_check, orders};
use crate::state::AppState;

/// Room for multipart framing around a maximum-size proof.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let admin = Router::new()
        .route("/orders", get(admin::list_orders))
        .route("/orders/:id", get(admin::get_order))
        .route("/orders/:id/payment-proof", get(admin::get_payment_proof))
        .route("/orders/:id/verify", post(admin::verify_order))
        .route("/orders/:id/reject", post(admin::reject_order))
        .route("/tickets/verify", post(admin::verify_ticket))
        .route("/stats", get(admin::order_stats))
        .route("/stats/sales", get(admin::sales_summary))
        .route(
            "/events",
            get(admin::list_all_events).post(admin::create_event),
        )
        .route(
            "/events/:id",
            put(admin::update_event).delete(admin::deactivate_event),
        )
        .route("/tiers/:id", patch(admin::update_tier))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    let api = Router::new()
        .route("/events", get(catalog::list_events))
        .route("/events/:id", get(catalog::get_event))
        .route("/orders", post(orders::create_order))
        // Sibling routes must share the parameter name; here it holds the reference code.
        .route("/orders/:id", get(orders::get_order_by_reference))
        .route(
            "/orders/:id/payment-proof",
            post(orders::upload_payment_proof).layer(DefaultBodyLimit::max(
                config.upload.max_file_size + MULTIPART_OVERHEAD,
            )),
        )
        .nest("/admin", admin);

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .with_state(state);

    with_security_headers(router, config.production)
        .layer(create_cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
}
