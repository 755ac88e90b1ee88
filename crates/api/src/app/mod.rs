//! HTTP wiring: one router per service, all backed by the same [`AppServices`].
//!
//! - `services.rs`: stores, emitters, workers and the billing subscriber
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request/response bodies
//! - `errors.rs`: `DomainError` → JSON error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{AppServices, StartupError};

use routes::deliveries::DeliveryScope;

/// Wired services plus the three routers built over them.
pub struct Platform {
    pub services: Arc<AppServices>,
    pub harvest: Router,
    pub supply: Router,
    pub billing: Router,
}

pub fn build_platform(config: &AppConfig) -> Result<Platform, StartupError> {
    let services = Arc::new(AppServices::build(config)?);
    Ok(Platform {
        harvest: harvest_router(services.clone()),
        supply: supply_router(services.clone()),
        billing: billing_router(services.clone()),
        services,
    })
}

pub fn harvest_router(services: Arc<AppServices>) -> Router {
    let scope = DeliveryScope::single("harvest", services.harvest_admin());
    service_router(routes::harvests::router(), services, scope)
}

pub fn supply_router(services: Arc<AppServices>) -> Router {
    let scope = DeliveryScope::single("supply", services.supply_admin());
    service_router(routes::supplies::router(), services, scope)
}

pub fn billing_router(services: Arc<AppServices>) -> Router {
    let scope = DeliveryScope::new(vec![
        ("billing".to_string(), services.billing_admin()),
        ("billing-inbound".to_string(), services.billing_inbound_admin()),
    ]);
    service_router(routes::invoices::router(), services, scope)
}

fn service_router(resources: Router, services: Arc<AppServices>, scope: DeliveryScope) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(resources)
        .merge(routes::deliveries::router())
        .layer(Extension(services))
        .layer(Extension(scope))
        .layer(ServiceBuilder::new())
}
