use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use agrochain_core::{HarvestId, InvoiceId};
use agrochain_events::NuevaCosecha;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/events/nueva_cosecha", post(nueva_cosecha_webhook))
        .route("/invoices", get(list_invoices))
        .route("/invoices/:id", get(get_invoice))
        .route("/invoices/:id/pay", post(pay_invoice))
}

/// Webhook ingress for `nueva_cosecha` delivered by an external bus.
///
/// Same idempotent handler as the bus subscriber: 201 when an invoice was
/// created, 200 with the existing invoice on a replay.
pub async fn nueva_cosecha_webhook(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::NuevaCosechaRequest>,
) -> axum::response::Response {
    let harvest_id: HarvestId = match errors::parse_id(&body.harvest_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let event = NuevaCosecha {
        harvest_id,
        product: body.product,
        tonnes: body.tonnes,
    };

    match errors::blocking(move || services.billing.handle_new_harvest(&event)).await {
        Ok(outcome) => {
            let status = if outcome.is_created() {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            (status, Json(dto::BillingResponse::from(outcome))).into_response()
        }
        Err(resp) => resp,
    }
}

pub async fn list_invoices(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListInvoicesQuery>,
) -> axum::response::Response {
    let Some(raw) = query.harvest_id else {
        return match errors::blocking(move || services.billing.list()).await {
            Ok(invoices) => (StatusCode::OK, Json(invoices)).into_response(),
            Err(resp) => resp,
        };
    };

    let harvest_id: HarvestId = match errors::parse_id(&raw) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    match errors::blocking(move || services.billing.find_by_harvest(harvest_id)).await {
        Ok(found) => (StatusCode::OK, Json(found.into_iter().collect::<Vec<_>>())).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id: InvoiceId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match errors::blocking(move || services.billing.get(invoice_id)).await {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn pay_invoice(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let invoice_id: InvoiceId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match errors::blocking(move || services.billing.mark_paid(invoice_id)).await {
        Ok(invoice) => (StatusCode::OK, Json(invoice)).into_response(),
        Err(resp) => resp,
    }
}
