use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};

use agrochain_core::{FarmerId, HarvestId, InvoiceId};
use agrochain_harvest::HarvestStatus;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/harvests", get(list_harvests).post(register_harvest))
        .route("/harvests/:id", get(get_harvest))
        .route("/harvests/:id/status", put(mark_invoiced))
}

pub async fn register_harvest(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::RegisterHarvestRequest>,
) -> axum::response::Response {
    let farmer_id: FarmerId = match errors::parse_id(&body.farmer_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let result = errors::blocking(move || {
        services.harvest.register(farmer_id, &body.product, body.tonnes)
    })
    .await;
    match result {
        Ok(harvest_id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "harvestId": harvest_id.to_string() })),
        )
            .into_response(),
        Err(resp) => resp,
    }
}

/// Billing callback. Idempotent per harvest.
pub async fn mark_invoiced(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    Json(body): Json<dto::MarkInvoicedRequest>,
) -> axum::response::Response {
    let harvest_id: HarvestId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let invoice_id: InvoiceId = match errors::parse_id(&body.invoice_id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let result = errors::blocking(move || {
        services.harvest.mark_invoiced(harvest_id, invoice_id)
    })
    .await;
    match result {
        Ok(outcome) => {
            (StatusCode::OK, Json(dto::HarvestStatusResponse::from(outcome))).into_response()
        }
        Err(resp) => resp,
    }
}

pub async fn get_harvest(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let harvest_id: HarvestId = match errors::parse_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match errors::blocking(move || services.harvest.get(harvest_id)).await {
        Ok(harvest) => (StatusCode::OK, Json(harvest)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn list_harvests(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListHarvestsQuery>,
) -> axum::response::Response {
    let status = match query.status.as_deref().map(str::to_ascii_uppercase).as_deref() {
        None => None,
        Some("REGISTERED") => Some(HarvestStatus::Registered),
        Some("INVOICED") => Some(HarvestStatus::Invoiced),
        Some(other) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_argument",
                format!("unknown harvest status {other}; expected REGISTERED or INVOICED"),
            );
        }
    };

    let result = errors::blocking(move || match status {
        None => services.harvest.list(),
        Some(status) => services.harvest.list_by_status(status),
    })
    .await;
    match result {
        Ok(harvests) => (StatusCode::OK, Json(harvests)).into_response(),
        Err(resp) => resp,
    }
}
