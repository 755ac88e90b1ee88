use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/supplies", get(list_supplies).post(create_supply))
        .route("/supplies/:item", get(get_supply))
        .route("/supplies/:item/adjust", post(adjust_stock))
}

pub async fn create_supply(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::CreateSupplyRequest>,
) -> axum::response::Response {
    match errors::blocking(move || services.supply.create(&body.item, body.stock)).await {
        Ok(supply) => (StatusCode::CREATED, Json(supply)).into_response(),
        Err(resp) => resp,
    }
}

/// `item` is the supply name, matched case-insensitively.
pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(item): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    match errors::blocking(move || services.supply.adjust_stock(&item, body.delta)).await {
        Ok(supply) => (StatusCode::OK, Json(dto::StockResponse::from(supply))).into_response(),
        Err(resp) => resp,
    }
}

pub async fn get_supply(
    Extension(services): Extension<Arc<AppServices>>,
    Path(item): Path<String>,
) -> axum::response::Response {
    match errors::blocking(move || services.supply.get(&item)).await {
        Ok(supply) => (StatusCode::OK, Json(supply)).into_response(),
        Err(resp) => resp,
    }
}

pub async fn list_supplies(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match errors::blocking(move || services.supply.list()).await {
        Ok(supplies) => (StatusCode::OK, Json(supplies)).into_response(),
        Err(resp) => resp,
    }
}
