//! Dead-letter operator endpoints, mounted on every service over that
//! service's emitters.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use uuid::Uuid;

use agrochain_infra::{DeadLetterAdmin, DeadLetterEntry, OutboxError};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

/// The emitters a service's delivery routes operate on.
///
/// Dead letters are listed across all of them; replay and discard go to the
/// emitter holding the delivery.
#[derive(Clone)]
pub struct DeliveryScope {
    emitters: Vec<(String, Arc<dyn DeadLetterAdmin>)>,
}

impl DeliveryScope {
    pub fn new(emitters: Vec<(String, Arc<dyn DeadLetterAdmin>)>) -> Self {
        Self { emitters }
    }

    pub fn single(name: impl Into<String>, admin: Arc<dyn DeadLetterAdmin>) -> Self {
        Self::new(vec![(name.into(), admin)])
    }

    fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>, OutboxError> {
        let mut entries = Vec::new();
        for (_, admin) in &self.emitters {
            entries.extend(admin.dead_letters()?);
        }
        entries.sort_by_key(|e| e.dead_lettered_at);
        Ok(entries)
    }

    /// Run `op` on each emitter until one knows the delivery.
    fn find<T>(
        &self,
        delivery_id: Uuid,
        op: impl Fn(&dyn DeadLetterAdmin) -> Result<T, OutboxError>,
    ) -> Result<T, OutboxError> {
        for (_, admin) in &self.emitters {
            match op(admin.as_ref()) {
                Err(OutboxError::NotFound(_)) => continue,
                other => return other,
            }
        }
        Err(OutboxError::NotFound(delivery_id))
    }
}

pub fn router() -> Router {
    Router::new()
        .route("/deliveries/dead-letters", get(list_dead_letters))
        .route("/deliveries/dead-letters/:id", delete(discard_dead_letter))
        .route("/deliveries/dead-letters/:id/replay", post(replay_dead_letter))
        .route("/deliveries/stats", get(delivery_stats))
}

fn parse_delivery_id(raw: &str) -> Result<Uuid, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid delivery id: {raw}"),
        )
    })
}

pub async fn list_dead_letters(
    Extension(scope): Extension<DeliveryScope>,
) -> axum::response::Response {
    match scope.dead_letters() {
        Ok(entries) => (StatusCode::OK, Json(entries)).into_response(),
        Err(e) => errors::outbox_error_to_response(e),
    }
}

/// Re-queue with a fresh attempt budget; the delivery worker picks it up.
pub async fn replay_dead_letter(
    Extension(scope): Extension<DeliveryScope>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let delivery_id = match parse_delivery_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match scope.find(delivery_id, |admin| admin.replay(delivery_id)) {
        Ok(result) => (StatusCode::ACCEPTED, Json(result)).into_response(),
        Err(e) => errors::outbox_error_to_response(e),
    }
}

pub async fn discard_dead_letter(
    Extension(scope): Extension<DeliveryScope>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let delivery_id = match parse_delivery_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match scope.find(delivery_id, |admin| admin.discard(delivery_id)) {
        Ok(entry) => (StatusCode::OK, Json(entry)).into_response(),
        Err(e) => errors::outbox_error_to_response(e),
    }
}

pub async fn delivery_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(scope): Extension<DeliveryScope>,
) -> axum::response::Response {
    let mut emitters = Vec::with_capacity(scope.emitters.len());
    for (name, admin) in &scope.emitters {
        match admin.stats() {
            Ok(emitter) => emitters.push(dto::EmitterStatsEntry {
                emitter,
                worker: services.worker_stats(name),
            }),
            Err(e) => return errors::outbox_error_to_response(e),
        }
    }
    (StatusCode::OK, Json(dto::DeliveryStatsResponse { emitters })).into_response()
}
