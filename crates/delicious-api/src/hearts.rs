use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::debug;
use uuid::Uuid;

use delicious_types::api::{Claims, HeartResponse};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

pub async fn toggle_heart(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (hearted, hearts) = blocking(&state, move |db| db.toggle_heart(claims.sub, store_id))
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => ApiError::NotFound("Store not found"),
            e => e,
        })?;

    debug!("User {} hearted={} store {}", claims.sub, hearted, store_id);
    Ok(Json(HeartResponse { hearted, hearts }))
}

pub async fn hearted_stores(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let stores = blocking(&state, move |db| db.get_hearted_stores(claims.sub)).await?;
    Ok(Json(stores))
}
