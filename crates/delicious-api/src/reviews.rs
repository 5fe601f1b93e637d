use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use delicious_core::Error;
use delicious_core::validate::parse_rating;
use delicious_types::api::{Claims, ReviewRequest};
use delicious_types::models::Review;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Reviews are write-once; there is no edit or delete.
pub async fn add_review(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let review = Review {
        id: Uuid::new_v4(),
        store_id,
        author_id: claims.sub,
        rating: parse_rating(req.rating)?,
        text: req.text.trim().to_string(),
        created_at: Utc::now(),
    };

    let review = blocking(&state, move |db| {
        if db.get_store_by_id(store_id)?.is_none() {
            return Err(Error::NotFound);
        }
        db.insert_review(&review)?;
        Ok(review)
    })
    .await
    .map_err(|e| match e {
        ApiError::NotFound(_) => ApiError::NotFound("Store not found"),
        e => e,
    })?;

    info!("Review {} added to store {}", review.id, store_id);
    Ok((StatusCode::CREATED, Json(review)))
}
