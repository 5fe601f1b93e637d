use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use tracing::{error, info};

use delicious_core::Error;
use delicious_core::validate::{is_valid_email, normalize_email};
use delicious_types::api::{
    AuthResponse, Claims, ForgotPasswordRequest, MessageResponse, ResetPasswordRequest,
    UpdateAccountRequest,
};

use crate::auth::{AppState, create_token, hash_password};
use crate::blocking;
use crate::error::ApiError;
use crate::mail;

const RESET_TOKEN_TTL_HOURS: i64 = 1;
const RESET_INVALID: &str = "Password reset is invalid or has expired";

pub async fn account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(&state, move |db| db.get_user(claims.sub))
        .await?
        .ok_or(ApiError::Unauthorized)?;
    Ok(Json(user))
}

pub async fn update_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);

    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push("You must supply a name!".to_string());
    }
    if !is_valid_email(&email) {
        errors.push("Not a valid email address!".to_string());
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let user = blocking(&state, move |db| {
        db.update_account(claims.sub, &name, &email)?;
        db.get_user(claims.sub)?.ok_or(Error::NotFound)
    })
    .await
    .map_err(|e| match e {
        ApiError::Conflict(_) => ApiError::Conflict("That email is already registered".to_string()),
        e => e,
    })?;

    Ok(Json(user))
}

/// Issues a reset token and mails it. Answers the same whether or not the
/// address belongs to anyone, and whether or not the mail went out.
pub async fn forgot(
    State(state): State<AppState>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);
    let lookup = email.clone();
    let user = blocking(&state, move |db| db.get_user_by_email(&lookup)).await?;

    if let Some(user) = user {
        let token = hex::encode(rand::random::<[u8; 20]>());
        let expires = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);
        let user_id = user.uuid();

        let stored = token.clone();
        blocking(&state, move |db| db.set_reset_token(user_id, &stored, expires)).await?;

        let reset_url = format!("{}/account/reset/{}", state.public_url.trim_end_matches('/'), token);
        match state
            .mailer
            .send(&mail::password_reset(&user.name, &user.email, &reset_url))
        {
            Ok(()) => info!("Password reset issued for {}", user_id),
            Err(e) => {
                // An unusable token must not outlive the failed mail.
                error!("Failed to send reset mail to {}: {}", user_id, e);
                if let Err(e) = blocking(&state, move |db| db.clear_reset_token(user_id)).await {
                    error!("Failed to clear reset token for {}: {}", user_id, e);
                }
            }
        }
    } else {
        info!("Password reset requested for unknown address");
    }

    Ok(Json(MessageResponse {
        message: "If that account exists, a password reset link has been emailed to it.".to_string(),
    }))
}

pub async fn validate_reset(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(&state, move |db| db.get_user_by_reset_token(&token, Utc::now()))
        .await?
        .ok_or(ApiError::NotFound(RESET_INVALID))?;

    Ok(Json(MessageResponse {
        message: "Reset token is valid".to_string(),
    }))
}

pub async fn reset(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.password.is_empty() {
        return Err(ApiError::invalid("Password can't be blank!"));
    }
    if req.password != req.confirm_password {
        return Err(ApiError::invalid("Passwords do not match!"));
    }

    let row = blocking(&state, move |db| db.get_user_by_reset_token(&token, Utc::now()))
        .await?
        .ok_or(ApiError::NotFound(RESET_INVALID))?;

    let password_hash = hash_password(&req.password)?;
    let user_id = row.uuid();
    let user = blocking(&state, move |db| {
        db.reset_password(user_id, &password_hash)?;
        db.get_user(user_id)?.ok_or(Error::NotFound)
    })
    .await?;

    let token = create_token(&state.jwt_secret, user.id, &user.email)?;
    info!("Password reset completed for {}", user.id);

    Ok(Json(AuthResponse {
        user,
        token,
        redirect: "/".to_string(),
    }))
}
