use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, info};
use uuid::Uuid;

use delicious_core::validate::{is_valid_email, login_redirect, normalize_email};
use delicious_db::Database;
use delicious_types::api::{AuthResponse, Claims, LoginRequest, RegisterRequest};

use crate::blocking;
use crate::error::ApiError;
use crate::mail::Mailer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    /// Base URL used in links sent by email.
    pub public_url: String,
    pub mailer: Arc<dyn Mailer>,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    let email = normalize_email(&req.email);

    // Validate input
    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push("You must supply a name!".to_string());
    }
    if !is_valid_email(&email) {
        errors.push("Not a valid email address!".to_string());
    }
    if req.password.is_empty() {
        errors.push("Password can't be blank!".to_string());
    }
    if req.password != req.confirm_password {
        errors.push("Password and Confirm password have to match!".to_string());
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let password_hash = hash_password(&req.password)?;
    let user_id = Uuid::new_v4();

    let user = blocking(&state, move |db| {
        db.create_user(user_id, &email, &name, &password_hash)?;
        db.get_user(user_id)?.ok_or(delicious_core::Error::NotFound)
    })
    .await
    .map_err(|e| match e {
        ApiError::Conflict(_) => ApiError::Conflict("That email is already registered".to_string()),
        e => e,
    })?;

    let token = create_token(&state.jwt_secret, user.id, &user.email)?;
    info!("Registered user {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user,
            token,
            redirect: "/".to_string(),
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = normalize_email(&req.email);
    let row = blocking(&state, move |db| db.get_user_by_email(&email))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    verify_password(&req.password, &row.password)?;

    let user_id = row.uuid();
    let user = blocking(&state, move |db| db.get_user(user_id))
        .await?
        .ok_or(ApiError::Unauthorized)?;

    let token = create_token(&state.jwt_secret, user.id, &user.email)?;

    Ok(Json(AuthResponse {
        user,
        token,
        redirect: login_redirect(req.redirect_path.as_deref()),
    }))
}

pub(crate) fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| {
            error!("Password hashing failed: {}", e);
            ApiError::Internal
        })
}

fn verify_password(password: &str, stored_hash: &str) -> Result<(), ApiError> {
    let parsed_hash = PasswordHash::new(stored_hash).map_err(|e| {
        error!("Stored password hash unreadable: {}", e);
        ApiError::Internal
    })?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)
}

pub(crate) fn create_token(secret: &str, user_id: Uuid, email: &str) -> Result<String, ApiError> {
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        error!("Token signing failed: {}", e);
        ApiError::Internal
    })
}
