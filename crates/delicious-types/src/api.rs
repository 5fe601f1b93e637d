use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Location, RankedStore, Review, Store, TagCount, User};

// -- JWT Claims --

/// Bearer token claims issued at register/login and checked by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Where the client wanted to go before it was bounced to login.
    #[serde(default)]
    pub redirect_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
    pub redirect: String,
}

// -- Account --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAccountRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResetPasswordRequest {
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// -- Stores --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub location: Location,
    #[serde(default)]
    pub photo: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StorePage {
    pub stores: Vec<Store>,
    pub page: u32,
    pub pages: u32,
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct ReviewWithAuthor {
    #[serde(flatten)]
    pub review: Review,
    pub author_name: String,
}

#[derive(Debug, Serialize)]
pub struct StoreDetail {
    #[serde(flatten)]
    pub store: Store,
    pub reviews: Vec<ReviewWithAuthor>,
}

#[derive(Debug, Serialize)]
pub struct TagsResponse {
    pub tags: Vec<TagCount>,
    pub tag: Option<String>,
    pub stores: Vec<Store>,
}

#[derive(Debug, Serialize)]
pub struct TopResponse {
    pub stores: Vec<RankedStore>,
}

#[derive(Debug, Serialize)]
pub struct HeartResponse {
    pub hearted: bool,
    pub hearts: Vec<Uuid>,
}

// -- Reviews --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewRequest {
    pub rating: i64,
    #[serde(default)]
    pub text: String,
}
