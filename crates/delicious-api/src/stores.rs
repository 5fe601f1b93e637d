use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use delicious_core::validate::{is_valid_coordinate, normalize_tags};
use delicious_core::{DEFAULT_TOP_LIMIT, Error, SlugPattern, geo, slug};
use delicious_db::Database;
use delicious_types::api::{
    Claims, ReviewWithAuthor, StoreDetail, StorePage, StoreRequest, TagsResponse, TopResponse,
};
use delicious_types::models::{Location, Store};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

const PAGE_SIZE: u32 = 6;
const MAX_TOP_LIMIT: usize = 50;
const SEARCH_LIMIT: u32 = 5;

/// A concurrent writer can take the slug between lookup and insert.
const MAX_SLUG_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct NearQuery {
    pub lat: f64,
    pub lng: f64,
}

pub async fn list_stores(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page.max(1);
    let offset = u64::from(page - 1) * u64::from(PAGE_SIZE);

    let (stores, count) = blocking(&state, move |db| db.list_stores(PAGE_SIZE, offset)).await?;
    let pages = count.div_ceil(u64::from(PAGE_SIZE)).max(1) as u32;

    Ok(Json(StorePage {
        stores,
        page,
        pages,
        count,
    }))
}

pub async fn create_store(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StoreRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fields = validate_store(req)?;
    let store = Store {
        id: Uuid::new_v4(),
        name: fields.name,
        slug: String::new(),
        description: fields.description,
        tags: fields.tags,
        location: fields.location,
        photo: fields.photo,
        author_id: Some(claims.sub),
        created_at: Utc::now(),
    };

    let store = blocking(&state, move |db| insert_with_slug(db, store)).await?;
    info!("Store {} created by {}", store.slug, claims.sub);

    Ok((StatusCode::CREATED, Json(store)))
}

pub async fn update_store(
    State(state): State<AppState>,
    Path(store_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StoreRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let fields = validate_store(req)?;

    let current = blocking(&state, move |db| db.get_store_by_id(store_id))
        .await?
        .ok_or(ApiError::NotFound("Store not found"))?;

    if current.author_id != Some(claims.sub) {
        warn!("User {} tried to edit store {}", claims.sub, store_id);
        return Err(ApiError::Forbidden("You must own a store in order to edit it!"));
    }

    let store = Store {
        name: fields.name,
        description: fields.description,
        tags: fields.tags,
        location: fields.location,
        photo: fields.photo,
        ..current.clone()
    };

    let store = blocking(&state, move |db| update_with_slug(db, store, &current)).await?;
    Ok(Json(store))
}

pub async fn get_store(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = blocking(&state, move |db| {
        let Some(store) = db.get_store_by_slug(&slug)? else {
            return Ok(None);
        };
        let reviews = db
            .get_reviews_for_store(store.id)?
            .into_iter()
            .map(|(review, author_name)| ReviewWithAuthor {
                review,
                author_name,
            })
            .collect();
        Ok(Some(StoreDetail { store, reviews }))
    })
    .await?
    .ok_or(ApiError::NotFound("Store not found"))?;

    Ok(Json(detail))
}

pub async fn tags(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    tags_page(state, None).await
}

pub async fn tag(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    tags_page(state, Some(tag)).await
}

async fn tags_page(state: AppState, tag: Option<String>) -> Result<Json<TagsResponse>, ApiError> {
    let selected = tag.clone();
    let (tags, stores) = blocking(&state, move |db| {
        let tags = db.tag_frequencies()?;
        let stores = db.get_stores_by_tag(selected.as_deref())?;
        Ok((tags, stores))
    })
    .await?;

    Ok(Json(TagsResponse { tags, tag, stores }))
}

pub async fn top(
    State(state): State<AppState>,
    Query(query): Query<TopQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_LIMIT).min(MAX_TOP_LIMIT);
    let stores = blocking(&state, move |db| db.top_rated(limit)).await?;
    Ok(Json(TopResponse { stores }))
}

pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let q = query.q.trim().to_string();
    if q.is_empty() {
        return Ok(Json(Vec::<Store>::new()));
    }

    let stores = blocking(&state, move |db| db.search_stores(&q, SEARCH_LIMIT)).await?;
    Ok(Json(stores))
}

pub async fn near(
    State(state): State<AppState>,
    Query(query): Query<NearQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if !is_valid_coordinate(query.lat, query.lng) {
        return Err(ApiError::invalid("Coordinates are out of range"));
    }

    let stores = blocking(&state, move |db| {
        let all = db.get_all_stores()?;
        Ok(geo::nearest(all, query.lat, query.lng, geo::NEAR_RADIUS_KM, geo::NEAR_LIMIT))
    })
    .await?;

    Ok(Json(stores))
}

/// Store fields after trimming and validation.
struct StoreFields {
    name: String,
    description: String,
    tags: Vec<String>,
    location: Location,
    photo: Option<String>,
}

fn validate_store(req: StoreRequest) -> Result<StoreFields, ApiError> {
    let name = req.name.trim().to_string();
    let address = req.location.address.trim().to_string();

    let mut errors = Vec::new();
    if name.is_empty() {
        errors.push("Please enter a name for the store!".to_string());
    } else if slug::slugify(&name).is_empty() {
        errors.push("Store name needs at least one letter or digit".to_string());
    }
    if address.is_empty() {
        errors.push("You must supply an address!".to_string());
    }
    if !is_valid_coordinate(req.location.lat, req.location.lng) {
        errors.push("You must add valid coordinates".to_string());
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    Ok(StoreFields {
        name,
        description: req.description.trim().to_string(),
        tags: normalize_tags(&req.tags),
        location: Location {
            lat: req.location.lat,
            lng: req.location.lng,
            address,
        },
        photo: req.photo.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
    })
}

fn insert_with_slug(db: &Database, store: Store) -> delicious_core::Result<Store> {
    let id = store.id;
    persist_with_slug(
        store,
        None,
        |p| db.slugs_matching(p, Some(id)),
        |s| db.insert_store(s),
    )
}

fn update_with_slug(db: &Database, store: Store, current: &Store) -> delicious_core::Result<Store> {
    let id = store.id;
    persist_with_slug(
        store,
        Some(current),
        |p| db.slugs_matching(p, Some(id)),
        |s| db.update_store(s),
    )
}

/// Resolve the slug and write the store, retrying when the slug was taken
/// between lookup and write. `current` is the stored version on update.
fn persist_with_slug<L, W>(
    mut store: Store,
    current: Option<&Store>,
    mut lookup: L,
    mut write: W,
) -> delicious_core::Result<Store>
where
    L: FnMut(&SlugPattern) -> delicious_core::Result<Vec<String>>,
    W: FnMut(&Store) -> delicious_core::Result<()>,
{
    let mut attempt = 1;

    loop {
        store.slug = slug::resolve(current, &store.name, &mut lookup)?;

        match write(&store) {
            Err(Error::DuplicateKey(msg)) if attempt < MAX_SLUG_ATTEMPTS => {
                warn!("Slug {} taken on attempt {} ({}), retrying", store.slug, attempt, msg);
                attempt += 1;
            }
            other => return other.map(|()| store),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn draft(name: &str) -> Store {
        Store {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: String::new(),
            description: String::new(),
            tags: vec![],
            location: Location {
                lat: 43.2,
                lng: -79.8,
                address: "1 King St".to_string(),
            },
            photo: None,
            author_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn same_name_gets_suffixes() {
        let db = db();
        let a = insert_with_slug(&db, draft("Wild Wings")).unwrap();
        let b = insert_with_slug(&db, draft("Wild Wings")).unwrap();
        assert_eq!(a.slug, "wild-wings");
        assert_eq!(b.slug, "wild-wings-2");
    }

    #[test]
    fn rename_back_and_forth() {
        let db = db();
        let original = insert_with_slug(&db, draft("Wild Wings")).unwrap();

        let unchanged = Store {
            description: "now with sauce".to_string(),
            ..original.clone()
        };
        let unchanged = update_with_slug(&db, unchanged, &original).unwrap();
        assert_eq!(unchanged.slug, "wild-wings");

        // Same base as before; the store must not collide with its own slug.
        let recased = Store {
            name: "WILD wings".to_string(),
            ..unchanged.clone()
        };
        let recased = update_with_slug(&db, recased, &unchanged).unwrap();
        assert_eq!(recased.slug, "wild-wings");
    }

    #[test]
    fn stale_lookup_retries_with_fresh_slugs() {
        let stored = RefCell::new(vec!["deli".to_string()]);
        let lookups = Cell::new(0);

        let store = persist_with_slug(
            draft("Deli"),
            None,
            |p| {
                lookups.set(lookups.get() + 1);
                // The first read misses a concurrent insert.
                if lookups.get() == 1 {
                    return Ok(vec![]);
                }
                Ok(stored.borrow().iter().filter(|s| p.is_match(s)).cloned().collect())
            },
            |s| {
                if stored.borrow().contains(&s.slug) {
                    return Err(Error::DuplicateKey(s.slug.clone()));
                }
                stored.borrow_mut().push(s.slug.clone());
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(store.slug, "deli-2");
        assert_eq!(lookups.get(), 2);
        assert_eq!(*stored.borrow(), vec!["deli", "deli-2"]);
    }

    #[test]
    fn gives_up_after_repeated_conflicts() {
        let writes = Cell::new(0);

        let err = persist_with_slug(
            draft("Deli"),
            None,
            |_| Ok(vec![]),
            |s| {
                writes.set(writes.get() + 1);
                Err(Error::DuplicateKey(s.slug.clone()))
            },
        )
        .unwrap_err();

        assert!(matches!(err, Error::DuplicateKey(_)));
        assert_eq!(writes.get(), MAX_SLUG_ATTEMPTS);
    }

    #[test]
    fn other_write_errors_are_not_retried() {
        let writes = Cell::new(0);

        let err = persist_with_slug(
            draft("Deli"),
            None,
            |_| Ok(vec![]),
            |_| {
                writes.set(writes.get() + 1);
                Err(Error::StorageUnavailable("disk full".into()))
            },
        )
        .unwrap_err();

        assert!(matches!(err, Error::StorageUnavailable(_)));
        assert_eq!(writes.get(), 1);
    }

    #[test]
    fn validation_collects_every_problem() {
        let req = StoreRequest {
            name: "  ".to_string(),
            description: String::new(),
            tags: vec![],
            location: Location {
                lat: 200.0,
                lng: 0.0,
                address: String::new(),
            },
            photo: None,
        };
        match validate_store(req) {
            Err(ApiError::Validation(errors)) => assert_eq!(errors.len(), 3),
            _ => panic!("expected validation errors"),
        }
    }
}
