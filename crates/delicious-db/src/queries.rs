use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Params, Row, ffi, params, types::ToSql};
use tracing::debug;
use uuid::Uuid;

use delicious_core::{Error, Result, SlugPattern, ranking};
use delicious_types::models::{RankedStore, Review, Store, TagCount, User};

use crate::Database;
use crate::models::{ReviewRow, StoreRow, UserRow, format_timestamp};

const USER_COLUMNS: &str = "id, email, name, password, reset_token, reset_expires, created_at";

const STORE_COLUMNS: &str =
    "s.id, s.name, s.slug, s.description, s.lat, s.lng, s.address, s.photo, s.author_id, s.created_at";

const REVIEW_COLUMNS: &str = "r.id, r.store_id, r.author_id, r.rating, r.text, r.created_at";

/// Keeps `IN (...)` lists well under SQLite's bound-parameter limit.
const TAG_BATCH: usize = 500;

impl Database {
    // -- Users --

    pub fn create_user(&self, id: Uuid, email: &str, name: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, name, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.to_string(), email, name, password_hash, format_timestamp(Utc::now())],
            )
            .storage()?;
            Ok(())
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", [email]))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", [id.to_string()]))
    }

    /// Public view of a user, hearts included.
    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let Some(row) = query_user(conn, "id = ?1", [id.to_string()])? else {
                return Ok(None);
            };
            let hearts = query_hearts(conn, &row.id)?;
            Ok(Some(row.into_user(hearts)))
        })
    }

    pub fn update_account(&self, id: Uuid, name: &str, email: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET name = ?2, email = ?3 WHERE id = ?1",
                    params![id.to_string(), name, email],
                )
                .storage()?;
            if changed == 0 {
                return Err(Error::NotFound);
            }
            Ok(())
        })
    }

    pub fn set_reset_token(&self, id: Uuid, token: &str, expires: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET reset_token = ?2, reset_expires = ?3 WHERE id = ?1",
                params![id.to_string(), token, format_timestamp(expires)],
            )
            .storage()?;
            Ok(())
        })
    }

    pub fn clear_reset_token(&self, id: Uuid) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET reset_token = NULL, reset_expires = NULL WHERE id = ?1",
                [id.to_string()],
            )
            .storage()?;
            Ok(())
        })
    }

    /// User holding `token`, provided it has not expired at `now`.
    pub fn get_user_by_reset_token(&self, token: &str, now: DateTime<Utc>) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "reset_token = ?1 AND reset_expires > ?2",
                params![token, format_timestamp(now)],
            )
        })
    }

    /// Store the new hash and burn the reset token.
    pub fn reset_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE users SET password = ?2, reset_token = NULL, reset_expires = NULL WHERE id = ?1",
                    params![id.to_string(), password_hash],
                )
                .storage()?;
            if changed == 0 {
                return Err(Error::NotFound);
            }
            Ok(())
        })
    }

    // -- Hearts --

    /// Toggle a heart: removes if present, inserts if not.
    /// Returns whether the store is now hearted plus the user's full heart list.
    pub fn toggle_heart(&self, user_id: Uuid, store_id: Uuid) -> Result<(bool, Vec<Uuid>)> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction().storage()?;
            let uid = user_id.to_string();
            let sid = store_id.to_string();

            let store_exists: Option<i64> = tx
                .query_row("SELECT 1 FROM stores WHERE id = ?1", [&sid], |row| row.get(0))
                .optional()?;
            if store_exists.is_none() {
                return Err(Error::NotFound);
            }

            let removed = tx
                .execute(
                    "DELETE FROM hearts WHERE user_id = ?1 AND store_id = ?2",
                    [&uid, &sid],
                )
                .storage()?;

            let hearted = removed == 0;
            if hearted {
                tx.execute(
                    "INSERT INTO hearts (user_id, store_id, created_at) VALUES (?1, ?2, ?3)",
                    params![uid, sid, format_timestamp(Utc::now())],
                )
                .storage()?;
            }

            let hearts = query_hearts(&tx, &uid)?;
            tx.commit().storage()?;
            Ok((hearted, hearts))
        })
    }

    pub fn get_hearts(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| query_hearts(conn, &user_id.to_string()))
    }

    pub fn get_hearted_stores(&self, user_id: Uuid) -> Result<Vec<Store>> {
        self.with_conn(|conn| {
            query_stores(
                conn,
                "JOIN hearts h ON h.store_id = s.id WHERE h.user_id = ?1 ORDER BY h.created_at DESC",
                [user_id.to_string()],
            )
        })
    }

    // -- Stores --

    /// Slugs that may collide with `pattern`. `exclude` skips the store being
    /// renamed so it never collides with itself.
    pub fn slugs_matching(&self, pattern: &SlugPattern, exclude: Option<Uuid>) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT slug FROM stores WHERE (slug = ?1 OR slug LIKE ?2) AND id IS NOT ?3")
                .storage()?;
            let slugs = stmt
                .query_map(
                    params![
                        pattern.base(),
                        format!("{}-%", pattern.base()),
                        exclude.map(|id| id.to_string())
                    ],
                    |row| row.get::<_, String>(0),
                )
                .storage()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .storage()?;

            Ok(slugs.into_iter().filter(|s| pattern.is_match(s)).collect())
        })
    }

    /// Insert a store and its tags. A taken slug surfaces as `DuplicateKey`.
    pub fn insert_store(&self, store: &Store) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction().storage()?;
            let id = store.id.to_string();
            tx.execute(
                "INSERT INTO stores (id, name, slug, description, lat, lng, address, photo, author_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    id,
                    store.name,
                    store.slug,
                    store.description,
                    store.location.lat,
                    store.location.lng,
                    store.location.address,
                    store.photo,
                    store.author_id.map(|a| a.to_string()),
                    format_timestamp(store.created_at),
                ],
            )
            .storage()?;
            write_tags(&tx, &id, &store.tags)?;
            tx.commit().storage()?;

            debug!("Inserted store {} ({})", store.slug, id);
            Ok(())
        })
    }

    /// Overwrite the mutable fields of an existing store and replace its tags.
    pub fn update_store(&self, store: &Store) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction().storage()?;
            let id = store.id.to_string();
            let changed = tx
                .execute(
                    "UPDATE stores
                     SET name = ?2, slug = ?3, description = ?4, lat = ?5, lng = ?6, address = ?7, photo = ?8
                     WHERE id = ?1",
                    params![
                        id,
                        store.name,
                        store.slug,
                        store.description,
                        store.location.lat,
                        store.location.lng,
                        store.location.address,
                        store.photo,
                    ],
                )
                .storage()?;
            if changed == 0 {
                return Err(Error::NotFound);
            }

            tx.execute("DELETE FROM store_tags WHERE store_id = ?1", [&id]).storage()?;
            write_tags(&tx, &id, &store.tags)?;
            tx.commit().storage()?;
            Ok(())
        })
    }

    pub fn get_store_by_id(&self, id: Uuid) -> Result<Option<Store>> {
        self.with_conn(|conn| {
            Ok(query_stores(conn, "WHERE s.id = ?1", [id.to_string()])?.into_iter().next())
        })
    }

    pub fn get_store_by_slug(&self, slug: &str) -> Result<Option<Store>> {
        self.with_conn(|conn| Ok(query_stores(conn, "WHERE s.slug = ?1", [slug])?.into_iter().next()))
    }

    /// One page of stores, newest first, plus the total count.
    pub fn list_stores(&self, limit: u32, offset: u64) -> Result<(Vec<Store>, u64)> {
        self.with_conn(|conn| {
            let stores = query_stores(
                conn,
                "ORDER BY s.created_at DESC, s.id LIMIT ?1 OFFSET ?2",
                params![limit, offset as i64],
            )?;
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM stores", [], |row| row.get(0))
                .storage()?;
            Ok((stores, count.max(0) as u64))
        })
    }

    pub fn get_all_stores(&self) -> Result<Vec<Store>> {
        self.with_conn(|conn| query_stores(conn, "ORDER BY s.created_at DESC, s.id", []))
    }

    /// Stores carrying `tag`, or every store when no tag is selected.
    pub fn get_stores_by_tag(&self, tag: Option<&str>) -> Result<Vec<Store>> {
        match tag {
            Some(tag) => self.with_conn(|conn| {
                query_stores(
                    conn,
                    "WHERE EXISTS (SELECT 1 FROM store_tags t WHERE t.store_id = s.id AND t.tag = ?1)
                     ORDER BY s.created_at DESC, s.id",
                    [tag],
                )
            }),
            None => self.get_all_stores(),
        }
    }

    /// Case-insensitive substring search over name and description.
    /// Name hits rank ahead of description-only hits.
    pub fn search_stores(&self, query: &str, limit: u32) -> Result<Vec<Store>> {
        let needle = format!("%{}%", escape_like(query));
        self.with_conn(|conn| {
            query_stores(
                conn,
                "WHERE s.name LIKE ?1 ESCAPE '\\' OR s.description LIKE ?1 ESCAPE '\\'
                 ORDER BY (s.name LIKE ?1 ESCAPE '\\') DESC, s.name, s.id
                 LIMIT ?2",
                params![needle, limit],
            )
        })
    }

    // -- Reviews --

    pub fn insert_review(&self, review: &Review) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reviews (id, store_id, author_id, rating, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    review.id.to_string(),
                    review.store_id.to_string(),
                    review.author_id.to_string(),
                    review.rating,
                    review.text,
                    format_timestamp(review.created_at),
                ],
            )
            .storage()?;
            Ok(())
        })
    }

    /// Reviews of one store, newest first, with the author's display name.
    pub fn get_reviews_for_store(&self, store_id: Uuid) -> Result<Vec<(Review, String)>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REVIEW_COLUMNS}, u.name
                 FROM reviews r
                 LEFT JOIN users u ON r.author_id = u.id
                 WHERE r.store_id = ?1
                 ORDER BY r.created_at DESC"
            );
            let mut stmt = conn.prepare(&sql).storage()?;
            let rows = stmt
                .query_map([store_id.to_string()], |row| {
                    let author: Option<String> = row.get(6)?;
                    Ok((review_from_row(row)?, author.unwrap_or_else(|| "unknown".to_string())))
                })
                .storage()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .storage()?;

            Ok(rows
                .into_iter()
                .filter_map(|(r, name)| r.into_review().map(|review| (review, name)))
                .collect())
        })
    }

    // -- Aggregations --

    /// Every store and every review, read inside one transaction.
    pub fn snapshot(&self) -> Result<(Vec<Store>, Vec<Review>)> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction().storage()?;
            let stores = query_stores(&tx, "ORDER BY s.created_at, s.id", [])?;

            let sql = format!("SELECT {REVIEW_COLUMNS} FROM reviews r");
            let mut stmt = tx.prepare(&sql).storage()?;
            let reviews = stmt
                .query_map([], review_from_row)
                .storage()?
                .collect::<rusqlite::Result<Vec<_>>>()
                .storage()?;
            drop(stmt);

            tx.commit().storage()?;
            Ok((stores, reviews.into_iter().filter_map(ReviewRow::into_review).collect()))
        })
    }

    pub fn tag_frequencies(&self) -> Result<Vec<TagCount>> {
        let (stores, _) = self.snapshot()?;
        Ok(ranking::tag_frequencies(&stores))
    }

    pub fn top_rated(&self, limit: usize) -> Result<Vec<RankedStore>> {
        let (stores, reviews) = self.snapshot()?;
        Ok(ranking::top_rated(&stores, &reviews, limit))
    }
}

fn query_user<P: Params>(conn: &Connection, filter: &str, params: P) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}");
    let mut stmt = conn.prepare(&sql).storage()?;

    stmt.query_row(params, |row| {
        Ok(UserRow {
            id: row.get(0)?,
            email: row.get(1)?,
            name: row.get(2)?,
            password: row.get(3)?,
            reset_token: row.get(4)?,
            reset_expires: row.get(5)?,
            created_at: row.get(6)?,
        })
    })
    .optional()
}

fn query_hearts(conn: &Connection, user_id: &str) -> Result<Vec<Uuid>> {
    let mut stmt = conn
        .prepare("SELECT store_id FROM hearts WHERE user_id = ?1 ORDER BY created_at")
        .storage()?;
    let ids = stmt
        .query_map([user_id], |row| row.get::<_, String>(0))
        .storage()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage()?;

    Ok(ids.iter().filter_map(|id| id.parse().ok()).collect())
}

/// `SELECT` stores with whatever joins/filters/order `tail` supplies, then
/// attach their tags in position order.
fn query_stores<P: Params>(conn: &Connection, tail: &str, params: P) -> Result<Vec<Store>> {
    let sql = format!("SELECT {STORE_COLUMNS} FROM stores s {tail}");
    let mut stmt = conn.prepare(&sql).storage()?;
    let rows = stmt
        .query_map(params, store_from_row)
        .storage()?
        .collect::<rusqlite::Result<Vec<_>>>()
        .storage()?;

    attach_tags(conn, rows)
}

fn attach_tags(conn: &Connection, rows: Vec<StoreRow>) -> Result<Vec<Store>> {
    let mut tags: HashMap<String, Vec<String>> = HashMap::new();

    for batch in rows.chunks(TAG_BATCH) {
        let placeholders: Vec<String> = (1..=batch.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT store_id, tag FROM store_tags WHERE store_id IN ({}) ORDER BY store_id, position",
            placeholders.join(", ")
        );

        let mut stmt = conn.prepare(&sql).storage()?;
        let params: Vec<&dyn ToSql> = batch.iter().map(|r| &r.id as &dyn ToSql).collect();
        let pairs = stmt
            .query_map(params.as_slice(), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .storage()?;

        for pair in pairs {
            let (store_id, tag) = pair.storage()?;
            tags.entry(store_id).or_default().push(tag);
        }
    }

    Ok(rows
        .into_iter()
        .map(|row| {
            let store_tags = tags.remove(&row.id).unwrap_or_default();
            row.into_store(store_tags)
        })
        .collect())
}

fn write_tags(conn: &Connection, store_id: &str, tags: &[String]) -> Result<()> {
    let mut stmt = conn
        .prepare("INSERT INTO store_tags (store_id, position, tag) VALUES (?1, ?2, ?3)")
        .storage()?;
    for (position, tag) in tags.iter().enumerate() {
        stmt.execute(params![store_id, position as i64, tag]).storage()?;
    }
    Ok(())
}

fn store_from_row(row: &Row<'_>) -> rusqlite::Result<StoreRow> {
    Ok(StoreRow {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        description: row.get(3)?,
        lat: row.get(4)?,
        lng: row.get(5)?,
        address: row.get(6)?,
        photo: row.get(7)?,
        author_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ReviewRow> {
    Ok(ReviewRow {
        id: row.get(0)?,
        store_id: row.get(1)?,
        author_id: row.get(2)?,
        rating: row.get(3)?,
        text: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Unique and primary-key violations become `DuplicateKey`; every other
/// driver failure means the store is unusable for this request.
fn map_sql_error(err: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(ref e, ref msg) = err {
        if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE
            || e.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        {
            return Error::DuplicateKey(msg.clone().unwrap_or_else(|| "unique constraint".to_string()));
        }
    }
    Error::StorageUnavailable(err.to_string())
}

/// Extension trait mapping driver results into domain errors
trait SqlResultExt<T> {
    fn storage(self) -> Result<T>;
    fn optional(self) -> Result<Option<T>>;
}

impl<T> SqlResultExt<T> for std::result::Result<T, rusqlite::Error> {
    fn storage(self) -> Result<T> {
        self.map_err(map_sql_error)
    }

    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(map_sql_error(e)),
        }
    }
}
