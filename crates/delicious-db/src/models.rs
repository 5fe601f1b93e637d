//! Database row types — these map directly to SQLite rows.
//! Distinct from delicious-types API models to keep the DB layer independent.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

use delicious_core::gravatar_url;
use delicious_core::validate::parse_rating;
use delicious_types::models::{Location, Review, Store, User};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub reset_token: Option<String>,
    pub reset_expires: Option<String>,
    pub created_at: String,
}

impl UserRow {
    pub fn uuid(&self) -> Uuid {
        parse_uuid(&self.id, "user id")
    }

    pub fn into_user(self, hearts: Vec<Uuid>) -> User {
        User {
            id: self.uuid(),
            gravatar: gravatar_url(&self.email),
            created_at: parse_timestamp(&self.created_at),
            email: self.email,
            name: self.name,
            hearts,
        }
    }
}

pub struct StoreRow {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub lat: f64,
    pub lng: f64,
    pub address: String,
    pub photo: Option<String>,
    pub author_id: Option<String>,
    pub created_at: String,
}

impl StoreRow {
    pub fn into_store(self, tags: Vec<String>) -> Store {
        Store {
            id: parse_uuid(&self.id, "store id"),
            author_id: self.author_id.as_deref().map(|a| parse_uuid(a, "store author")),
            created_at: parse_timestamp(&self.created_at),
            name: self.name,
            slug: self.slug,
            description: self.description,
            tags,
            location: Location {
                lat: self.lat,
                lng: self.lng,
                address: self.address,
            },
            photo: self.photo,
        }
    }
}

pub struct ReviewRow {
    pub id: String,
    pub store_id: String,
    pub author_id: String,
    pub rating: i64,
    pub text: String,
    pub created_at: String,
}

impl ReviewRow {
    /// `None` when the stored rating is outside 1..=5; such a row must not
    /// reach an average.
    pub fn into_review(self) -> Option<Review> {
        let rating = match parse_rating(self.rating) {
            Ok(rating) => rating,
            Err(_) => {
                warn!("Skipping review '{}' with corrupt rating {}", self.id, self.rating);
                return None;
            }
        };
        Some(Review {
            id: parse_uuid(&self.id, "review id"),
            store_id: parse_uuid(&self.store_id, "review store"),
            author_id: parse_uuid(&self.author_id, "review author"),
            rating,
            text: self.text,
            created_at: parse_timestamp(&self.created_at),
        })
    }
}

/// Fixed-width RFC 3339 so lexical order in SQL matches time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone; treat it as UTC.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(rating: i64) -> ReviewRow {
        ReviewRow {
            id: Uuid::new_v4().to_string(),
            store_id: Uuid::new_v4().to_string(),
            author_id: Uuid::new_v4().to_string(),
            rating,
            text: String::new(),
            created_at: "2024-05-01T12:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn ratings_outside_range_are_dropped() {
        for rating in [0, 6, -3, 300] {
            assert!(row(rating).into_review().is_none(), "rating {rating}");
        }
        assert_eq!(row(1).into_review().unwrap().rating, 1);
        assert_eq!(row(5).into_review().unwrap().rating, 5);
    }

    #[test]
    fn timestamps_parse_both_formats() {
        let rfc = parse_timestamp("2024-05-01T12:00:00.000000Z");
        let naive = parse_timestamp("2024-05-01 12:00:00");
        assert_eq!(rfc, naive);
        assert_eq!(format_timestamp(rfc), "2024-05-01T12:00:00.000000Z");
    }
}
