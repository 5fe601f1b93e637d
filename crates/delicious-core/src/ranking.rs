use std::collections::HashMap;

use uuid::Uuid;

use delicious_types::models::{RankedStore, Review, Store, TagCount};

pub const DEFAULT_TOP_LIMIT: usize = 10;

/// Stores with fewer reviews than this never appear in the top list.
pub const MIN_REVIEWS: usize = 2;

// -- Tags --

/// One `(store, tag)` pair per tag occurrence.
pub fn unwind_tags(stores: &[Store]) -> Vec<(Uuid, &str)> {
    stores
        .iter()
        .flat_map(|store| store.tags.iter().map(move |tag| (store.id, tag.as_str())))
        .collect()
}

pub fn count_tags<'a, I>(pairs: I) -> HashMap<&'a str, usize>
where
    I: IntoIterator<Item = (Uuid, &'a str)>,
{
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (_, tag) in pairs {
        *counts.entry(tag).or_default() += 1;
    }
    counts
}

/// Highest count first; equal counts in ascending tag order.
pub fn sort_tag_counts(counts: HashMap<&str, usize>) -> Vec<TagCount> {
    let mut tags: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();

    tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    tags
}

pub fn tag_frequencies(stores: &[Store]) -> Vec<TagCount> {
    sort_tag_counts(count_tags(unwind_tags(stores)))
}

// -- Top rated --

#[derive(Debug)]
pub struct JoinedStore<'a> {
    pub store: &'a Store,
    pub scores: Vec<u8>,
}

/// Attach every review score to the store it references. Reviews pointing at
/// unknown stores are dropped.
pub fn join_reviews<'a>(stores: &'a [Store], reviews: &[Review]) -> Vec<JoinedStore<'a>> {
    let mut by_store: HashMap<Uuid, Vec<u8>> = HashMap::new();
    for review in reviews {
        by_store.entry(review.store_id).or_default().push(review.rating);
    }

    stores
        .iter()
        .map(|store| JoinedStore {
            store,
            scores: by_store.remove(&store.id).unwrap_or_default(),
        })
        .collect()
}

pub fn retain_min_reviews(mut joined: Vec<JoinedStore<'_>>, min: usize) -> Vec<JoinedStore<'_>> {
    joined.retain(|j| j.scores.len() >= min);
    joined
}

pub fn average_scores(joined: Vec<JoinedStore<'_>>) -> Vec<RankedStore> {
    joined
        .into_iter()
        .filter(|j| !j.scores.is_empty())
        .map(|j| {
            let total: u32 = j.scores.iter().map(|&s| u32::from(s)).sum();
            RankedStore {
                store: j.store.clone(),
                average_rating: f64::from(total) / j.scores.len() as f64,
                review_count: j.scores.len(),
            }
        })
        .collect()
}

/// Highest mean first. Ties go to the store with more reviews, then by name,
/// then by id so the order never depends on insertion.
pub fn sort_by_average(mut ranked: Vec<RankedStore>) -> Vec<RankedStore> {
    ranked.sort_by(|a, b| {
        b.average_rating
            .total_cmp(&a.average_rating)
            .then_with(|| b.review_count.cmp(&a.review_count))
            .then_with(|| a.store.name.cmp(&b.store.name))
            .then_with(|| a.store.id.cmp(&b.store.id))
    });
    ranked
}

pub fn truncate(mut ranked: Vec<RankedStore>, limit: usize) -> Vec<RankedStore> {
    ranked.truncate(limit);
    ranked
}

pub fn top_rated(stores: &[Store], reviews: &[Review], limit: usize) -> Vec<RankedStore> {
    let joined = retain_min_reviews(join_reviews(stores, reviews), MIN_REVIEWS);
    truncate(sort_by_average(average_scores(joined)), limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use delicious_types::models::Location;

    fn store(name: &str, tags: &[&str]) -> Store {
        Store {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: crate::slug::slugify(name),
            description: String::new(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            location: Location {
                lat: 43.2,
                lng: -79.8,
                address: "1 Main St".to_string(),
            },
            photo: None,
            author_id: None,
            created_at: Utc::now(),
        }
    }

    fn reviews_for(store: &Store, ratings: &[u8]) -> Vec<Review> {
        ratings
            .iter()
            .map(|&rating| Review {
                id: Uuid::new_v4(),
                store_id: store.id,
                author_id: Uuid::new_v4(),
                rating,
                text: String::new(),
                created_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn tag_counts_sorted_by_frequency() {
        let stores = vec![store("One", &["a", "b"]), store("Two", &["a"])];
        let tags = tag_frequencies(&stores);
        assert_eq!(
            tags,
            vec![
                TagCount { tag: "a".into(), count: 2 },
                TagCount { tag: "b".into(), count: 1 },
            ]
        );
    }

    #[test]
    fn tag_ties_break_alphabetically() {
        let stores = vec![
            store("One", &["Wifi", "Family Friendly"]),
            store("Two", &["Open Late", "Wifi"]),
            store("Three", &["Licensed"]),
        ];
        let names: Vec<String> = tag_frequencies(&stores).into_iter().map(|t| t.tag).collect();
        assert_eq!(names, vec!["Wifi", "Family Friendly", "Licensed", "Open Late"]);
    }

    #[test]
    fn unwind_emits_one_pair_per_tag() {
        let stores = vec![store("One", &["a", "b"]), store("Two", &[])];
        let pairs = unwind_tags(&stores);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|(id, _)| *id == stores[0].id));
    }

    #[test]
    fn empty_inputs_yield_empty_results() {
        assert!(tag_frequencies(&[]).is_empty());
        assert!(top_rated(&[], &[], 10).is_empty());
    }

    #[test]
    fn top_rated_skips_single_review_stores() {
        let x = store("X", &[]);
        let y = store("Y", &[]);
        let z = store("Z", &[]);
        let mut reviews = reviews_for(&x, &[4, 5]);
        reviews.extend(reviews_for(&y, &[3]));
        reviews.extend(reviews_for(&z, &[5, 5, 5]));
        let stores = vec![x.clone(), y, z.clone()];

        let top = top_rated(&stores, &reviews, 10);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].store.id, z.id);
        assert_eq!(top[0].average_rating, 5.0);
        assert_eq!(top[0].review_count, 3);
        assert_eq!(top[1].store.id, x.id);
        assert_eq!(top[1].average_rating, 4.5);
    }

    #[test]
    fn top_rated_respects_limit_and_minimum() {
        let stores: Vec<Store> = (0..12).map(|i| store(&format!("Store {i}"), &[])).collect();
        let mut reviews = Vec::new();
        for (i, s) in stores.iter().enumerate() {
            let ratings: Vec<u8> = (0..i % 4).map(|k| ((i + k) % 5 + 1) as u8).collect();
            reviews.extend(reviews_for(s, &ratings));
        }

        for limit in [0, 1, 3, 10, 50] {
            let top = top_rated(&stores, &reviews, limit);
            assert!(top.len() <= limit);
            assert!(top.iter().all(|r| r.review_count >= MIN_REVIEWS));
            assert!(top.windows(2).all(|w| w[0].average_rating >= w[1].average_rating));
        }
    }

    #[test]
    fn equal_averages_prefer_more_reviews() {
        let a = store("Alpha", &[]);
        let b = store("Beta", &[]);
        let mut reviews = reviews_for(&a, &[4, 4]);
        reviews.extend(reviews_for(&b, &[4, 4, 4]));
        let stores = vec![a, b.clone()];

        let top = top_rated(&stores, &reviews, 10);
        assert_eq!(top[0].store.id, b.id);
    }

    #[test]
    fn orphan_reviews_are_dropped() {
        let a = store("Alpha", &[]);
        let ghost = store("Ghost", &[]);
        let reviews = reviews_for(&ghost, &[5, 5]);
        let joined = join_reviews(std::slice::from_ref(&a), &reviews);
        assert_eq!(joined.len(), 1);
        assert!(joined[0].scores.is_empty());
    }
}
