use std::collections::HashSet;

use deunicode::deunicode;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use delicious_types::models::Store;

use crate::error::{Error, Result};

/// Lowercase, hyphen-separated ASCII form of `name`.
///
/// Accents are folded (`é` -> `e`), apostrophes vanish, and every other run of
/// non-alphanumeric characters becomes a single hyphen. Leading and trailing
/// hyphens are dropped. May return an empty string.
pub fn slugify(name: &str) -> String {
    let ascii = deunicode(name);
    let mut slug = String::with_capacity(ascii.len());
    let mut pending_dash = false;

    for ch in ascii.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            slug.push(ch.to_ascii_lowercase());
            pending_dash = false;
        } else if ch != '\'' {
            pending_dash = true;
        }
    }

    slug
}

/// Matches `base` and every `base-N` derived from it, case-insensitively.
#[derive(Debug, Clone)]
pub struct SlugPattern {
    base: String,
    regex: Regex,
}

impl SlugPattern {
    pub fn new(base: &str) -> Result<Self> {
        let regex = RegexBuilder::new(&format!("^({})(-[0-9]+)?$", regex::escape(base)))
            .case_insensitive(true)
            .build()
            .map_err(|_| Error::InvalidName(base.to_string()))?;

        Ok(Self {
            base: base.to_string(),
            regex,
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn is_match(&self, slug: &str) -> bool {
        self.regex.is_match(slug)
    }

    /// Numeric suffix of a matching slug. The bare base counts as 1.
    pub fn suffix_of(&self, slug: &str) -> Option<u64> {
        let caps = self.regex.captures(slug)?;
        match caps.get(2) {
            None => Some(1),
            Some(m) => m.as_str()[1..].parse().ok(),
        }
    }
}

/// Pick a slug for `name` that none of the existing slugs already uses.
///
/// `lookup` returns the stored slugs matching the pattern; it may return
/// extra rows, only real matches are considered. The result is `base` when
/// nothing matches, otherwise `base-(k+1)` where `k` is the highest suffix in
/// use. Gaps left by deleted stores are never refilled, unless `k` is already
/// `u64::MAX`, in which case the lowest free suffix is used.
pub fn assign<F>(name: &str, lookup: F) -> Result<String>
where
    F: FnOnce(&SlugPattern) -> Result<Vec<String>>,
{
    let base = slugify(name);
    if base.is_empty() {
        return Err(Error::InvalidName(name.to_string()));
    }

    let pattern = SlugPattern::new(&base)?;
    let existing: Vec<String> = lookup(&pattern)?
        .into_iter()
        .filter(|s| pattern.is_match(s))
        .collect();

    if existing.is_empty() {
        debug!("Assigned slug {} (no existing matches)", base);
        return Ok(base);
    }

    // Suffixes too large for u64 still occupy their slug; they can never
    // equal a candidate we print, so they only need to block the base.
    let taken: HashSet<u64> = existing.iter().filter_map(|s| pattern.suffix_of(s)).collect();
    let next = taken
        .iter()
        .max()
        .and_then(|n| n.checked_add(1))
        .filter(|n| !taken.contains(n))
        .unwrap_or_else(|| lowest_free_suffix(&taken));

    let slug = format!("{}-{}", base, next);
    debug!("Assigned slug {} ({} existing matches)", slug, existing.len());
    Ok(slug)
}

/// Smallest suffix from 2 upward not in `taken`. Used when the highest
/// suffix cannot be incremented or no match has a suffix that fits in u64.
fn lowest_free_suffix(taken: &HashSet<u64>) -> u64 {
    (2..=u64::MAX).find(|n| !taken.contains(n)).unwrap_or(u64::MAX)
}

/// Pre-persistence slug step for create (`current = None`) and update.
///
/// An update that keeps the stored name keeps the stored slug and never
/// touches storage.
pub fn resolve<F>(current: Option<&Store>, name: &str, lookup: F) -> Result<String>
where
    F: FnOnce(&SlugPattern) -> Result<Vec<String>>,
{
    match current {
        Some(store) if store.name == name => Ok(store.slug.clone()),
        _ => assign(name, lookup),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use delicious_types::models::Location;
    use uuid::Uuid;

    fn store(name: &str, slug: &str) -> Store {
        Store {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            description: String::new(),
            tags: vec![],
            location: Location {
                lat: 0.0,
                lng: 0.0,
                address: "nowhere".to_string(),
            },
            photo: None,
            author_id: None,
            created_at: Utc::now(),
        }
    }

    fn matching(existing: &[&str]) -> impl FnOnce(&SlugPattern) -> Result<Vec<String>> {
        let existing: Vec<String> = existing.iter().map(|s| s.to_string()).collect();
        move |pattern| Ok(existing.into_iter().filter(|s| pattern.is_match(s)).collect())
    }

    #[test]
    fn slugify_folds_accents_and_punctuation() {
        assert_eq!(slugify("Café de Paris!!!"), "cafe-de-paris");
        assert_eq!(slugify("  --Tim Hortons--  "), "tim-hortons");
        assert_eq!(slugify("Bob's Burgers & Fries"), "bobs-burgers-fries");
        assert_eq!(slugify("Ümlaut   Straße 42"), "umlaut-strasse-42");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn first_slug_is_the_base() {
        let slug = assign("Café de Paris!!!", matching(&[])).unwrap();
        assert_eq!(slug, "cafe-de-paris");
    }

    #[test]
    fn collisions_count_upward() {
        let mut taken: Vec<String> = Vec::new();
        for expected in ["wild-wings", "wild-wings-2", "wild-wings-3", "wild-wings-4"] {
            let refs: Vec<&str> = taken.iter().map(String::as_str).collect();
            let slug = assign("Wild Wings", matching(&refs)).unwrap();
            assert_eq!(slug, expected);
            assert!(!taken.contains(&slug));
            taken.push(slug);
        }
    }

    #[test]
    fn gaps_are_not_reused() {
        // wild-wings-2 was deleted; a count-based suffix would hand out -3 again.
        let slug = assign("Wild Wings", matching(&["wild-wings", "wild-wings-3"])).unwrap();
        assert_eq!(slug, "wild-wings-4");
    }

    #[test]
    fn suffix_at_u64_max_does_not_repeat_a_taken_slug() {
        let taken = ["deli", "deli-18446744073709551615"];
        let slug = assign("Deli", matching(&taken)).unwrap();
        assert!(!taken.contains(&slug.as_str()));
        assert_eq!(slug, "deli-2");
    }

    #[test]
    fn oversized_suffixes_count_as_occupied() {
        let huge = "deli-99999999999999999999999999";
        assert_eq!(assign("Deli", matching(&[huge])).unwrap(), "deli-2");
        assert_eq!(assign("Deli", matching(&["deli", huge])).unwrap(), "deli-2");
        assert_eq!(assign("Deli", matching(&["deli", "deli-7", huge])).unwrap(), "deli-8");
    }

    #[test]
    fn lookup_noise_is_ignored() {
        let lookup = |_: &SlugPattern| {
            Ok(vec![
                "wild-wings-express".to_string(),
                "wild-wingsx".to_string(),
                "wild-wings-2b".to_string(),
            ])
        };
        assert_eq!(assign("Wild Wings", lookup).unwrap(), "wild-wings");
    }

    #[test]
    fn pattern_is_case_insensitive() {
        let pattern = SlugPattern::new("deli").unwrap();
        assert!(pattern.is_match("DELI"));
        assert_eq!(pattern.suffix_of("Deli-7"), Some(7));
        assert_eq!(pattern.suffix_of("deli"), Some(1));
        assert_eq!(pattern.suffix_of("delight"), None);
    }

    #[test]
    fn empty_slug_is_rejected() {
        let err = assign("???", matching(&[])).unwrap_err();
        assert!(matches!(err, Error::InvalidName(_)));
    }

    #[test]
    fn lookup_failure_propagates() {
        let err = assign("Deli", |_| Err(Error::StorageUnavailable("down".into()))).unwrap_err();
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }

    #[test]
    fn unchanged_name_keeps_slug_without_lookup() {
        let existing = store("Wild Wings", "wild-wings-2");
        let slug = resolve(Some(&existing), "Wild Wings", |_| {
            panic!("lookup must not run for an unchanged name")
        })
        .unwrap();
        assert_eq!(slug, "wild-wings-2");
    }

    #[test]
    fn renamed_store_gets_fresh_slug() {
        let existing = store("Wild Wings", "wild-wings");
        let slug = resolve(Some(&existing), "Tame Wings", matching(&["tame-wings"])).unwrap();
        assert_eq!(slug, "tame-wings-2");
    }
}
