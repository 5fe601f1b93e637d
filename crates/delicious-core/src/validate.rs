use crate::error::{Error, Result};

pub const MIN_RATING: i64 = 1;
pub const MAX_RATING: i64 = 5;

const GMAIL_DOMAINS: &[&str] = &["gmail.com", "googlemail.com"];

/// Trim and lowercase; drop `+subaddress` on Gmail addresses (dots are kept).
pub fn normalize_email(raw: &str) -> String {
    let email = raw.trim().to_lowercase();
    match email.rsplit_once('@') {
        Some((local, domain)) if GMAIL_DOMAINS.contains(&domain) => {
            let local = local.split('+').next().unwrap_or(local);
            format!("{}@{}", local, domain)
        }
        _ => email,
    }
}

/// Loose structural check: `local@domain.tld`, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    if local.is_empty() || local.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

pub fn parse_rating(raw: i64) -> Result<u8> {
    if (MIN_RATING..=MAX_RATING).contains(&raw) {
        Ok(raw as u8)
    } else {
        Err(Error::InvalidRating(raw))
    }
}

/// Trimmed, non-empty, first occurrence wins.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

pub fn is_valid_coordinate(lat: f64, lng: f64) -> bool {
    lat.is_finite()
        && lng.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lng)
}

/// Only site-relative paths other than `/` survive; everything else goes home.
pub fn login_redirect(requested: Option<&str>) -> String {
    match requested {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && path != "/" => {
            path.to_string()
        }
        _ => "/".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Wes@Example.COM "), "wes@example.com");
        assert_eq!(normalize_email("first.last+news@gmail.com"), "first.last@gmail.com");
        assert_eq!(normalize_email("me+tag@example.com"), "me+tag@example.com");
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("wes@example.com"));
        assert!(!is_valid_email("wes@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("we s@example.com"));
        assert!(!is_valid_email("wes@@example.com"));
        assert!(!is_valid_email("wes@example..com"));
    }

    #[test]
    fn ratings_bounded() {
        assert_eq!(parse_rating(1).unwrap(), 1);
        assert_eq!(parse_rating(5).unwrap(), 5);
        assert!(matches!(parse_rating(0), Err(Error::InvalidRating(0))));
        assert!(matches!(parse_rating(6), Err(Error::InvalidRating(6))));
    }

    #[test]
    fn tags_cleaned() {
        let raw = vec![" Wifi ".to_string(), "".to_string(), "Wifi".to_string(), "Vegan".to_string()];
        assert_eq!(normalize_tags(&raw), vec!["Wifi", "Vegan"]);
    }

    #[test]
    fn coordinates_bounded() {
        assert!(is_valid_coordinate(43.2, -79.8));
        assert!(!is_valid_coordinate(91.0, 0.0));
        assert!(!is_valid_coordinate(0.0, f64::NAN));
    }

    #[test]
    fn redirect_rules() {
        assert_eq!(login_redirect(Some("/hearts")), "/hearts");
        assert_eq!(login_redirect(Some("/")), "/");
        assert_eq!(login_redirect(Some("https://evil.example")), "/");
        assert_eq!(login_redirect(Some("//evil.example")), "/");
        assert_eq!(login_redirect(None), "/");
    }
}
