use delicious_types::models::Store;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Radius used by the map endpoint.
pub const NEAR_RADIUS_KM: f64 = 10.0;
pub const NEAR_LIMIT: usize = 10;

/// Great-circle distance in kilometres.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// Stores within `max_km` of the origin, nearest first, at most `limit`.
pub fn nearest(stores: Vec<Store>, lat: f64, lng: f64, max_km: f64, limit: usize) -> Vec<Store> {
    let mut hits: Vec<(f64, Store)> = stores
        .into_iter()
        .map(|s| (haversine_km(lat, lng, s.location.lat, s.location.lng), s))
        .filter(|(d, _)| *d <= max_km)
        .collect();

    hits.sort_by(|a, b| a.0.total_cmp(&b.0));
    hits.into_iter().take(limit).map(|(_, s)| s).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use delicious_types::models::Location;
    use uuid::Uuid;

    fn at(name: &str, lat: f64, lng: f64) -> Store {
        Store {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: name.to_lowercase(),
            description: String::new(),
            tags: vec![],
            location: Location { lat, lng, address: String::new() },
            photo: None,
            author_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn distance_to_self_is_zero() {
        assert!(haversine_km(43.2, -79.8, 43.2, -79.8).abs() < 1e-9);
    }

    #[test]
    fn hamilton_to_toronto() {
        let d = haversine_km(43.2557, -79.8711, 43.6532, -79.3832);
        assert!((55.0..66.0).contains(&d), "got {d}");
    }

    #[test]
    fn nearest_filters_and_orders() {
        let stores = vec![
            at("far", 43.6532, -79.3832),
            at("close", 43.201, -79.801),
            at("closer", 43.2001, -79.8001),
        ];
        let names: Vec<String> = nearest(stores, 43.2, -79.8, NEAR_RADIUS_KM, NEAR_LIMIT)
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["closer", "close"]);
    }
}
