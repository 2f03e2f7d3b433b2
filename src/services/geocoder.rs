use serde::{Deserialize, Serialize};

use crate::utils::error::AppError;

/// Client for a Nominatim-compatible forward geocoding endpoint.
#[derive(Clone)]
pub struct Geocoder {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Nominatim returns coordinates as strings.
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

impl Geocoder {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// Resolve a free-text address. `Ok(None)` means the address did not
    /// resolve; callers decide what a miss means for their route. `Err` is
    /// reserved for transport or decode failures.
    pub async fn lookup(&self, address: &str) -> Result<Option<Coordinates>, AppError> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let places: Vec<Place> = self
            .http
            .get(&url)
            .query(&[("q", address), ("format", "jsonv2"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| AppError::external("geocoder", e))?
            .error_for_status()
            .map_err(|e| AppError::external("geocoder", e))?
            .json()
            .await
            .map_err(|e| AppError::external("geocoder", e))?;

        Ok(first_coordinates(places))
    }
}

fn first_coordinates(places: Vec<Place>) -> Option<Coordinates> {
    places.into_iter().next().and_then(|place| {
        let lat = place.lat.parse().ok()?;
        let lon = place.lon.parse().ok()?;
        Some(Coordinates { lat, lon })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_result_set_is_a_miss() {
        assert!(first_coordinates(vec![]).is_none());
    }

    #[test]
    fn first_place_wins() {
        let places = vec![
            Place {
                lat: "40.4168".to_string(),
                lon: "-3.7038".to_string(),
            },
            Place {
                lat: "0".to_string(),
                lon: "0".to_string(),
            },
        ];
        let coords = first_coordinates(places).unwrap();
        assert!((coords.lat - 40.4168).abs() < f64::EPSILON);
        assert!((coords.lon - -3.7038).abs() < f64::EPSILON);
    }

    #[test]
    fn unparseable_coordinates_count_as_a_miss() {
        let places = vec![Place {
            lat: "forty".to_string(),
            lon: "-3.7".to_string(),
        }];
        assert!(first_coordinates(places).is_none());
    }
}
