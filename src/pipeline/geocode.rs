//! City coordinates for the geo dashboard, resolved once and cached.
//!
//! Resolution order per city: the cache file, the built-in coordinates of
//! major German cities, then an HTTP geocoder when one is configured.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::GeocoderConfig;
use crate::constants as col;
use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::storage::parquet_io;
use crate::table::{Column, ColumnData, Table};

pub const LAT_MIN: f64 = 47.0;
pub const LAT_MAX: f64 = 55.5;
pub const LON_MIN: f64 = 5.0;
pub const LON_MAX: f64 = 16.5;

const CACHE_CITY: &str = "City";
const CACHE_LAT: &str = "lat";
const CACHE_LON: &str = "lon";

pub const MANUAL_COORDS: &[(&str, f64, f64)] = &[
    ("Berlin", 52.5200, 13.4050),
    ("München", 48.1374, 11.5755),
    ("Hamburg", 53.5511, 9.9937),
    ("Leipzig", 51.3397, 12.3731),
    ("Nürnberg", 49.4521, 11.0767),
    ("Düsseldorf", 51.2277, 6.7735),
    ("Dresden", 51.0504, 13.7373),
    ("Köln", 50.9375, 6.9603),
    ("Frankfurt", 50.1109, 8.6821),
    ("Dortmund", 51.5136, 7.4653),
    ("Duisburg", 51.4344, 6.7623),
    ("Mannheim", 49.4875, 8.4660),
    ("Karlsruhe", 49.0069, 8.4037),
    ("Essen", 51.4556, 7.0116),
    ("Bremen", 53.0793, 8.8017),
    ("Oberhausen", 51.4963, 6.8638),
    ("Braunschweig", 52.2689, 10.5268),
    ("Stuttgart", 48.7758, 9.1829),
    ("Bochum", 51.4818, 7.2162),
    ("Aachen", 50.7753, 6.0839),
    ("Hannover", 52.3759, 9.7320),
    ("Augsburg", 48.3705, 10.8978),
    ("Ulm", 48.4011, 9.9876),
    ("Lübeck", 53.8655, 10.6866),
    ("Kassel", 51.3127, 9.4797),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityCoord {
    pub city: String,
    pub lat: f64,
    pub lon: f64,
}

pub fn in_germany(lat: f64, lon: f64) -> bool {
    (LAT_MIN..=LAT_MAX).contains(&lat) && (LON_MIN..=LON_MAX).contains(&lon)
}

fn manual(city: &str) -> Option<(f64, f64)> {
    MANUAL_COORDS
        .iter()
        .find(|(name, _, _)| *name == city)
        .map(|(_, lat, lon)| (*lat, *lon))
}

/// Looks up coordinates for a city name
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, city: &str) -> Result<Option<(f64, f64)>>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// Nominatim-compatible search endpoint
pub struct NominatimGeocoder {
    client: reqwest::Client,
    base_url: String,
    country: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            country: config.country.clone(),
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, city: &str) -> Result<Option<(f64, f64)>> {
        let query = format!("{}, {}", city, self.country);
        let places: Vec<NominatimPlace> = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("format", "json"), ("limit", "1"), ("q", query.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(places
            .first()
            .and_then(|p| Some((p.lat.parse().ok()?, p.lon.parse().ok()?))))
    }
}

/// Distinct usable cities of the cleaned Deals table (blank and `-` excluded).
pub fn distinct_cities(deals: &Table) -> Vec<String> {
    deals
        .text(col::CITY)
        .map(|values| {
            values
                .iter()
                .flatten()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty() && *c != col::NO_CITY)
                .map(str::to_string)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        })
        .unwrap_or_default()
}

pub fn read_cache(path: &Path) -> Result<Vec<CityCoord>> {
    let table = parquet_io::read_parquet("city_coords", path)?;
    let (Some(cities), Some(lats), Some(lons)) = (
        table.text(CACHE_CITY),
        table.float(CACHE_LAT),
        table.float(CACHE_LON),
    ) else {
        warn!(path = %path.display(), "City cache has unexpected columns, ignoring it");
        return Ok(Vec::new());
    };
    Ok(cities
        .iter()
        .zip(lats)
        .zip(lons)
        .filter_map(|((city, lat), lon)| {
            Some(CityCoord {
                city: city.clone()?,
                lat: (*lat)?,
                lon: (*lon)?,
            })
        })
        .collect())
}

pub fn write_cache(path: &Path, coords: &[CityCoord]) -> Result<()> {
    let mut table = Table::new("city_coords");
    table.set_column(Column::new(
        CACHE_CITY,
        ColumnData::Text(coords.iter().map(|c| Some(c.city.clone())).collect()),
    ));
    table.set_column(Column::new(
        CACHE_LAT,
        ColumnData::Float(coords.iter().map(|c| Some(c.lat)).collect()),
    ));
    table.set_column(Column::new(
        CACHE_LON,
        ColumnData::Float(coords.iter().map(|c| Some(c.lon)).collect()),
    ));
    parquet_io::write_parquet(&table, path)
}

fn read_cache_or_empty(path: &Path) -> BTreeMap<String, (f64, f64)> {
    if !path.is_file() {
        return BTreeMap::new();
    }
    match read_cache(path) {
        Ok(coords) => coords.into_iter().map(|c| (c.city, (c.lat, c.lon))).collect(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read city cache");
            BTreeMap::new()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GeocodeSummary {
    pub cities: usize,
    pub from_cache: usize,
    pub from_manual: usize,
    pub from_geocoder: usize,
    pub unresolved: Vec<String>,
}

/// Resolve every city and rewrite the cache once with all resolved cities.
///
/// Geocoder calls are sequential with `delay` between them; a failed lookup
/// is logged and the city skipped.
#[instrument(skip(cities, geocoder), fields(cities = cities.len()))]
pub async fn resolve_cities(
    cities: &[String],
    cache_path: &Path,
    geocoder: Option<&dyn Geocoder>,
    delay: Duration,
) -> Result<GeocodeSummary> {
    let mut cache = read_cache_or_empty(cache_path);
    let mut summary = GeocodeSummary {
        cities: cities.len(),
        ..Default::default()
    };
    let mut requests = 0usize;

    for city in cities {
        if cache.contains_key(city) {
            summary.from_cache += 1;
            metrics::geocode::record_cache_hit();
            continue;
        }
        if let Some(coord) = manual(city) {
            cache.insert(city.clone(), coord);
            summary.from_manual += 1;
            metrics::geocode::record_manual_hit();
            continue;
        }
        let Some(geocoder) = geocoder else {
            summary.unresolved.push(city.clone());
            metrics::geocode::record_miss();
            continue;
        };

        if requests > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        requests += 1;
        match geocoder.geocode(city).await {
            Ok(Some(coord)) => {
                debug!(city = %city, lat = coord.0, lon = coord.1, "Geocoded city");
                metrics::geocode::record_request("hit");
                cache.insert(city.clone(), coord);
                summary.from_geocoder += 1;
            }
            Ok(None) => {
                metrics::geocode::record_request("empty");
                summary.unresolved.push(city.clone());
            }
            Err(e) => {
                warn!(city = %city, error = %e, "Geocoding failed, skipping city");
                metrics::geocode::record_request("error");
                summary.unresolved.push(city.clone());
            }
        }
    }

    let coords: Vec<CityCoord> = cache
        .into_iter()
        .map(|(city, (lat, lon))| CityCoord { city, lat, lon })
        .collect();
    write_cache(cache_path, &coords)?;
    info!(
        cached = coords.len(),
        from_cache = summary.from_cache,
        from_manual = summary.from_manual,
        from_geocoder = summary.from_geocoder,
        unresolved = summary.unresolved.len(),
        "City coordinate cache written"
    );
    Ok(summary)
}

/// Coordinates for the dashboard: cache merged with the built-in list, the
/// cache taking precedence.
pub fn load_coordinates(cache_path: &Path) -> BTreeMap<String, (f64, f64)> {
    let mut coords: BTreeMap<String, (f64, f64)> = MANUAL_COORDS
        .iter()
        .map(|(city, lat, lon)| (city.to_string(), (*lat, *lon)))
        .collect();
    coords.extend(read_cache_or_empty(cache_path));
    coords
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    struct FakeGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn geocode(&self, city: &str) -> Result<Option<(f64, f64)>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(match city {
                "Potsdam" => Some((52.39, 13.06)),
                _ => None,
            })
        }
    }

    #[test]
    fn test_distinct_cities_skip_placeholder() {
        let mut deals = Table::new("Deals");
        deals.set_column(Column::new(
            col::CITY,
            ColumnData::Text(vec![
                Some("Berlin".into()),
                Some("-".into()),
                None,
                Some(" Berlin ".into()),
                Some("Ulm".into()),
            ]),
        ));
        assert_eq!(distinct_cities(&deals), vec!["Berlin", "Ulm"]);
    }

    #[test]
    fn test_bbox() {
        assert!(in_germany(52.52, 13.40));
        assert!(!in_germany(40.71, -74.0));
    }

    #[tokio::test]
    async fn test_resolve_uses_cache_manual_then_geocoder() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("city_coords.parquet");
        write_cache(
            &cache,
            &[CityCoord {
                city: "Cottbus".into(),
                lat: 51.76,
                lon: 14.33,
            }],
        )
        .unwrap();

        let geocoder = FakeGeocoder {
            calls: AtomicUsize::new(0),
        };
        let cities: Vec<String> = ["Cottbus", "Berlin", "Potsdam", "Atlantis"]
            .iter()
            .map(|c| c.to_string())
            .collect();

        let summary = resolve_cities(&cities, &cache, Some(&geocoder as &dyn Geocoder), Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(summary.from_cache, 1);
        assert_eq!(summary.from_manual, 1);
        assert_eq!(summary.from_geocoder, 1);
        assert_eq!(summary.unresolved, vec!["Atlantis".to_string()]);
        assert_eq!(geocoder.calls.load(Ordering::SeqCst), 2);

        let stored = read_cache(&cache).unwrap();
        let names: Vec<_> = stored.iter().map(|c| c.city.as_str()).collect();
        assert_eq!(names, vec!["Berlin", "Cottbus", "Potsdam"]);
    }

    #[tokio::test]
    async fn test_resolve_without_geocoder_leaves_unknown_cities() {
        let dir = tempdir().unwrap();
        let cache = dir.path().join("city_coords.parquet");
        let cities = vec!["Hamburg".to_string(), "Nowhere".to_string()];

        let summary = resolve_cities(&cities, &cache, None, Duration::ZERO).await.unwrap();

        assert_eq!(summary.from_manual, 1);
        assert_eq!(summary.unresolved, vec!["Nowhere".to_string()]);
        assert!(load_coordinates(&cache).contains_key("Hamburg"));
    }
}
