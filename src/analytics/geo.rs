//! Deals and wins per city, placed on the map with cached coordinates.

use serde::Serialize;
use std::collections::BTreeMap;

use super::safe_div;
use crate::domain::Deal;
use crate::pipeline::geocode::in_germany;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CityStats {
    pub city: String,
    pub deals: u64,
    pub paid: u64,
    pub win_rate: f64,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeoReport {
    pub level: Option<String>,
    pub level_options: Vec<String>,
    pub cities: Vec<CityStats>,
    /// Cities with deals but no usable coordinates
    pub unmapped: Vec<String>,
}

/// A paid deal with a known city
pub fn is_success(deal: &Deal) -> bool {
    deal.is_paid && deal.known_city().is_some()
}

pub fn level_options(deals: &[Deal]) -> Vec<String> {
    let mut levels: Vec<String> = deals.iter().filter_map(|d| d.level_norm.clone()).collect();
    levels.sort();
    levels.dedup();
    levels
}

/// Per-city aggregates joined with coordinates; cities outside the German
/// bounding box are left out.
pub fn city_summary<'a>(
    deals: impl IntoIterator<Item = &'a Deal>,
    coords: &BTreeMap<String, (f64, f64)>,
) -> (Vec<CityStats>, Vec<String>) {
    let mut counts: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for deal in deals {
        if let Some(city) = deal.known_city() {
            let entry = counts.entry(city.to_string()).or_default();
            entry.0 += 1;
            entry.1 += is_success(deal) as u64;
        }
    }

    let mut cities = Vec::new();
    let mut unmapped = Vec::new();
    for (city, (deals, paid)) in counts {
        match coords.get(&city) {
            Some(&(lat, lon)) if in_germany(lat, lon) => cities.push(CityStats {
                win_rate: safe_div(paid as f64, deals as f64),
                city,
                deals,
                paid,
                lat,
                lon,
            }),
            _ => unmapped.push(city),
        }
    }
    (cities, unmapped)
}

/// City summary, optionally restricted to one normalized German level.
pub fn analyze(deals: &[Deal], coords: &BTreeMap<String, (f64, f64)>, level: Option<&str>) -> GeoReport {
    let selected = deals
        .iter()
        .filter(|d| level.map_or(true, |l| d.level_norm.as_deref() == Some(l)));
    let (cities, unmapped) = city_summary(selected, coords);
    GeoReport {
        level: level.map(str::to_string),
        level_options: level_options(deals),
        cities,
        unmapped,
    }
}
