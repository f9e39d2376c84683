//! Proximity search over aggregated records
//!
//! Each record's `Market` is located through the static table in
//! [`crate::data::markets`]; records whose market is unknown cannot be placed
//! and are left out of the result.

use serde::Deserialize;

use crate::data::{find_market, Field, Record};

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Field appended to records returned by [`nearby`]
pub const DISTANCE_FIELD: &str = "DistanceKm";

/// A point given by the caller
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Great-circle distance between two points in kilometres
pub fn haversine_km(from: Coordinates, to: Coordinates) -> f64 {
    let d_lat = (to.latitude - from.latitude).to_radians();
    let d_lon = (to.longitude - from.longitude).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.latitude.to_radians().cos()
            * to.latitude.to_radians().cos()
            * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Records whose market lies within `radius_km` of `user`, nearest first
///
/// Returned records are copies carrying an extra `DistanceKm` field; ties keep
/// their input order.
pub fn nearby(records: &[Record], user: Coordinates, radius_km: f64) -> Vec<Record> {
    let mut within: Vec<(f64, Record)> = records
        .iter()
        .filter_map(|record| {
            let market = find_market(&record.text(Field::Market))?;
            let distance = haversine_km(
                user,
                Coordinates {
                    latitude: market.latitude,
                    longitude: market.longitude,
                },
            );
            (distance <= radius_km)
                .then(|| (distance, record.with_field(DISTANCE_FIELD, round2(distance))))
        })
        .collect();

    within.sort_by(|a, b| a.0.total_cmp(&b.0));
    within.into_iter().map(|(_, record)| record).collect()
}
