use serde::{Deserialize, Serialize};

use crate::types::LatLon;

const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Haversine great-circle distance between two lat/lon points in miles.
pub fn haversine_distance_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_MILES * c
}

/// Axis-aligned bounding box over a polygon ring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn of_ring(ring: &[LatLon]) -> Option<BoundingBox> {
        let first = ring.first()?;
        let mut bbox = BoundingBox {
            min_lat: first.lat,
            min_lon: first.lon,
            max_lat: first.lat,
            max_lon: first.lon,
        };
        for p in &ring[1..] {
            bbox.min_lat = bbox.min_lat.min(p.lat);
            bbox.min_lon = bbox.min_lon.min(p.lon);
            bbox.max_lat = bbox.max_lat.max(p.lat);
            bbox.max_lon = bbox.max_lon.max(p.lon);
        }
        Some(bbox)
    }

    /// Shortest distance from a point to the box in miles. Zero when the
    /// point lies inside.
    pub fn distance_miles(&self, lat: f64, lon: f64) -> f64 {
        let nearest_lat = lat.clamp(self.min_lat, self.max_lat);
        let nearest_lon = lon.clamp(self.min_lon, self.max_lon);
        haversine_distance_miles(lat, lon, nearest_lat, nearest_lon)
    }
}

/// Ray-casting point-in-polygon test over a single ring. Rings smaller than
/// a triangle contain nothing.
pub fn point_in_ring(lat: f64, lon: f64, ring: &[LatLon]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (yi, xi) = (ring[i].lat, ring[i].lon);
        let (yj, xj) = (ring[j].lat, ring[j].lon);
        if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Distance in miles from a point to a polygon ring: zero inside, otherwise
/// the minimum distance to any edge. Edges are measured on a local
/// equirectangular plane centered on the point, which is accurate at
/// warning-polygon scale.
pub fn distance_to_ring_miles(lat: f64, lon: f64, ring: &[LatLon]) -> f64 {
    if ring.len() < 2 {
        return f64::INFINITY;
    }
    if point_in_ring(lat, lon, ring) {
        return 0.0;
    }

    let cos_lat = lat.to_radians().cos();
    let project = |p: &LatLon| {
        (
            (p.lon - lon).to_radians() * cos_lat * EARTH_RADIUS_MILES,
            (p.lat - lat).to_radians() * EARTH_RADIUS_MILES,
        )
    };

    let mut min_dist = f64::INFINITY;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (ax, ay) = project(&ring[j]);
        let (bx, by) = project(&ring[i]);
        min_dist = min_dist.min(segment_distance_from_origin(ax, ay, bx, by));
        j = i;
    }
    min_dist
}

/// Distance from the origin to the segment (a, b) on a plane.
fn segment_distance_from_origin(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    let dx = bx - ax;
    let dy = by - ay;
    let len2 = dx * dx + dy * dy;
    let t = if len2 == 0.0 {
        0.0
    } else {
        ((-ax * dx - ay * dy) / len2).clamp(0.0, 1.0)
    };
    let px = ax + t * dx;
    let py = ay + t * dy;
    (px * px + py * py).sqrt()
}
