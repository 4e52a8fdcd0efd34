//! Boundary filter: point-in-polygon classification
//!
//! Uses the crossing-number test with longitude as x and latitude as y.
//! The test is winding independent. Points on an edge or vertex are treated
//! as inside. Boundaries crossing the antimeridian are not supported.

use crate::error::RefineError;
use serde::Serialize;
use std::collections::HashSet;

/// Distance (degrees) under which a point counts as lying on an edge
const EDGE_TOLERANCE: f64 = 1e-9;

/// A latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Result of classifying one row's coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    Inside,
    Outside,
    /// Missing, non-finite or out-of-range coordinates
    Unlocatable,
}

/// Single closed ring of at least three distinct vertices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polygon {
    vertices: Vec<GeoPoint>,
    #[serde(skip)]
    bbox: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct BoundingBox {
    min_lat: f64,
    max_lat: f64,
    min_lon: f64,
    max_lon: f64,
}

impl Polygon {
    /// Build a ring; an explicit closing vertex equal to the first is dropped
    pub fn new(mut vertices: Vec<GeoPoint>) -> Result<Self, RefineError> {
        if vertices
            .iter()
            .any(|v| !v.lat.is_finite() || !v.lon.is_finite())
        {
            return Err(RefineError::Config(
                "polygon contains non-finite coordinates".to_string(),
            ));
        }

        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }

        // `+ 0.0` folds -0.0 into 0.0 so equal coordinates share their bits
        let distinct: HashSet<(u64, u64)> = vertices
            .iter()
            .map(|v| ((v.lat + 0.0).to_bits(), (v.lon + 0.0).to_bits()))
            .collect();
        if distinct.len() < 3 {
            return Err(RefineError::Config(format!(
                "polygon needs at least 3 distinct vertices, found {}",
                distinct.len()
            )));
        }

        let bbox = vertices.iter().fold(
            BoundingBox {
                min_lat: f64::INFINITY,
                max_lat: f64::NEG_INFINITY,
                min_lon: f64::INFINITY,
                max_lon: f64::NEG_INFINITY,
            },
            |b, v| BoundingBox {
                min_lat: b.min_lat.min(v.lat),
                max_lat: b.max_lat.max(v.lat),
                min_lon: b.min_lon.min(v.lon),
                max_lon: b.max_lon.max(v.lon),
            },
        );

        Ok(Self { vertices, bbox })
    }

    /// Build from `(lat, lon)` tuples
    pub fn from_lat_lon(points: &[(f64, f64)]) -> Result<Self, RefineError> {
        Self::new(points.iter().map(|&(lat, lon)| GeoPoint::new(lat, lon)).collect())
    }

    pub fn vertices(&self) -> &[GeoPoint] {
        &self.vertices
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Vertex average; inside for convex rings
    pub fn centroid(&self) -> GeoPoint {
        let n = self.vertices.len() as f64;
        let (lat, lon) = self
            .vertices
            .iter()
            .fold((0.0, 0.0), |(lat, lon), v| (lat + v.lat, lon + v.lon));
        GeoPoint::new(lat / n, lon / n)
    }

    /// Classify a coordinate pair
    pub fn classify(&self, lat: Option<f64>, lon: Option<f64>) -> Location {
        let (lat, lon) = match (lat, lon) {
            (Some(lat), Some(lon)) => (lat, lon),
            _ => return Location::Unlocatable,
        };
        if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
            return Location::Unlocatable;
        }

        let b = &self.bbox;
        if lat < b.min_lat - EDGE_TOLERANCE
            || lat > b.max_lat + EDGE_TOLERANCE
            || lon < b.min_lon - EDGE_TOLERANCE
            || lon > b.max_lon + EDGE_TOLERANCE
        {
            return Location::Outside;
        }

        if self.on_edge(lat, lon) || self.crossings(lat, lon) % 2 == 1 {
            Location::Inside
        } else {
            Location::Outside
        }
    }

    fn edges(&self) -> impl Iterator<Item = (GeoPoint, GeoPoint)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    fn crossings(&self, lat: f64, lon: f64) -> usize {
        self.edges()
            .filter(|(a, b)| {
                // Half-open rule so a ray through a vertex counts once
                if (a.lat > lat) == (b.lat > lat) {
                    return false;
                }
                let x_at = a.lon + (lat - a.lat) * (b.lon - a.lon) / (b.lat - a.lat);
                lon < x_at
            })
            .count()
    }

    fn on_edge(&self, lat: f64, lon: f64) -> bool {
        self.edges().any(|(a, b)| {
            let (dx, dy) = (b.lon - a.lon, b.lat - a.lat);
            let len_sq = dx * dx + dy * dy;
            if len_sq == 0.0 {
                return (lon - a.lon).hypot(lat - a.lat) <= EDGE_TOLERANCE;
            }
            let t = (((lon - a.lon) * dx + (lat - a.lat) * dy) / len_sq).clamp(0.0, 1.0);
            let (px, py) = (a.lon + t * dx, a.lat + t * dy);
            (lon - px).hypot(lat - py) <= EDGE_TOLERANCE
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        // (lat, lon) corners of a 2x2 degree box around (1, 0)
        Polygon::from_lat_lon(&[(0.0, -1.0), (0.0, 1.0), (2.0, 1.0), (2.0, -1.0)]).unwrap()
    }

    #[test]
    fn test_centroid_inside() {
        let poly = square();
        let c = poly.centroid();
        assert_eq!(poly.classify(Some(c.lat), Some(c.lon)), Location::Inside);
    }

    #[test]
    fn test_far_point_outside() {
        assert_eq!(square().classify(Some(45.0), Some(120.0)), Location::Outside);
        assert_eq!(square().classify(Some(3.0), Some(0.0)), Location::Outside);
    }

    #[test]
    fn test_invalid_coordinates_unlocatable() {
        let poly = square();
        assert_eq!(poly.classify(Some(999.0), Some(0.0)), Location::Unlocatable);
        assert_eq!(poly.classify(Some(1.0), Some(-181.0)), Location::Unlocatable);
        assert_eq!(poly.classify(None, Some(0.0)), Location::Unlocatable);
        assert_eq!(poly.classify(Some(f64::NAN), Some(0.0)), Location::Unlocatable);
    }

    #[test]
    fn test_edge_and_vertex_are_inside() {
        let poly = square();
        assert_eq!(poly.classify(Some(0.0), Some(0.0)), Location::Inside);
        assert_eq!(poly.classify(Some(1.0), Some(1.0)), Location::Inside);
        assert_eq!(poly.classify(Some(2.0), Some(-1.0)), Location::Inside);
    }

    #[test]
    fn test_winding_independent() {
        let cw = Polygon::from_lat_lon(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)]).unwrap();
        let ccw = Polygon::from_lat_lon(&[(0.0, 4.0), (4.0, 4.0), (4.0, 0.0), (0.0, 0.0)]).unwrap();
        for (lat, lon) in [(1.0, 1.0), (3.5, 0.5), (5.0, 2.0), (-1.0, -1.0)] {
            assert_eq!(cw.classify(Some(lat), Some(lon)), ccw.classify(Some(lat), Some(lon)));
        }
    }

    #[test]
    fn test_concave_notch_excluded() {
        // U shape: notch between lon 1..3 above lat 1
        let u = Polygon::from_lat_lon(&[
            (0.0, 0.0),
            (0.0, 4.0),
            (4.0, 4.0),
            (4.0, 3.0),
            (1.0, 3.0),
            (1.0, 1.0),
            (4.0, 1.0),
            (4.0, 0.0),
        ])
        .unwrap();
        assert_eq!(u.classify(Some(3.0), Some(2.0)), Location::Outside);
        assert_eq!(u.classify(Some(3.0), Some(0.5)), Location::Inside);
        assert_eq!(u.classify(Some(0.5), Some(2.0)), Location::Inside);
    }

    #[test]
    fn test_closing_vertex_dropped() {
        let closed =
            Polygon::from_lat_lon(&[(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (0.0, 0.0)]).unwrap();
        assert_eq!(closed.vertex_count(), 3);
    }

    #[test]
    fn test_distinct_vertices_on_large_rings() {
        assert!(Polygon::from_lat_lon(&[(0.0, 0.0), (-0.0, -0.0), (1.0, 1.0)]).is_err());

        let ring: Vec<(f64, f64)> = (0..10_000)
            .map(|i| {
                let angle = i as f64 * std::f64::consts::TAU / 10_000.0;
                (angle.sin(), angle.cos())
            })
            .collect();
        assert_eq!(Polygon::from_lat_lon(&ring).unwrap().vertex_count(), 10_000);
    }

    #[test]
    fn test_degenerate_polygons_rejected() {
        assert!(Polygon::from_lat_lon(&[(0.0, 0.0), (1.0, 1.0)]).is_err());
        assert!(Polygon::from_lat_lon(&[(0.0, 0.0), (1.0, 1.0), (0.0, 0.0), (1.0, 1.0)]).is_err());
        assert!(Polygon::from_lat_lon(&[(0.0, 0.0), (f64::NAN, 1.0), (1.0, 0.0)]).is_err());
    }
}
