//! Static landmass geometry and distance-to-land queries.
//!
//! Polygons are stored in `(lon, lat)` degrees. Containment is evaluated in
//! the longitude/latitude plane; distances to the boundary are great-circle
//! distances.

use std::path::Path;

use glam::DVec3;
use serde_json::Value;
use thiserror::Error;

use super::geo::{angle_between, angle_to_arc, to_unit_vector, EARTH_RADIUS};
use super::Point;

/// Number of boundary vertices summarised by one coarse bounding cap.
const CHUNK_SIZE: usize = 16;

/// Errors raised while loading landmass data.
#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported GeoJSON geometry: {0}")]
    UnsupportedGeometry(String),
    #[error("Polygon ring has {0} vertices, at least 3 are required")]
    DegenerateRing(usize),
}

/// A land polygon with optional holes (lakes).
#[derive(Debug, Clone)]
pub struct LandPolygon {
    pub exterior: Vec<Point>,
    pub holes: Vec<Vec<Point>>,
}

impl LandPolygon {
    /// Creates a polygon without holes.
    pub fn new(exterior: Vec<Point>) -> Self {
        Self { exterior, holes: Vec::new() }
    }

    /// Returns true if `p` lies inside the exterior ring and outside all holes.
    pub fn contains(&self, p: Point) -> bool {
        ring_contains(&self.exterior, p) && !self.holes.iter().any(|h| ring_contains(h, p))
    }
}

/// A run of consecutive boundary segments with a bounding spherical cap.
#[derive(Debug, Clone)]
struct BoundaryChunk {
    vertices: Vec<DVec3>,
    centre: DVec3,
    radius: f64,
}

impl BoundaryChunk {
    fn new(vertices: Vec<DVec3>) -> Self {
        let sum: DVec3 = vertices.iter().copied().sum();
        let centre = if sum.length_squared() > 0.0 { sum.normalize() } else { vertices[0] };
        let radius = vertices
            .iter()
            .map(|v| angle_between(centre, *v))
            .fold(0.0, f64::max);
        Self { vertices, centre, radius }
    }

    fn lower_bound(&self, p: DVec3) -> f64 {
        (angle_between(p, self.centre) - self.radius).max(0.0)
    }

    fn angle_to(&self, p: DVec3) -> f64 {
        self.vertices
            .windows(2)
            .map(|w| angle_to_arc(p, w[0], w[1]))
            .fold(f64::INFINITY, f64::min)
    }
}

/// Prepared landmass: polygons plus a coarse index of their boundaries.
#[derive(Debug, Clone, Default)]
pub struct Landmass {
    polygons: Vec<LandPolygon>,
    bounds: Vec<(Point, Point)>,
    chunks: Vec<BoundaryChunk>,
}

impl Landmass {
    /// Prepares the given polygons for containment and distance queries.
    pub fn from_polygons(polygons: Vec<LandPolygon>) -> Result<Self, GeometryError> {
        let mut bounds = Vec::with_capacity(polygons.len());
        let mut chunks = Vec::new();
        for polygon in &polygons {
            for ring in std::iter::once(&polygon.exterior).chain(polygon.holes.iter()) {
                if ring.len() < 3 {
                    return Err(GeometryError::DegenerateRing(ring.len()));
                }
                let mut closed: Vec<DVec3> = ring.iter().map(|p| to_unit_vector(*p)).collect();
                closed.push(closed[0]);
                // chunks overlap by one vertex so that no segment is lost
                let mut start = 0;
                while start + 1 < closed.len() {
                    let end = (start + CHUNK_SIZE).min(closed.len() - 1);
                    chunks.push(BoundaryChunk::new(closed[start..=end].to_vec()));
                    start = end;
                }
            }
            let (mut min, mut max) = (polygon.exterior[0], polygon.exterior[0]);
            for p in &polygon.exterior {
                min = min.min(*p);
                max = max.max(*p);
            }
            bounds.push((min, max));
        }
        Ok(Self { polygons, bounds, chunks })
    }

    /// Parses a GeoJSON `FeatureCollection`, `Feature`, `Polygon` or
    /// `MultiPolygon` document.
    pub fn from_geojson_str(data: &str) -> Result<Self, GeometryError> {
        let value: Value = serde_json::from_str(data)?;
        let mut polygons = Vec::new();
        collect_polygons(&value, &mut polygons)?;
        Self::from_polygons(polygons)
    }

    /// Reads a GeoJSON file, see [`Landmass::from_geojson_str`].
    pub fn from_geojson_file(path: &Path) -> Result<Self, GeometryError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_geojson_str(&data)
    }

    /// Number of land polygons.
    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    /// Returns true if there is no land at all.
    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Returns true if `p` is on land.
    pub fn contains(&self, p: Point) -> bool {
        self.polygons.iter().zip(&self.bounds).any(|(polygon, (min, max))| {
            p.x >= min.x && p.x <= max.x && p.y >= min.y && p.y <= max.y && polygon.contains(p)
        })
    }

    /// Great-circle distance in metres from `p` to the nearest land boundary,
    /// or `0` if `p` is on land. Infinite if there is no land.
    ///
    /// Chunks are visited in order of their cap lower bound; the fine segment
    /// search stops as soon as no remaining chunk can beat the best distance.
    pub fn distance_to_land(&self, p: Point) -> f64 {
        if self.contains(p) {
            return 0.0;
        }
        let v = to_unit_vector(p);
        let mut candidates: Vec<(f64, usize)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (chunk.lower_bound(v), i))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut best = f64::INFINITY;
        for (bound, i) in candidates {
            if bound >= best {
                break;
            }
            best = best.min(self.chunks[i].angle_to(v));
        }
        best * EARTH_RADIUS
    }
}

fn ring_contains(ring: &[Point], p: Point) -> bool {
    let n = ring.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn parse_ring(value: &Value) -> Result<Vec<Point>, GeometryError> {
    let coords = value
        .as_array()
        .ok_or_else(|| GeometryError::UnsupportedGeometry("ring is not an array".into()))?;
    let mut ring = Vec::with_capacity(coords.len());
    for c in coords {
        let xy = c.as_array().filter(|xy| xy.len() >= 2).ok_or_else(|| {
            GeometryError::UnsupportedGeometry("position is not a coordinate pair".into())
        })?;
        match (xy[0].as_f64(), xy[1].as_f64()) {
            (Some(x), Some(y)) => ring.push(Point::new(x, y)),
            _ => return Err(GeometryError::UnsupportedGeometry("non-numeric coordinate".into())),
        }
    }
    // GeoJSON rings repeat the first vertex
    if ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
    Ok(ring)
}

fn parse_polygon(value: &Value) -> Result<LandPolygon, GeometryError> {
    let rings = value
        .as_array()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| GeometryError::UnsupportedGeometry("polygon without rings".into()))?;
    let exterior = parse_ring(&rings[0])?;
    let holes = rings[1..].iter().map(parse_ring).collect::<Result<Vec<_>, _>>()?;
    Ok(LandPolygon { exterior, holes })
}

fn collect_polygons(value: &Value, out: &mut Vec<LandPolygon>) -> Result<(), GeometryError> {
    match value.get("type").and_then(Value::as_str) {
        Some("FeatureCollection") => {
            if let Some(features) = value.get("features").and_then(Value::as_array) {
                for feature in features {
                    collect_polygons(feature, out)?;
                }
            }
            Ok(())
        }
        Some("Feature") => match value.get("geometry") {
            Some(Value::Null) | None => Ok(()),
            Some(geometry) => collect_polygons(geometry, out),
        },
        Some("Polygon") => {
            out.push(parse_polygon(&value["coordinates"])?);
            Ok(())
        }
        Some("MultiPolygon") => {
            let polygons = value["coordinates"].as_array().ok_or_else(|| {
                GeometryError::UnsupportedGeometry("MultiPolygon without coordinates".into())
            })?;
            for polygon in polygons {
                out.push(parse_polygon(polygon)?);
            }
            Ok(())
        }
        Some(other) => Err(GeometryError::UnsupportedGeometry(other.to_string())),
        None => Err(GeometryError::UnsupportedGeometry("missing type".into())),
    }
}
