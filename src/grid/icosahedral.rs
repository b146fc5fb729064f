//! Built-in aperture-3 hexagonal grid on the sphere.
//!
//! Starts from an icosahedron with vertices at both poles and refines it by
//! √3-subdivision: every triangle gains a vertex at its centroid and every
//! original edge is flipped to connect the centroids on either side. Each
//! level triples the triangle count, so the vertex count follows the ISEA3H
//! sequence `10·3^r + 2`. Vertices become cell centres; the centroids of the
//! triangles around a vertex become the corners of its hexagon (or one of the
//! twelve pentagons).

use std::collections::HashMap;
use std::f64::consts::PI;

use glam::DVec3;
use rayon::prelude::*;

use super::source::{GridSource, GridStats, RawCell, RawGrid};
use super::GridError;
use crate::geometry::{geo, Point};
use crate::util::Timed;

/// Default upper bound on the refinement level.
pub const DEFAULT_MAX_RESOLUTION: u32 = 9;

/// Grid source generating the grid in-process.
#[derive(Debug, Clone)]
pub struct IcosahedralGrid {
    max_resolution: u32,
}

impl Default for IcosahedralGrid {
    fn default() -> Self {
        Self {
            max_resolution: DEFAULT_MAX_RESOLUTION,
        }
    }
}

impl IcosahedralGrid {
    pub fn new(max_resolution: u32) -> Self {
        Self { max_resolution }
    }

    /// Number of cells at `resolution`.
    pub fn number_of_cells(resolution: u32) -> usize {
        10 * 3_usize.pow(resolution) + 2
    }
}

impl GridSource for IcosahedralGrid {
    fn name(&self) -> &str {
        "icosahedral"
    }

    fn load(&self, resolution: u32) -> Result<RawGrid, GridError> {
        if resolution > self.max_resolution {
            return Err(GridError::UnsupportedResolution {
                resolution,
                source_name: self.name().to_string(),
            });
        }
        let _timer = Timed::info(format!("generate icosahedral grid (resolution {resolution})"));
        let mut mesh = Mesh::icosahedron();
        for _ in 0..resolution {
            mesh = mesh.refine();
        }
        Ok(mesh.into_grid(resolution))
    }
}

/// Closed triangle mesh on the unit sphere with outward-facing
/// counter-clockwise triangles.
struct Mesh {
    vertices: Vec<DVec3>,
    triangles: Vec<[usize; 3]>,
}

impl Mesh {
    fn icosahedron() -> Self {
        let ring_lat = 0.5_f64.atan().to_degrees();
        let mut vertices = vec![DVec3::Z];
        for k in 0..5 {
            vertices.push(geo::to_unit_vector(Point::new(72.0 * k as f64, ring_lat)));
        }
        for k in 0..5 {
            vertices.push(geo::to_unit_vector(Point::new(36.0 + 72.0 * k as f64, -ring_lat)));
        }
        vertices.push(DVec3::NEG_Z);

        let upper = |k: usize| 1 + k % 5;
        let lower = |k: usize| 6 + k % 5;
        let mut triangles = Vec::with_capacity(20);
        for k in 0..5 {
            triangles.push([0, upper(k), upper(k + 1)]);
            triangles.push([upper(k), lower(k), upper(k + 1)]);
            triangles.push([lower(k), lower(k + 1), upper(k + 1)]);
            triangles.push([11, lower(k + 1), lower(k)]);
        }
        let mut mesh = Self {
            vertices,
            triangles,
        };
        mesh.orient_outwards();
        mesh
    }

    fn orient_outwards(&mut self) {
        for t in &mut self.triangles {
            let (a, b, c) = (self.vertices[t[0]], self.vertices[t[1]], self.vertices[t[2]]);
            if (b - a).cross(c - a).dot(a + b + c) < 0.0 {
                t.swap(1, 2);
            }
        }
    }

    fn centroid(&self, t: &[usize; 3]) -> DVec3 {
        t.iter().map(|&i| self.vertices[i]).sum::<DVec3>().normalize()
    }

    /// One level of √3-subdivision.
    fn refine(&self) -> Self {
        let offset = self.vertices.len();
        let mut vertices = self.vertices.clone();
        vertices.extend(self.triangles.iter().map(|t| self.centroid(t)));

        let mut owner: HashMap<(usize, usize), usize> = HashMap::with_capacity(self.triangles.len() * 3);
        for (ti, t) in self.triangles.iter().enumerate() {
            for e in 0..3 {
                owner.insert((t[e], t[(e + 1) % 3]), ti);
            }
        }

        let mut triangles = Vec::with_capacity(self.triangles.len() * 3);
        for (t1, t) in self.triangles.iter().enumerate() {
            for e in 0..3 {
                let (a, b) = (t[e], t[(e + 1) % 3]);
                if a > b {
                    continue;
                }
                let Some(&t2) = owner.get(&(b, a)) else {
                    continue;
                };
                // c1 lies left of a -> b, c2 right of it
                let (c1, c2) = (offset + t1, offset + t2);
                triangles.push([a, c2, c1]);
                triangles.push([c2, b, c1]);
            }
        }
        Self {
            vertices,
            triangles,
        }
    }

    fn into_grid(self, resolution: u32) -> RawGrid {
        let mut incident: Vec<Vec<usize>> = vec![Vec::new(); self.vertices.len()];
        let mut adjacent: Vec<Vec<usize>> = vec![Vec::new(); self.vertices.len()];
        for (ti, t) in self.triangles.iter().enumerate() {
            for e in 0..3 {
                incident[t[e]].push(ti);
                let (a, b) = (t[e], t[(e + 1) % 3]);
                if !adjacent[a].contains(&b) {
                    adjacent[a].push(b);
                }
                if !adjacent[b].contains(&a) {
                    adjacent[b].push(a);
                }
            }
        }

        let cells: Vec<RawCell> = (0..self.vertices.len())
            .into_par_iter()
            .map(|v| {
                let centre = geo::from_unit_vector(self.vertices[v]);
                let (east, north) = tangent_basis(centre);
                let mut corners: Vec<(f64, DVec3)> = incident[v]
                    .iter()
                    .map(|&ti| {
                        let c = self.centroid(&self.triangles[ti]);
                        let d = c - self.vertices[v];
                        (d.dot(north).atan2(d.dot(east)), c)
                    })
                    .collect();
                corners.sort_by(|a, b| a.0.total_cmp(&b.0));
                let polygon = corners
                    .into_iter()
                    .map(|(_, c)| unwrap_longitude(geo::from_unit_vector(c), centre.x))
                    .collect();
                RawCell {
                    id: v as u64 + 1,
                    centre,
                    polygon,
                    neighbours: adjacent[v].iter().map(|&n| n as u64 + 1).collect(),
                }
            })
            .collect();

        let (sum, count) = cells
            .iter()
            .flat_map(|c| c.neighbours.iter().map(move |&n| (c.centre, n)))
            .fold((0.0, 0usize), |(sum, count), (centre, n)| {
                (sum + geo::distance(centre, cells[n as usize - 1].centre), count + 1)
            });
        let number_of_cells = cells.len();
        let stats = GridStats {
            number_of_cells,
            typical_distance: if count > 0 { sum / count as f64 } else { 0.0 },
            typical_area: 4.0 * PI * geo::EARTH_RADIUS * geo::EARTH_RADIUS
                / number_of_cells as f64,
        };
        RawGrid {
            resolution,
            cells,
            stats,
        }
    }
}

/// East and north unit vectors at `(lon, lat)`.
fn tangent_basis(p: Point) -> (DVec3, DVec3) {
    let (lon, lat) = (p.x.to_radians(), p.y.to_radians());
    let east = DVec3::new(-lon.sin(), lon.cos(), 0.0);
    let north = DVec3::new(-lat.sin() * lon.cos(), -lat.sin() * lon.sin(), lat.cos());
    (east, north)
}

/// Shifts `p` by a multiple of 360° so that it is within 180° of `lon`.
fn unwrap_longitude(p: Point, lon: f64) -> Point {
    let d = (p.x - lon + 180.0).rem_euclid(360.0) - 180.0;
    Point::new(lon + d, p.y)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_counts_follow_aperture_three() {
        for r in 0..4 {
            let grid = IcosahedralGrid::default().load(r).unwrap();
            assert_eq!(grid.cells.len(), IcosahedralGrid::number_of_cells(r));
            assert_eq!(grid.stats.number_of_cells, grid.cells.len());
        }
        assert_eq!(IcosahedralGrid::number_of_cells(2), 92);
    }

    #[test]
    fn test_twelve_pentagons_rest_hexagons() {
        let grid = IcosahedralGrid::default().load(3).unwrap();
        let pentagons = grid.cells.iter().filter(|c| c.polygon.len() == 5).count();
        assert_eq!(pentagons, 12);
        for cell in &grid.cells {
            assert!(cell.polygon.len() == 5 || cell.is_hexagon());
            assert_eq!(cell.neighbours.len(), cell.polygon.len());
        }
    }

    #[test]
    fn test_neighbourhood_is_symmetric() {
        let grid = IcosahedralGrid::default().load(2).unwrap();
        for cell in &grid.cells {
            for &n in &cell.neighbours {
                let other = &grid.cells[n as usize - 1];
                assert!(other.neighbours.contains(&cell.id));
            }
        }
    }

    #[test]
    fn test_polygons_tile_the_sphere() {
        let grid = IcosahedralGrid::default().load(2).unwrap();
        let total: f64 = grid.cells.iter().map(|c| geo::area_of_polygon(&c.polygon)).sum();
        let sphere = 4.0 * PI * geo::EARTH_RADIUS * geo::EARTH_RADIUS;
        assert!((total - sphere).abs() / sphere < 1e-9);
    }

    #[test]
    fn test_stats_are_plausible() {
        let grid = IcosahedralGrid::default().load(2).unwrap();
        let td = grid.stats.typical_distance;
        // hexagonal cells: area close to sqrt(3)/2 * d^2
        let ratio = grid.stats.typical_area / (3.0_f64.sqrt() / 2.0 * td * td);
        assert!(ratio > 0.8 && ratio < 1.25, "ratio {ratio}");
        assert!(grid.cells.iter().any(|c| c.centre.y > 90.0 - 1e-9));
    }

    #[test]
    fn test_resolution_limit() {
        let err = IcosahedralGrid::new(1).load(2).unwrap_err();
        assert!(matches!(err, GridError::UnsupportedResolution { resolution: 2, .. }));
    }
}
