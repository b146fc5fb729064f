//! Triangulated irregular network export.
//!
//! Describes the relaxed grid as a piecewise-linear forward transform from
//! `EPSG:4326` to map metres, in the JSON triangulation file format that
//! general-purpose projection libraries read.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use serde_json::{json, Value};

use super::ProjectionError;
use crate::grid::Cell;
use crate::settings::Settings;

pub const FILE_TYPE: &str = "triangulation_file";
pub const FORMAT_VERSION: &str = "1.0";
const NAME: &str = "Individual Discretized Optimized Map Projection";

/// Builds the triangulation file for `cells`.
///
/// Vertices are all active cells plus every kept instance an active cell uses
/// as a neighbour. Triangles are the neighbour fans of all active cells, each
/// triangle emitted once regardless of which corner it was seen from.
///
/// # Arguments
/// * `cells` - All cell instances, indexed by cell index
/// * `settings` - Settings of the run, embedded as the description
pub fn compute_tin(cells: &[Cell], settings: &Settings) -> Value {
    let mut vertex_of: BTreeMap<usize, usize> = BTreeMap::new();
    let mut vertices: Vec<[f64; 4]> = Vec::new();
    let mut vertex = |i: usize| {
        *vertex_of.entry(i).or_insert_with(|| {
            let cell = &cells[i];
            let p = cell.position();
            vertices.push([cell.reference.x, cell.reference.y, p.x, p.y]);
            vertices.len() - 1
        })
    };

    let mut seen: BTreeSet<[usize; 3]> = BTreeSet::new();
    let mut triangles: Vec<[usize; 3]> = Vec::new();
    for cell in cells.iter().filter(|c| c.is_active) {
        for (a, b) in cell.neighbour_triangles() {
            let mut key = [cell.index, a, b];
            key.sort_unstable();
            if seen.insert(key) {
                triangles.push([vertex(cell.index), vertex(a), vertex(b)]);
            }
        }
    }
    log::info!("TIN: {} vertices, {} triangles", vertices.len(), triangles.len());

    json!({
        "file_type": FILE_TYPE,
        "format_version": FORMAT_VERSION,
        "name": NAME,
        "version": "1.0",
        "license": "Creative Commons Attribution 4.0 International",
        "description": settings.to_json(true).to_string(),
        "authority": {
            "name": format!("produced by {}", env!("CARGO_PKG_NAME")),
        },
        "fallback_strategy": "nearest_side",
        "extent": {
            "type": "bbox",
            "name": "world",
            "parameters": [-180, -90, 180, 90],
        },
        "input_crs": "EPSG:4326",
        "output_crs": NAME,
        "transformed_components": "horizontal",
        "vertices_columns": ["source_x", "source_y", "target_x", "target_y"],
        "triangles_columns": ["idx_vertex1", "idx_vertex2", "idx_vertex3"],
        "vertices": vertices,
        "triangles": triangles,
    })
}

/// Writes a triangulation file to `path`.
pub fn write_tin(tin: &Value, path: &Path) -> Result<(), ProjectionError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, tin)?;
    writer.flush()?;
    log::info!("wrote TIN to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridSource, IcosahedralGrid, Topology};

    fn topology() -> Topology {
        let raw = IcosahedralGrid::default().load(2).unwrap();
        Topology::build(&raw, "icosahedral", None).unwrap()
    }

    #[test]
    fn test_tin_structure() {
        let topology = topology();
        let tin = compute_tin(&topology.cells, &Settings::default());
        assert_eq!(tin["file_type"], FILE_TYPE);
        assert_eq!(tin["format_version"], FORMAT_VERSION);

        let vertices = tin["vertices"].as_array().unwrap();
        let triangles = tin["triangles"].as_array().unwrap();
        let active = topology.active_indices().len();
        assert!(vertices.len() >= active);
        assert!(vertices.len() <= topology.cells.len());
        // a closed triangulated sphere has 2V - 4 faces; the plane copy has
        // more because seams are duplicated
        assert!(triangles.len() >= 2 * active - 4);
        for t in triangles {
            let t: Vec<usize> = t
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_u64().unwrap() as usize)
                .collect();
            assert_eq!(t.len(), 3);
            assert!(t.iter().all(|&v| v < vertices.len()));
            assert!(t[0] != t[1] && t[1] != t[2] && t[0] != t[2]);
        }
    }

    #[test]
    fn test_triangles_are_not_duplicated() {
        let topology = topology();
        let tin = compute_tin(&topology.cells, &Settings::default());
        let mut keys = BTreeSet::new();
        for t in tin["triangles"].as_array().unwrap() {
            let mut key: Vec<u64> = t.as_array().unwrap().iter().map(|v| v.as_u64().unwrap()).collect();
            key.sort_unstable();
            assert!(keys.insert(key));
        }
    }

    #[test]
    fn test_description_holds_settings() {
        let tin = compute_tin(&topology().cells, &Settings::default());
        let description: Value = serde_json::from_str(tin["description"].as_str().unwrap()).unwrap();
        assert!(Settings::from_json(description).is_ok());
    }

    #[test]
    fn test_write_tin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grid.tin.json");
        let tin = compute_tin(&topology().cells, &Settings::default());
        write_tin(&tin, &path).unwrap();
        let back: Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(back["triangles"], tin["triangles"]);
        assert_eq!(
            back["vertices"].as_array().unwrap().len(),
            tin["vertices"].as_array().unwrap().len()
        );
    }
}
