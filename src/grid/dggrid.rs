//! Reader for the output files of the DGGRID grid generator.
//!
//! Expects, in one directory, the files written by a `GENERATE_GRID` run with
//! `cell_output_type AIGEN` and `neighbor_output_type TEXT`, plus the standard
//! output of an `OUTPUT_STATS` run:
//!
//! - `cells-<res>.gen`: per cell a header line `id lon lat`, the boundary
//!   vertices `lon lat` (closed), and `END`; a final `END` ends the file.
//! - `cells-<res>.nbr`: per cell a line `id n1 n2 ...`.
//! - `stats.txt`: a table headed `Res  # Cells  Area (km^2)  CLS (km)`.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::source::{GridSource, GridStats, RawCell, RawGrid};
use super::GridError;
use crate::geometry::Point;

const STATS_HEADER: [&str; 7] = ["Res", "#", "Cells", "Area", "(km^2)", "CLS", "(km)"];

/// Grid source backed by pre-generated DGGRID files.
#[derive(Debug, Clone)]
pub struct DggridFiles {
    directory: PathBuf,
}

impl DggridFiles {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn cells_path(&self, resolution: u32) -> PathBuf {
        self.directory.join(format!("cells-{resolution}.gen"))
    }

    pub fn neighbours_path(&self, resolution: u32) -> PathBuf {
        self.directory.join(format!("cells-{resolution}.nbr"))
    }

    pub fn stats_path(&self) -> PathBuf {
        self.directory.join("stats.txt")
    }
}

impl GridSource for DggridFiles {
    fn name(&self) -> &str {
        "dggrid"
    }

    fn load(&self, resolution: u32) -> Result<RawGrid, GridError> {
        let cells_path = self.cells_path(resolution);
        let neighbours_path = self.neighbours_path(resolution);
        let stats_path = self.stats_path();
        log::info!("reading DGGRID files from {}", self.directory.display());

        let cells = parse_cells(&read(&cells_path)?, &display(&cells_path))?;
        let mut neighbours = parse_neighbours(&read(&neighbours_path)?, &display(&neighbours_path))?;
        let stats = parse_stats(&read(&stats_path)?, &display(&stats_path))?;
        let stats = stats
            .get(&resolution)
            .copied()
            .ok_or_else(|| GridError::UnsupportedResolution {
                resolution,
                source_name: self.name().to_string(),
            })?;

        let cells = cells
            .into_iter()
            .map(|(id, centre, polygon)| RawCell {
                id,
                centre,
                polygon,
                neighbours: neighbours.remove(&id).unwrap_or_default(),
            })
            .collect();
        if let Some(&id) = neighbours.keys().next() {
            return Err(GridError::MissingCell(id));
        }
        Ok(RawGrid {
            resolution,
            cells,
            stats,
        })
    }
}

fn read(path: &Path) -> Result<String, GridError> {
    Ok(std::fs::read_to_string(path)?)
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn malformed(file: &str, line: usize, message: impl Into<String>) -> GridError {
    GridError::Malformed {
        file: file.to_string(),
        line,
        message: message.into(),
    }
}

fn parse_number<T: std::str::FromStr>(token: &str, file: &str, line: usize) -> Result<T, GridError> {
    token
        .replace(',', "")
        .parse()
        .map_err(|_| malformed(file, line, format!("invalid number '{token}'")))
}

fn parse_coordinates(tokens: &[&str], file: &str, line: usize) -> Result<Point, GridError> {
    match tokens {
        [lon, lat] => Ok(Point::new(
            parse_number(lon, file, line)?,
            parse_number(lat, file, line)?,
        )),
        _ => Err(malformed(file, line, "expected a coordinate pair")),
    }
}

/// Parses an AIGEN cell file into `(id, centre, boundary)` records.
///
/// Centres are normalised to `[-180, 180)`; boundaries are unwrapped around
/// their centre and not closed.
pub fn parse_cells(text: &str, file: &str) -> Result<Vec<(u64, Point, Vec<Point>)>, GridError> {
    let mut cells = Vec::new();
    let mut current: Option<(u64, Point, Vec<Point>)> = None;
    let mut finished = false;
    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if finished {
            return Err(malformed(file, line, "content after final END"));
        }
        match (current.take(), tokens.as_slice()) {
            (None, ["END"]) => finished = true,
            (None, [id, rest @ ..]) => {
                let id = parse_number(id, file, line)?;
                let centre = parse_coordinates(rest, file, line)?;
                let lon = (centre.x + 180.0).rem_euclid(360.0) - 180.0;
                current = Some((id, Point::new(lon, centre.y), Vec::new()));
            }
            (Some((id, centre, mut polygon)), ["END"]) => {
                if polygon.len() > 1 && polygon.first() == polygon.last() {
                    polygon.pop();
                }
                if polygon.len() < 3 {
                    return Err(malformed(file, line, format!("cell {id} has fewer than 3 vertices")));
                }
                let polygon = polygon
                    .into_iter()
                    .map(|p| {
                        let d = (p.x - centre.x + 180.0).rem_euclid(360.0) - 180.0;
                        Point::new(centre.x + d, p.y)
                    })
                    .collect();
                cells.push((id, centre, polygon));
            }
            (Some((id, centre, mut polygon)), tokens) => {
                polygon.push(parse_coordinates(tokens, file, line)?);
                current = Some((id, centre, polygon));
            }
            (None, []) => {}
        }
    }
    if !finished {
        let line = text.lines().count();
        return Err(malformed(file, line, "unexpected end of file"));
    }
    Ok(cells)
}

/// Parses a neighbour file into a map from cell id to neighbour ids.
pub fn parse_neighbours(text: &str, file: &str) -> Result<HashMap<u64, Vec<u64>>, GridError> {
    let mut neighbours = HashMap::new();
    for (i, raw) in text.lines().enumerate() {
        let mut tokens = raw.split_whitespace();
        let Some(id) = tokens.next() else {
            continue;
        };
        let id: u64 = parse_number(id, file, i + 1)?;
        let ids = tokens
            .map(|t| parse_number(t, file, i + 1))
            .collect::<Result<Vec<u64>, _>>()?;
        neighbours.insert(id, ids);
    }
    Ok(neighbours)
}

/// Parses the statistics table printed by DGGRID, converting kilometres to
/// metres.
pub fn parse_stats(text: &str, file: &str) -> Result<BTreeMap<u32, GridStats>, GridError> {
    let mut stats = BTreeMap::new();
    let mut in_table = false;
    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        if tokens.is_empty() {
            in_table = false;
            continue;
        }
        if tokens.first() == Some(&"Res") {
            if tokens != STATS_HEADER {
                return Err(malformed(file, line, "unexpected statistics header"));
            }
            in_table = true;
            continue;
        }
        if !in_table {
            continue;
        }
        let [res, cells, area, cls] = tokens.as_slice() else {
            return Err(malformed(file, line, "expected four columns"));
        };
        let area: f64 = parse_number(area, file, line)?;
        let cls: f64 = parse_number(cls, file, line)?;
        stats.insert(
            parse_number(res, file, line)?,
            GridStats {
                number_of_cells: parse_number(cells, file, line)?,
                typical_area: area * 1e6,
                typical_distance: cls * 1e3,
            },
        );
    }
    if stats.is_empty() {
        return Err(malformed(file, text.lines().count(), "no statistics table"));
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CELLS: &str = "\
1 179.5 10.0
179.0 10.0
-179.8 10.5
180.2 9.5
179.0 10.0
END
2 -20.0 -5.0
-21.0 -5.0
-20.0 -4.0
-19.0 -5.0
-21.0 -5.0
END
END
";

    const STATS: &str = "\
Earth Radius: 6,371.007180918475

Res       # Cells        Area (km^2)      CLS (km)
  0            12   42,505,468.017          7,356.68
  1            32   15,939,550.506          4,505.03
  2            92    5,544,191.481          2,657.03

";

    #[test]
    fn test_parse_cells_unwraps_polygons() {
        let cells = parse_cells(CELLS, "cells.gen").unwrap();
        assert_eq!(cells.len(), 2);
        let (id, centre, polygon) = &cells[0];
        assert_eq!(*id, 1);
        assert_eq!(*centre, Point::new(179.5, 10.0));
        assert_eq!(polygon.len(), 3);
        assert!((polygon[1].x - 180.2).abs() < 1e-9);
        assert!((polygon[2].x - 180.2).abs() < 1e-9);
    }

    #[test]
    fn test_truncated_cells_file_is_rejected() {
        let truncated = &CELLS[..CELLS.len() - 4];
        let err = parse_cells(truncated, "cells.gen").unwrap_err();
        assert!(matches!(err, GridError::Malformed { .. }));
    }

    #[test]
    fn test_parse_neighbours() {
        let n = parse_neighbours("1 2 3 4\n2 1\n\n", "cells.nbr").unwrap();
        assert_eq!(n[&1], vec![2, 3, 4]);
        assert_eq!(n[&2], vec![1]);
        assert!(parse_neighbours("1 x\n", "cells.nbr").is_err());
    }

    #[test]
    fn test_parse_stats_converts_units() {
        let stats = parse_stats(STATS, "stats.txt").unwrap();
        assert_eq!(stats.len(), 3);
        let s = stats[&2];
        assert_eq!(s.number_of_cells, 92);
        assert!((s.typical_area - 5_544_191.481e6).abs() < 1.0);
        assert!((s.typical_distance - 2_657_030.0).abs() < 1e-6);
    }

    #[test]
    fn test_unexpected_stats_header() {
        let err = parse_stats("Res Cells Area\n0 12 1\n", "stats.txt").unwrap_err();
        assert!(matches!(err, GridError::Malformed { line: 1, .. }));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let files = DggridFiles::new(dir.path());
        std::fs::write(files.cells_path(2), CELLS).unwrap();
        std::fs::write(files.neighbours_path(2), "1 2\n2 1\n").unwrap();
        std::fs::write(files.stats_path(), STATS).unwrap();
        let grid = files.load(2).unwrap();
        assert_eq!(grid.cells.len(), 2);
        assert_eq!(grid.cells[1].neighbours, vec![1]);
        assert_eq!(grid.stats.number_of_cells, 92);
        assert!(matches!(files.load(7), Err(GridError::Io(_))));
    }
}
