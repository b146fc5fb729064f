//! On-disk cache of built topologies.
//!
//! Topologies are stored as gzip-compressed JSON, one file per grid source,
//! resolution and landmass variant. A cache is purely an optimisation: a
//! missing or unreadable entry just means the topology is built again.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::topology::Topology;
use super::GridError;

#[derive(Debug, Clone)]
pub struct TopologyCache {
    directory: PathBuf,
}

impl TopologyCache {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File holding the topology for the given key.
    pub fn path(&self, source: &str, resolution: u32, with_landmass: bool) -> PathBuf {
        let variant = if with_landmass { "land" } else { "bare" };
        self.directory
            .join(format!("topology-{source}-{resolution}-{variant}.json.gz"))
    }

    /// Loads a cached topology, or `None` if there is no usable entry.
    pub fn load(&self, source: &str, resolution: u32, with_landmass: bool) -> Option<Topology> {
        let path = self.path(source, resolution, with_landmass);
        if !path.exists() {
            return None;
        }
        match read(&path) {
            Ok(topology) if topology.resolution == resolution && topology.source == source => {
                log::info!("loaded cached topology from {}", path.display());
                Some(topology)
            }
            Ok(_) => {
                log::warn!("cached topology {} does not match its key; rebuilding", path.display());
                None
            }
            Err(e) => {
                log::warn!("ignoring unreadable topology cache {}: {e}", path.display());
                None
            }
        }
    }

    /// Writes `topology` to the cache and returns the file written.
    pub fn store(&self, topology: &Topology, with_landmass: bool) -> Result<PathBuf, GridError> {
        std::fs::create_dir_all(&self.directory)?;
        let path = self.path(&topology.source, topology.resolution, with_landmass);
        let file = File::create(&path)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        serde_json::to_writer(&mut encoder, topology)?;
        encoder.finish()?;
        log::debug!("stored topology cache {}", path.display());
        Ok(path)
    }
}

fn read(path: &Path) -> Result<Topology, GridError> {
    let decoder = GzDecoder::new(BufReader::new(File::open(path)?));
    Ok(serde_json::from_reader(decoder)?)
}
