use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// One embedded chunk, keyed by its window's start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkVector {
    pub start_time: f32,
    pub vector: Vec<f32>,
}

/// A k=1..n nearest-neighbor hit.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub start_time: f32,
    /// Squared L2 distance, the exact metric the index ranks by.
    pub distance: f32,
}

/// On-disk form of the search structure. Written next to the timestamp file;
/// the two artifacts are only meaningful as a pair.
#[derive(Debug, Serialize, Deserialize)]
struct VectorMatrix {
    dimensions: usize,
    data: Vec<f32>,
}

/// Exact L2 nearest-neighbor index over chunk vectors, with a parallel
/// timestamp sequence. Structure position `i` always resolves back to
/// `timestamps[i]`; preserving that correspondence across persist/reload is
/// the index's core integrity contract.
///
/// Corpora are one video at a time, so brute-force exact search is the right
/// trade: no approximation, no quantization.
#[derive(Debug, Clone)]
pub struct VideoIndex {
    dimensions: usize,
    data: Vec<f32>,
    timestamps: Vec<f32>,
}

impl VideoIndex {
    /// Stack chunk vectors into the flat matrix in input order.
    pub fn build(vectors: Vec<ChunkVector>) -> Result<Self> {
        let dimensions = match vectors.first() {
            Some(v) => v.vector.len(),
            None => return Err(Error::encoding("cannot build index from zero vectors")),
        };
        if dimensions == 0 {
            return Err(Error::encoding("cannot index zero-dimensional vectors"));
        }

        let mut data = Vec::with_capacity(vectors.len() * dimensions);
        let mut timestamps = Vec::with_capacity(vectors.len());
        for cv in vectors {
            if cv.vector.len() != dimensions {
                return Err(Error::encoding(format!(
                    "vector at t={} has {} dimensions, index has {}",
                    cv.start_time,
                    cv.vector.len(),
                    dimensions
                )));
            }
            data.extend_from_slice(&cv.vector);
            timestamps.push(cv.start_time);
        }

        Ok(Self {
            dimensions,
            data,
            timestamps,
        })
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn timestamps(&self) -> &[f32] {
        &self.timestamps
    }

    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimensions)?;
        self.data.get(start..start + self.dimensions)
    }

    /// Exact k-nearest-neighbor search under L2. Results ascend by distance;
    /// ties break by position.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimensions {
            return Err(Error::encoding(format!(
                "query has {} dimensions, index has {}",
                query.len(),
                self.dimensions
            )));
        }

        let mut neighbors: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dimensions)
            .zip(&self.timestamps)
            .enumerate()
            .map(|(position, (row, &start_time))| Neighbor {
                position,
                start_time,
                distance: squared_l2(query, row),
            })
            .collect();

        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    /// The artifact pair for a prefix: the binary search structure and the
    /// numeric start-time array.
    pub fn artifact_paths(prefix: &Path) -> (PathBuf, PathBuf) {
        (
            prefix.with_extension("vectors.bin"),
            prefix.with_extension("timestamps.json"),
        )
    }

    /// Write both artifacts atomically. They must always travel together;
    /// loading one without the other fails as corruption.
    pub fn persist(&self, prefix: &Path) -> Result<()> {
        let (vectors_path, timestamps_path) = Self::artifact_paths(prefix);

        let matrix = VectorMatrix {
            dimensions: self.dimensions,
            data: self.data.clone(),
        };
        let encoded = bincode::serialize(&matrix)
            .map_err(|e| Error::corruption(format!("cannot serialize vectors: {}", e)))?;
        atomic_write(&vectors_path, &encoded)?;

        let timestamps = serde_json::to_vec(&self.timestamps)
            .map_err(|e| Error::corruption(format!("cannot serialize timestamps: {}", e)))?;
        atomic_write(&timestamps_path, &timestamps)?;

        debug!(
            vectors = %vectors_path.display(),
            timestamps = %timestamps_path.display(),
            rows = self.len(),
            "persisted index artifacts"
        );
        Ok(())
    }

    pub fn load(prefix: &Path) -> Result<Self> {
        let (vectors_path, timestamps_path) = Self::artifact_paths(prefix);
        match (vectors_path.exists(), timestamps_path.exists()) {
            (true, true) => {}
            (false, false) => {
                return Err(Error::corruption(format!(
                    "no artifacts at prefix {}",
                    prefix.display()
                )))
            }
            _ => {
                return Err(Error::corruption(format!(
                    "artifact pair incomplete at prefix {}",
                    prefix.display()
                )))
            }
        }

        let raw = fs::read(&vectors_path)
            .map_err(|e| Error::corruption(format!("{}: {}", vectors_path.display(), e)))?;
        let matrix: VectorMatrix = bincode::deserialize(&raw)
            .map_err(|e| Error::corruption(format!("{}: {}", vectors_path.display(), e)))?;

        let raw = fs::read(&timestamps_path)
            .map_err(|e| Error::corruption(format!("{}: {}", timestamps_path.display(), e)))?;
        let timestamps: Vec<f32> = serde_json::from_slice(&raw)
            .map_err(|e| Error::corruption(format!("{}: {}", timestamps_path.display(), e)))?;

        if matrix.dimensions == 0
            || matrix.data.len() != matrix.dimensions * timestamps.len()
            || timestamps.is_empty()
        {
            return Err(Error::corruption(format!(
                "artifact mismatch at {}: {} floats, {} dimensions, {} timestamps",
                prefix.display(),
                matrix.data.len(),
                matrix.dimensions,
                timestamps.len()
            )));
        }

        Ok(Self {
            dimensions: matrix.dimensions,
            data: matrix.data,
            timestamps,
        })
    }

    /// Whether both artifacts exist under a prefix.
    pub fn artifacts_present(prefix: &Path) -> bool {
        let (v, t) = Self::artifact_paths(prefix);
        v.exists() && t.exists()
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| Error::corruption(format!("{}: {}", parent.display(), e)))?;
    }
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, bytes)
        .map_err(|e| Error::corruption(format!("{}: {}", temp_path.display(), e)))?;
    fs::rename(&temp_path, path)
        .map_err(|e| Error::corruption(format!("{}: {}", path.display(), e)))?;
    Ok(())
}
