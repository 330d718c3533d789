mod error;
pub use error::MatrixError;

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use itertools::Itertools;
use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use storage::{keys, record, BatchOp, PersistencePort};

/// Durable form of one edge. Distances above the ceiling are never stored,
/// so absence of a key means "further apart than we care about".
#[derive(Debug, Serialize, Deserialize)]
struct EdgeRecord {
    snv: u32,
}

type Adjacency = AHashMap<String, BTreeMap<String, u32>>;

/// Symmetric, thresholded sparse edge set over guids. The durable copy under
/// `edge/<lo>/<hi>` is the source for a lazy in-RAM rebuild on first touch
/// after startup.
pub struct SparseMatrix {
    ceiling : u32,
    port    : Arc<dyn PersistencePort>,
    inner   : RwLock<Option<Adjacency>>,
}

impl SparseMatrix {
    #[must_use]
    pub fn open(ceiling: u32, port: Arc<dyn PersistencePort>) -> Self {
        Self { ceiling, port, inner: RwLock::new(None) }
    }

    #[must_use]
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Rebuild the adjacency from persistence if this is the first touch.
    fn ensure_loaded(&self) -> Result<(), MatrixError> {
        if self.inner.read().is_some() {
            return Ok(());
        }
        let mut adjacency = Adjacency::default();
        let mut edges = 0usize;
        for key in self.port.scan(keys::EDGE_PREFIX)? {
            let Some((lo, hi)) = keys::parse_edge_key(&key) else { continue };
            let Some(bytes) = self.port.get(&key)? else { continue };
            let edge: EdgeRecord = record::decode(&key, &bytes)?;
            adjacency.entry(lo.to_string()).or_default().insert(hi.to_string(), edge.snv);
            adjacency.entry(hi.to_string()).or_default().insert(lo.to_string(), edge.snv);
            edges += 1;
        }
        if edges > 0 {
            info!("Rebuilt sparse matrix: {edges} edges");
        }
        *self.inner.write() = Some(adjacency);
        Ok(())
    }

    /// Record every edge of a freshly compared guid in one durable batch.
    /// Requires `snv <= ceiling` for each; idempotent and symmetric.
    pub fn add_edges(&self, guid: &str, edges: &[(String, u32)]) -> Result<(), MatrixError> {
        for (partner, snv) in edges {
            if *snv > self.ceiling {
                return Err(MatrixError::AboveCeiling { g1: guid.to_string(), g2: partner.clone(), snv: *snv, ceiling: self.ceiling });
            }
            if partner == guid {
                return Err(MatrixError::SelfEdge(guid.to_string()));
            }
        }
        self.ensure_loaded()?;

        let mut ops = Vec::with_capacity(edges.len());
        for (partner, snv) in edges {
            let key = keys::edge_key(guid, partner);
            ops.push(BatchOp::put(&key, record::encode(&key, &EdgeRecord { snv: *snv })?));
        }
        self.port.atomic_batch(ops)?;

        let mut inner = self.inner.write();
        let adjacency = inner.as_mut().expect("loaded above");
        for (partner, snv) in edges {
            adjacency.entry(guid.to_string()).or_default().insert(partner.clone(), *snv);
            adjacency.entry(partner.clone()).or_default().insert(guid.to_string(), *snv);
        }
        Ok(())
    }

    pub fn add_edge(&self, g1: &str, g2: &str, snv: u32) -> Result<(), MatrixError> {
        self.add_edges(g1, &[(g2.to_string(), snv)])
    }

    /// Edges incident on `guid` with `snv <= threshold`, ascending by
    /// distance then guid. The threshold is clamped by the ceiling: farther
    /// pairs were never stored.
    pub fn neighbours_within(&self, guid: &str, threshold: u32) -> Result<Vec<(String, u32)>, MatrixError> {
        self.ensure_loaded()?;
        let inner = self.inner.read();
        let adjacency = inner.as_ref().expect("loaded above");
        let result = adjacency
            .get(guid)
            .map(|partners| {
                partners.iter()
                    .filter(|(_, snv)| **snv <= threshold)
                    .map(|(partner, snv)| (partner.clone(), *snv))
                    .sorted_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)))
                    .collect()
            })
            .unwrap_or_default();
        Ok(result)
    }

    pub fn snv(&self, g1: &str, g2: &str) -> Result<Option<u32>, MatrixError> {
        self.ensure_loaded()?;
        let inner = self.inner.read();
        let adjacency = inner.as_ref().expect("loaded above");
        Ok(adjacency.get(g1).and_then(|partners| partners.get(g2)).copied())
    }

    /// Drop every edge incident on `guid`, in RAM and durably. Used to
    /// unwind a failed insert.
    pub fn remove(&self, guid: &str) -> Result<(), MatrixError> {
        self.ensure_loaded()?;
        let partners: Vec<String> = {
            let inner = self.inner.read();
            let adjacency = inner.as_ref().expect("loaded above");
            adjacency.get(guid).map(|p| p.keys().cloned().collect()).unwrap_or_default()
        };
        if partners.is_empty() {
            return Ok(());
        }
        let ops = partners.iter()
            .map(|partner| BatchOp::delete(keys::edge_key(guid, partner)))
            .collect();
        self.port.atomic_batch(ops)?;

        let mut inner = self.inner.write();
        let adjacency = inner.as_mut().expect("loaded above");
        adjacency.remove(guid);
        for partner in partners {
            if let Some(entry) = adjacency.get_mut(&partner) {
                entry.remove(guid);
            }
        }
        Ok(())
    }

    /// Number of distinct edges.
    pub fn edge_count(&self) -> Result<usize, MatrixError> {
        self.ensure_loaded()?;
        let inner = self.inner.read();
        let adjacency = inner.as_ref().expect("loaded above");
        let incident: usize = adjacency.values().map(BTreeMap::len).sum();
        Ok(incident / 2)
    }

    /// Drop all edges, durable copies included.
    pub fn reset(&self) -> Result<(), MatrixError> {
        let ops = self.port.scan(keys::EDGE_PREFIX)?
            .into_iter()
            .map(BatchOp::delete)
            .collect();
        self.port.atomic_batch(ops)?;
        *self.inner.write() = Some(Adjacency::default());
        Ok(())
    }
}

/// Record shapes a neighbour query can return, mirroring the REST formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighbourFormat {
    /// `"guid"`
    Id,
    /// `["guid", snv]`
    IdDistance,
    /// `["guid", snv, quality]`
    IdDistanceQuality,
    /// `["guid", snv, quality, meta]`
    Full,
}

impl TryFrom<u8> for NeighbourFormat {
    type Error = MatrixError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Id),
            2 => Ok(Self::IdDistance),
            3 => Ok(Self::IdDistanceQuality),
            4 => Ok(Self::Full),
            other => Err(MatrixError::UnknownFormat(other)),
        }
    }
}

/// One fully joined neighbour record, ready to render in any format.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbour {
    pub guid    : String,
    pub snv     : u32,
    pub quality : f64,
    pub meta    : BTreeMap<String, Value>,
}

impl Neighbour {
    #[must_use]
    pub fn render(&self, format: NeighbourFormat) -> Value {
        match format {
            NeighbourFormat::Id                => json!(self.guid),
            NeighbourFormat::IdDistance        => json!([json!(self.guid), json!(self.snv)]),
            NeighbourFormat::IdDistanceQuality => json!([json!(self.guid), json!(self.snv), json!(self.quality)]),
            NeighbourFormat::Full              => json!([json!(self.guid), json!(self.snv), json!(self.quality), json!(self.meta)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use storage::MemoryStore;

    fn matrix(ceiling: u32) -> (Arc<MemoryStore>, SparseMatrix) {
        let port = Arc::new(MemoryStore::new());
        let matrix = SparseMatrix::open(ceiling, Arc::clone(&port) as Arc<dyn PersistencePort>);
        (port, matrix)
    }

    #[test]
    fn add_and_query() -> Result<()> {
        let (_port, matrix) = matrix(3);
        matrix.add_edges("g3", &[("g1".to_string(), 2), ("g2".to_string(), 1)])?;
        assert_eq!(
            matrix.neighbours_within("g3", 3)?,
            vec![("g2".to_string(), 1), ("g1".to_string(), 2)]
        );
        assert_eq!(matrix.neighbours_within("g3", 1)?, vec![("g2".to_string(), 1)]);
        assert_eq!(matrix.snv("g1", "g3")?, Some(2));
        assert_eq!(matrix.snv("g1", "g2")?, None);
        Ok(())
    }

    #[test]
    fn symmetric_and_idempotent() -> Result<()> {
        let (_port, matrix) = matrix(3);
        matrix.add_edge("g1", "g2", 2)?;
        matrix.add_edge("g2", "g1", 2)?;
        assert_eq!(matrix.edge_count()?, 1);
        assert_eq!(matrix.neighbours_within("g1", 3)?, vec![("g2".to_string(), 2)]);
        assert_eq!(matrix.neighbours_within("g2", 3)?, vec![("g1".to_string(), 2)]);
        Ok(())
    }

    #[test]
    fn above_ceiling_rejected() {
        let (_port, matrix) = matrix(3);
        assert!(matches!(
            matrix.add_edge("g1", "g2", 4),
            Err(MatrixError::AboveCeiling { snv: 4, ceiling: 3, .. })
        ));
    }

    #[test]
    fn self_edge_rejected() {
        let (_port, matrix) = matrix(3);
        assert!(matches!(matrix.add_edge("g1", "g1", 0), Err(MatrixError::SelfEdge(_))));
    }

    #[test]
    fn ordering_is_distance_then_guid() -> Result<()> {
        let (_port, matrix) = matrix(5);
        matrix.add_edges("hub", &[
            ("zeta".to_string(), 1),
            ("alpha".to_string(), 1),
            ("mid".to_string(), 3),
        ])?;
        let got: Vec<String> = matrix.neighbours_within("hub", 5)?.into_iter().map(|(g, _)| g).collect();
        assert_eq!(got, vec!["alpha", "zeta", "mid"]);
        Ok(())
    }

    #[test]
    fn lazy_rebuild_from_persistence() -> Result<()> {
        let port = Arc::new(MemoryStore::new());
        {
            let matrix = SparseMatrix::open(3, Arc::clone(&port) as Arc<dyn PersistencePort>);
            matrix.add_edge("g1", "g2", 1)?;
        }
        let matrix = SparseMatrix::open(3, port as Arc<dyn PersistencePort>);
        assert_eq!(matrix.neighbours_within("g2", 3)?, vec![("g1".to_string(), 1)]);
        Ok(())
    }

    #[test]
    fn remove_drops_both_directions() -> Result<()> {
        let (port, matrix) = matrix(3);
        matrix.add_edges("g3", &[("g1".to_string(), 2), ("g2".to_string(), 1)])?;
        matrix.remove("g3")?;
        assert_eq!(matrix.edge_count()?, 0);
        assert!(matrix.neighbours_within("g1", 3)?.is_empty());
        assert!(port.scan("edge/")?.is_empty());
        Ok(())
    }

    #[test]
    fn render_formats() {
        let neighbour = Neighbour {
            guid: "g2".to_string(),
            snv: 1,
            quality: 0.9,
            meta: BTreeMap::from([("ward".to_string(), json!("W-7"))]),
        };
        assert_eq!(neighbour.render(NeighbourFormat::Id), json!("g2"));
        assert_eq!(neighbour.render(NeighbourFormat::IdDistance), json!(["g2", 1]));
        assert_eq!(neighbour.render(NeighbourFormat::IdDistanceQuality), json!(["g2", 1, 0.9]));
        assert_eq!(
            neighbour.render(NeighbourFormat::Full),
            json!(["g2", 1, 0.9, {"ward": "W-7"}])
        );
    }

    #[test]
    fn format_codes() {
        assert_eq!(NeighbourFormat::try_from(1).unwrap(), NeighbourFormat::Id);
        assert_eq!(NeighbourFormat::try_from(4).unwrap(), NeighbourFormat::Full);
        assert!(NeighbourFormat::try_from(5).is_err());
    }
}
