use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{info, warn};
use parking_lot::RwLock;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use clusterer::{ClusterAlgorithm, ClusterAssignment, ClusterEngine, ClusterSummary, Network, NetworkEdge, NetworkNode};
use config::ServerConfig;
use neighbours::{Comparer, MixtureTest, Msa, MsaBuilder, Neighbour, NeighbourFormat, SeqStore, SparseMatrix, StoreError};
use refseq::{CompressedSequence, MaskSet, RefCodec, Reference};
use storage::{FileStore, MemoryStore, PersistencePort};

use crate::error::CoreError;

/// `guids_beginning_with` returns nothing at all once a prefix matches more
/// than this many guids.
const PREFIX_MATCH_LIMIT: usize = 30;

/// What one insert did, returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct InsertReport {
    pub guid        : String,
    pub quality     : f64,
    /// The sequence was stored but is excluded from edges and clustering.
    pub low_quality : bool,
    pub edges       : usize,
    /// Mixture verdict per clustering algorithm.
    pub mixed       : BTreeMap<String, bool>,
}

/// The masked-out positions, for the `nucleotides_excluded` query.
#[derive(Debug, Clone, Serialize)]
pub struct ExcludedNucleotides {
    pub count     : usize,
    pub positions : Vec<u32>,
}

/// One row of the resource report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceRow {
    pub stat  : String,
    pub value : u64,
}

/// One clustering algorithm with its mixture test.
struct Clustering {
    test   : MixtureTest,
    engine : ClusterEngine,
}

struct Inner {
    store      : SeqStore,
    matrix     : SparseMatrix,
    clusterings: Vec<Clustering>,
}

/// Top-level assembly: the comparison engine, sparse matrix and clustering
/// engines behind one reader-writer lock. Mutating calls (`insert`,
/// `reset`) take the write guard, so there is a single writer by
/// construction; queries share the read guard and observe the state
/// committed before they began.
pub struct Server {
    config   : ServerConfig,
    comparer : Comparer,
    inner    : RwLock<Inner>,
}

impl Server {
    /// Build the assembly from a validated configuration, loading the
    /// reference FASTA and mask file and opening the configured backend.
    pub fn from_config(config: ServerConfig) -> Result<Self, CoreError> {
        let reference = Reference::from_fasta(&config.reference_fasta)?;
        let mask = match &config.mask_file {
            Some(path) => MaskSet::from_file(reference.len(), path)?,
            None       => MaskSet::empty(reference.len()),
        };
        let port: Arc<dyn PersistencePort> = match &config.data_dir {
            Some(dir) => Arc::new(FileStore::open(dir)?),
            None      => Arc::new(MemoryStore::new()),
        };
        Self::assemble(config, reference, mask, port)
    }

    /// Wire the components over pre-loaded collaborators. `from_config` ends
    /// up here; tests inject an in-memory port directly.
    pub fn assemble(
        config    : ServerConfig,
        reference : Reference,
        mask      : MaskSet,
        port      : Arc<dyn PersistencePort>,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let codec = RefCodec::new(reference, mask, config.max_n_percent);
        let store = SeqStore::open(codec, Arc::clone(&port), config.working_set_capacity)?;
        let matrix = SparseMatrix::open(config.snv_ceiling, Arc::clone(&port));
        let clusterings = config.clustering.iter()
            .map(|algorithm| -> Result<Clustering, CoreError> {
                Ok(Clustering {
                    test   : MixtureTest::new(algorithm.uncertain_char, config.mixture_alpha),
                    engine : ClusterEngine::open(algorithm.clone(), Arc::clone(&port))?,
                })
            })
            .collect::<Result<Vec<Clustering>, CoreError>>()?;
        let comparer = Comparer::new(config.snv_ceiling, config.uncertain_char);

        info!(
            "Assembled '{}': {} stored sequences, {} clustering algorithm(s)",
            config.server_name, store.len(), clusterings.len()
        );
        Ok(Self { config, comparer, inner: RwLock::new(Inner { store, matrix, clusterings }) })
    }

    // ------------------------------------------------------------ mutation

    /// Insert one consensus sequence: mask, compress, persist, compare
    /// against every stored guid, record the thresholded edges, update every
    /// clustering and advance its change counter.
    ///
    /// A failure after the sequence commit unwinds the partial edges; the
    /// sequence record remains, and a retried insert reports the duplicate
    /// without touching anything.
    pub fn insert(
        &self,
        guid     : &str,
        sequence : &str,
        meta     : Option<BTreeMap<String, Value>>,
    ) -> Result<InsertReport, CoreError> {
        let mut inner = self.inner.write();

        let masked = inner.store.codec().mask().apply(sequence);
        let seq = inner.store.insert(guid, &masked, &meta.unwrap_or_default())?;

        if seq.is_invalid() {
            warn!("'{guid}' stored but flagged invalid (quality {:.3})", seq.quality());
            return Ok(InsertReport {
                guid        : guid.to_string(),
                quality     : seq.quality(),
                low_quality : true,
                edges       : 0,
                mixed       : BTreeMap::new(),
            });
        }

        let candidates: Vec<String> = inner.store.comparable_guids()
            .into_iter()
            .filter(|candidate| candidate != guid)
            .collect();
        let edges = compare_all(&inner.store, &self.comparer, guid, &seq, &candidates)?;
        inner.matrix.add_edges(guid, &edges)?;

        let Inner { store, matrix, clusterings } = &mut *inner;
        match update_clusterings(store, clusterings, guid, &seq, &edges) {
            Ok(mixed) => Ok(InsertReport {
                guid        : guid.to_string(),
                quality     : seq.quality(),
                low_quality : false,
                edges       : edges.len(),
                mixed,
            }),
            Err(err) => {
                // Leave the store as if the comparison never ran.
                if let Err(unwind) = matrix.remove(guid) {
                    warn!("Failed to unwind edges of '{guid}': {unwind}");
                }
                Err(err)
            }
        }
    }

    /// Drop all sequences, edges and clusterings. Debug mode only.
    pub fn reset(&self) -> Result<(), CoreError> {
        self.require_debug("reset")?;
        let mut inner = self.inner.write();
        inner.store.reset()?;
        inner.matrix.reset()?;
        for clustering in &mut inner.clusterings {
            clustering.engine.reset()?;
        }
        info!("Server state reset");
        Ok(())
    }

    // ------------------------------------------------------------- queries

    #[must_use]
    pub fn exists(&self, guid: &str) -> bool {
        self.inner.read().store.exists(guid)
    }

    pub fn annotation(&self, guid: &str) -> Result<BTreeMap<String, Value>, CoreError> {
        Ok(self.inner.read().store.annotation(guid)?)
    }

    /// The stored masked consensus, reconstructed to reference length.
    pub fn sequence(&self, guid: &str) -> Result<String, CoreError> {
        Ok(self.inner.read().store.sequence(guid)?)
    }

    pub fn quality(&self, guid: &str) -> Result<f64, CoreError> {
        Ok(self.inner.read().store.quality(guid)?)
    }

    #[must_use]
    pub fn guids(&self) -> Vec<String> {
        self.inner.read().store.guids()
    }

    /// Prefix search, capped: more than [`PREFIX_MATCH_LIMIT`] matches
    /// return an empty list.
    #[must_use]
    pub fn guids_beginning_with(&self, prefix: &str) -> Vec<String> {
        let matches = self.inner.read().store.guids_beginning_with(prefix);
        if matches.len() > PREFIX_MATCH_LIMIT {
            return Vec::new();
        }
        matches
    }

    #[must_use]
    pub fn guids_with_quality_over(&self, cutoff: f64) -> Vec<String> {
        self.inner.read().store.guids_with_quality_over(cutoff)
    }

    /// Neighbours of `guid` within `threshold`, with partner quality at
    /// least `quality_cutoff`, rendered in the requested format (1..=4).
    /// Ascending snv, then guid.
    pub fn neighbours_within(
        &self,
        guid           : &str,
        threshold      : u32,
        quality_cutoff : f64,
        format         : u8,
    ) -> Result<Vec<Value>, CoreError> {
        let format = NeighbourFormat::try_from(format)?;
        let inner = self.inner.read();
        if !inner.store.exists(guid) {
            return Err(CoreError::NotFound(format!("guid '{guid}'")));
        }

        let mut rendered = Vec::new();
        for (partner, snv) in inner.matrix.neighbours_within(guid, threshold)? {
            let quality = inner.store.quality(&partner)?;
            if quality < quality_cutoff {
                continue;
            }
            let meta = if format == NeighbourFormat::Full {
                inner.store.annotation(&partner)?
            } else {
                BTreeMap::new()
            };
            rendered.push(Neighbour { guid: partner, snv, quality, meta }.render(format));
        }
        Ok(rendered)
    }

    /// Alignment over the union of informative positions of the given
    /// guids, with per-row mixture statistics.
    pub fn multiple_alignment(&self, guids: &[String]) -> Result<Msa, CoreError> {
        let inner = self.inner.read();
        let mut members = Vec::with_capacity(guids.len());
        for guid in guids {
            members.push((guid.clone(), inner.store.get(guid)?));
        }
        let test = MixtureTest::new(self.config.uncertain_char, self.config.mixture_alpha);
        Ok(MsaBuilder::with_mixture(inner.store.codec(), &test).build(&members))
    }

    pub fn clusters(&self, algorithm: &str) -> Result<Vec<(u32, Vec<String>)>, CoreError> {
        self.with_engine(algorithm, |engine| Ok(engine.clusters()))
    }

    pub fn cluster_summary(&self, algorithm: &str) -> Result<Vec<ClusterSummary>, CoreError> {
        self.with_engine(algorithm, |engine| Ok(engine.summary()))
    }

    pub fn cluster_ids(&self, algorithm: &str) -> Result<Vec<u32>, CoreError> {
        self.with_engine(algorithm, |engine| Ok(engine.cluster_ids()))
    }

    pub fn cluster_members(&self, algorithm: &str, cluster_id: u32) -> Result<Vec<String>, CoreError> {
        self.with_engine(algorithm, |engine| Ok(engine.members(cluster_id)?))
    }

    /// Current assignments, or only the changes after `after_change_id`.
    pub fn guids2clusters(
        &self,
        algorithm       : &str,
        after_change_id : Option<u64>,
    ) -> Result<Vec<ClusterAssignment>, CoreError> {
        self.with_engine(algorithm, |engine| Ok(engine.assignments(after_change_id)))
    }

    pub fn change_id(&self, algorithm: &str) -> Result<u64, CoreError> {
        self.with_engine(algorithm, |engine| Ok(engine.change_id()))
    }

    /// Nodes and thresholded edges of one cluster, for visualisation.
    pub fn network(&self, algorithm: &str, cluster_id: u32) -> Result<Network, CoreError> {
        let inner = self.inner.read();
        let clustering = inner.clusterings.iter()
            .find(|clustering| clustering.engine.algorithm().name == algorithm)
            .ok_or_else(|| CoreError::NotFound(format!("clustering algorithm '{algorithm}'")))?;
        let engine = &clustering.engine;
        let members = engine.members(cluster_id)?;
        let member_set: BTreeSet<&String> = members.iter().collect();

        let nodes = members.iter()
            .map(|guid| NetworkNode {
                guid  : guid.clone(),
                mixed : engine.is_mixed(guid).unwrap_or(false),
            })
            .collect();

        let mut edges = Vec::new();
        for member in &members {
            for (partner, snv) in inner.matrix.neighbours_within(member, engine.algorithm().threshold)? {
                if member < &partner && member_set.contains(&partner) {
                    edges.push(NetworkEdge { source: member.clone(), target: partner, snv });
                }
            }
        }
        Ok(Network { algorithm: algorithm.to_string(), cluster_id, nodes, edges })
    }

    /// The core's own resource counters, one row per statistic, truncated
    /// to `nrows` when given.
    #[must_use]
    pub fn server_memory_usage(&self, nrows: Option<usize>) -> Vec<ResourceRow> {
        let inner = self.inner.read();
        let mut rows = vec![
            ResourceRow { stat: "sequences_stored".to_string(), value: inner.store.len() as u64 },
            ResourceRow { stat: "working_set".to_string(), value: inner.store.working_set_len() as u64 },
            ResourceRow { stat: "working_set_capacity".to_string(), value: self.config.working_set_capacity as u64 },
            ResourceRow { stat: "edges_stored".to_string(), value: inner.matrix.edge_count().unwrap_or(0) as u64 },
        ];
        for clustering in &inner.clusterings {
            let name = &clustering.engine.algorithm().name;
            rows.push(ResourceRow {
                stat  : format!("clusters_{name}"),
                value : clustering.engine.cluster_ids().len() as u64,
            });
            rows.push(ResourceRow {
                stat  : format!("change_id_{name}"),
                value : clustering.engine.change_id(),
            });
        }
        if let Some(nrows) = nrows {
            rows.truncate(nrows);
        }
        rows
    }

    #[must_use]
    pub fn snpceiling(&self) -> u32 {
        self.comparer.ceiling()
    }

    #[must_use]
    pub fn nucleotides_excluded(&self) -> ExcludedNucleotides {
        let inner = self.inner.read();
        let mask = inner.store.codec().mask();
        ExcludedNucleotides { count: mask.excluded_count(), positions: mask.positions() }
    }

    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.config.server_name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.config.description
    }

    #[must_use]
    pub fn cluster_algorithms(&self) -> Vec<ClusterAlgorithm> {
        self.config.clustering.clone()
    }

    /// YAML echo of the running configuration. Debug mode only.
    pub fn server_config(&self) -> Result<String, CoreError> {
        self.require_debug("server_config")?;
        Ok(self.config.to_yaml()?)
    }

    /// Deliberately fail, so callers can exercise their error paths end to
    /// end. Debug mode only.
    pub fn raise_error(&self, token: &str) -> Result<(), CoreError> {
        self.require_debug("raise_error")?;
        Err(CoreError::Internal(format!("deliberately raised error ({token})")))
    }

    // ------------------------------------------------------------- helpers

    fn require_debug(&self, operation: &str) -> Result<(), CoreError> {
        if self.config.debug_mode {
            Ok(())
        } else {
            Err(CoreError::InvalidInput(format!("'{operation}' is only available in debug mode")))
        }
    }

    fn with_engine<R>(
        &self,
        algorithm: &str,
        f: impl FnOnce(&ClusterEngine) -> Result<R, CoreError>,
    ) -> Result<R, CoreError> {
        let inner = self.inner.read();
        let clustering = inner.clusterings.iter()
            .find(|clustering| clustering.engine.algorithm().name == algorithm)
            .ok_or_else(|| CoreError::NotFound(format!("clustering algorithm '{algorithm}'")))?;
        f(&clustering.engine)
    }
}

/// Compare the fresh sequence against every candidate, in parallel,
/// rehydrating working-set misses on the way. A transient persistence
/// failure is retried once and then skips the pair; anything else aborts
/// the insert.
fn compare_all(
    store      : &SeqStore,
    comparer   : &Comparer,
    guid       : &str,
    seq        : &CompressedSequence,
    candidates : &[String],
) -> Result<Vec<(String, u32)>, CoreError> {
    let compared: Vec<Option<(String, u32)>> = candidates.par_iter()
        .map(|candidate| -> Result<Option<(String, u32)>, CoreError> {
            let other = match store.get(candidate) {
                Ok(other) => other,
                Err(StoreError::Storage(err)) if err.is_transient() => {
                    warn!("Transient persistence failure loading '{candidate}', retrying once: {err}");
                    match store.get(candidate) {
                        Ok(other) => other,
                        Err(StoreError::Storage(err)) if err.is_transient() => {
                            warn!("Skipping pair ({guid}, {candidate}): {err}");
                            return Ok(None);
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                Err(err) => return Err(err.into()),
            };
            Ok(comparer.distance(seq, &other).map(|snv| (candidate.clone(), snv)))
        })
        .collect::<Result<Vec<Option<(String, u32)>>, CoreError>>()?;
    Ok(compared.into_iter().flatten().collect())
}

/// Assess the mixture status of the fresh sequence under every clustering
/// algorithm and feed each engine its thresholded edges. Alignment columns
/// come from the neighbours' variation, so an isolated sequence is never
/// flagged by its own uncertainty.
fn update_clusterings(
    store       : &SeqStore,
    clusterings : &mut [Clustering],
    guid        : &str,
    seq         : &CompressedSequence,
    edges       : &[(String, u32)],
) -> Result<BTreeMap<String, bool>, CoreError> {
    let informative = store.codec().mask().informative_length();
    let mut mixed = BTreeMap::new();
    for Clustering { test, engine } in clusterings.iter_mut() {
        let threshold = engine.algorithm().threshold;
        let thresholded: Vec<(String, u32)> = edges.iter()
            .filter(|(_, snv)| *snv <= threshold)
            .cloned()
            .collect();

        let mut columns = BTreeSet::new();
        for (partner, _) in &thresholded {
            columns.extend(store.get(partner)?.variant_positions());
        }
        let columns: Vec<u32> = columns.into_iter().collect();
        let stat = test.assess(seq, &columns, informative);

        engine.insert(guid, stat.mixed, &thresholded)?;
        mixed.insert(engine.algorithm().name.clone(), stat.mixed);
    }
    Ok(mixed)
}
