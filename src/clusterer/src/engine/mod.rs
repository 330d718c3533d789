mod error;
pub use error::ClusterError;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use storage::{keys, record, PersistencePort};

use crate::algorithm::{ClusterAlgorithm, MixturePolicy};

/// One row of the membership journal: at `change_id`, `guid` belonged to
/// `cluster_id`. Later rows supersede earlier ones for the same guid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAssignment {
    pub guid       : String,
    pub cluster_id : u32,
    pub change_id  : u64,
}

/// Mixed/unmixed member counts of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSummary {
    pub cluster_id : u32,
    pub members    : usize,
    pub unmixed    : usize,
    pub mixed      : usize,
}

/// Durable state of one engine: the whole clustering is one snapshot record
/// under `cluster/<algorithm>`, rewritten write-through on every change.
#[derive(Debug, Default, Serialize, Deserialize)]
struct EngineState {
    clusters   : BTreeMap<u32, BTreeSet<String>>,
    membership : BTreeMap<String, BTreeSet<u32>>,
    mixed      : BTreeMap<String, bool>,
    retired    : BTreeSet<u32>,
    next_id    : u32,
    change_id  : u64,
    journal    : Vec<ClusterAssignment>,
}

impl EngineState {
    /// Smallest cluster id the guid belongs to. For guids the policy lets
    /// bridge, the membership set holds exactly one id.
    fn primary(&self, guid: &str) -> Option<u32> {
        self.membership.get(guid).and_then(|ids| ids.first().copied())
    }

    fn allocate(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.clusters.insert(id, BTreeSet::new());
        id
    }

    /// Put `guid` into `cluster_id`, journalling only genuinely new
    /// memberships.
    fn attach(&mut self, guid: &str, cluster_id: u32, pending: &mut Vec<(String, u32)>) {
        self.clusters.entry(cluster_id).or_default().insert(guid.to_string());
        if self.membership.entry(guid.to_string()).or_default().insert(cluster_id) {
            pending.push((guid.to_string(), cluster_id));
        }
    }

    /// Absorb `from` into `into` (`into < from`); the absorbed id is retired
    /// and never reused.
    fn merge(&mut self, into: u32, from: u32, pending: &mut Vec<(String, u32)>) {
        debug_assert!(into < from, "the smaller cluster id survives a merge");
        let members = self.clusters.remove(&from).unwrap_or_default();
        for guid in members {
            if let Some(ids) = self.membership.get_mut(&guid) {
                ids.remove(&from);
            }
            self.attach(&guid, into, pending);
        }
        self.retired.insert(from);
        debug!("Cluster {from} absorbed into {into}");
    }
}

/// Incremental single-linkage clustering at one `(threshold, uncertain
/// class, mixture policy)` configuration. Clusters are connected components
/// of the thresholded edge set; cluster ids are stable (the minimum id ever
/// seen in the component) and the change counter advances at most once per
/// mutating call.
pub struct ClusterEngine {
    algorithm : ClusterAlgorithm,
    port      : Arc<dyn PersistencePort>,
    state     : EngineState,
}

impl ClusterEngine {
    /// Open, reloading the persisted snapshot when one exists.
    pub fn open(algorithm: ClusterAlgorithm, port: Arc<dyn PersistencePort>) -> Result<Self, ClusterError> {
        let key = keys::cluster_key(&algorithm.name);
        let state = match port.get(&key)? {
            Some(bytes) => {
                let state: EngineState = record::decode(&key, &bytes)?;
                info!(
                    "Reloaded clustering '{}': {} clusters, change id {}",
                    algorithm.name, state.clusters.len(), state.change_id
                );
                state
            }
            None => EngineState::default(),
        };
        Ok(Self { algorithm, port, state })
    }

    #[must_use]
    pub fn algorithm(&self) -> &ClusterAlgorithm {
        &self.algorithm
    }

    #[must_use]
    pub fn change_id(&self) -> u64 {
        self.state.change_id
    }

    /// Register a freshly inserted guid together with its thresholded
    /// edges. Returns whether any membership changed. Re-registering a known
    /// guid is a no-op, which makes insert retries harmless.
    pub fn insert(&mut self, guid: &str, mixed: bool, edges: &[(String, u32)]) -> Result<bool, ClusterError> {
        if self.state.mixed.contains_key(guid) {
            return Ok(false);
        }
        self.state.mixed.insert(guid.to_string(), mixed);

        // Partners must be below the threshold and known to this engine.
        let qualifying: Vec<(String, bool)> = edges.iter()
            .filter(|(_, snv)| *snv <= self.algorithm.threshold)
            .filter_map(|(partner, _)| {
                self.state.mixed.get(partner).map(|m| (partner.clone(), *m))
            })
            .collect();

        let mut pending = Vec::new();
        use MixturePolicy::*;
        let policy = self.algorithm.mixture_policy;
        match (mixed, policy) {
            (true, ExcludeMixed) => {
                // Status recorded; no membership at all.
            }
            (true, ExcludeMixedFromGrowth) => {
                // Join every adjacent cluster through unmixed partners, but
                // never union: a mixed guid cannot bridge.
                let targets: BTreeSet<u32> = qualifying.iter()
                    .filter(|(_, partner_mixed)| !partner_mixed)
                    .filter_map(|(partner, _)| self.state.primary(partner))
                    .collect();
                if targets.is_empty() {
                    let id = self.state.allocate();
                    self.state.attach(guid, id, &mut pending);
                } else {
                    for target in targets {
                        self.state.attach(guid, target, &mut pending);
                    }
                }
            }
            _ => {
                // Ordinary single-linkage union. Under
                // exclude_mixed_from_growth only unmixed partners bridge.
                let bridging: BTreeSet<u32> = qualifying.iter()
                    .filter(|(_, partner_mixed)| policy == IncludeMixed || !partner_mixed)
                    .filter_map(|(partner, _)| self.state.primary(partner))
                    .collect();

                let mut ids = bridging.into_iter();
                let target = match ids.next() {
                    Some(id) => id,
                    None     => self.state.allocate(),
                };
                for absorbed in ids {
                    self.state.merge(target, absorbed, &mut pending);
                }
                self.state.attach(guid, target, &mut pending);

                if policy == ExcludeMixedFromGrowth {
                    for (partner, partner_mixed) in &qualifying {
                        if *partner_mixed {
                            self.state.attach(partner, target, &mut pending);
                        }
                    }
                }
            }
        }
        self.commit(pending)
    }

    /// Union lazily over one late-arriving edge. Both guids must already be
    /// registered.
    pub fn link(&mut self, g1: &str, g2: &str, snv: u32) -> Result<bool, ClusterError> {
        if snv > self.algorithm.threshold {
            return Ok(false);
        }
        let m1 = *self.state.mixed.get(g1).ok_or_else(|| ClusterError::UnknownGuid(g1.to_string()))?;
        let m2 = *self.state.mixed.get(g2).ok_or_else(|| ClusterError::UnknownGuid(g2.to_string()))?;

        let mut pending = Vec::new();
        use MixturePolicy::*;
        match (self.algorithm.mixture_policy, m1, m2) {
            (ExcludeMixed, true, _) | (ExcludeMixed, _, true) => {}
            (ExcludeMixedFromGrowth, true, true) => {}
            (ExcludeMixedFromGrowth, false, true) => {
                if let Some(target) = self.state.primary(g1) {
                    self.state.attach(g2, target, &mut pending);
                }
            }
            (ExcludeMixedFromGrowth, true, false) => {
                if let Some(target) = self.state.primary(g2) {
                    self.state.attach(g1, target, &mut pending);
                }
            }
            _ => {
                if let (Some(c1), Some(c2)) = (self.state.primary(g1), self.state.primary(g2)) {
                    if c1 != c2 {
                        let (into, from) = if c1 < c2 { (c1, c2) } else { (c2, c1) };
                        self.state.merge(into, from, &mut pending);
                    }
                }
            }
        }
        self.commit(pending)
    }

    fn commit(&mut self, pending: Vec<(String, u32)>) -> Result<bool, ClusterError> {
        let changed = !pending.is_empty();
        if changed {
            self.state.change_id += 1;
            let change_id = self.state.change_id;
            self.state.journal.extend(
                pending.into_iter().map(|(guid, cluster_id)| ClusterAssignment { guid, cluster_id, change_id })
            );
        }
        self.persist()?;
        Ok(changed)
    }

    fn persist(&self) -> Result<(), ClusterError> {
        let key = keys::cluster_key(&self.algorithm.name);
        self.port.put(&key, &record::encode(&key, &self.state)?)?;
        Ok(())
    }

    /// All clusters and their members, ascending by id.
    #[must_use]
    pub fn clusters(&self) -> Vec<(u32, Vec<String>)> {
        self.state.clusters.iter()
            .map(|(id, members)| (*id, members.iter().cloned().collect()))
            .collect()
    }

    #[must_use]
    pub fn cluster_ids(&self) -> Vec<u32> {
        self.state.clusters.keys().copied().collect()
    }

    pub fn members(&self, cluster_id: u32) -> Result<Vec<String>, ClusterError> {
        self.state.clusters.get(&cluster_id)
            .map(|members| members.iter().cloned().collect())
            .ok_or(ClusterError::UnknownCluster(cluster_id))
    }

    /// Mixed/unmixed breakdown per cluster.
    #[must_use]
    pub fn summary(&self) -> Vec<ClusterSummary> {
        self.state.clusters.iter()
            .map(|(id, members)| {
                let mixed = members.iter()
                    .filter(|guid| self.state.mixed.get(*guid).copied().unwrap_or(false))
                    .count();
                ClusterSummary {
                    cluster_id: *id,
                    members: members.len(),
                    unmixed: members.len() - mixed,
                    mixed,
                }
            })
            .collect()
    }

    /// Current assignments, or only the journal rows after `after`.
    #[must_use]
    pub fn assignments(&self, after: Option<u64>) -> Vec<ClusterAssignment> {
        match after {
            Some(id) => self.state.journal.iter()
                .filter(|entry| entry.change_id > id)
                .cloned()
                .collect(),
            None => {
                let change_id = self.state.change_id;
                self.state.membership.iter()
                    .flat_map(|(guid, ids)| {
                        ids.iter().map(move |cluster_id| ClusterAssignment {
                            guid: guid.clone(),
                            cluster_id: *cluster_id,
                            change_id,
                        })
                    })
                    .collect()
            }
        }
    }

    /// Clusters this guid belongs to (several only for mixed guids under
    /// `exclude_mixed_from_growth`).
    #[must_use]
    pub fn clusters_of(&self, guid: &str) -> Option<Vec<u32>> {
        self.state.membership.get(guid).map(|ids| ids.iter().copied().collect())
    }

    #[must_use]
    pub fn is_mixed(&self, guid: &str) -> Option<bool> {
        self.state.mixed.get(guid).copied()
    }

    /// Drop all clustering state, durable snapshot included.
    pub fn reset(&mut self) -> Result<(), ClusterError> {
        self.state = EngineState::default();
        self.port.delete(&keys::cluster_key(&self.algorithm.name))?;
        info!("Clustering '{}' reset", self.algorithm.name);
        Ok(())
    }
}
