mod error;
pub use error::StoreError;

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use refseq::{CompressedSequence, DeltaSequence, RefCodec};
use storage::{keys, record, BatchOp, PersistencePort};

/// How many anchor candidates are drawn when looking for a double-delta
/// encoding of a new sequence.
const ANCHOR_SAMPLE: usize = 16;

/// Durable form of one sequence. Anchors are always `Single`; a `Delta`
/// record points to its anchor guid, bounding rehydration to one hop.
#[derive(Debug, Serialize, Deserialize)]
enum SeqRecord {
    Single(CompressedSequence),
    Delta(DeltaSequence),
}

/// Per-guid facts kept in RAM for every stored sequence, cheap enough to
/// hold for the whole collection. Quality filters and anchor selection read
/// this instead of rehydrating sequences.
#[derive(Debug, Clone)]
struct SeqMeta {
    quality      : f64,
    invalid      : bool,
    single_delta : bool,
}

struct CacheEntry {
    seq       : Arc<CompressedSequence>,
    last_used : u64,
}

/// The in-RAM working set: expanded sequences keyed by guid, with an access
/// clock for LRU eviction.
#[derive(Default)]
struct WorkingSet {
    entries : AHashMap<String, CacheEntry>,
    tick    : u64,
}

impl WorkingSet {
    fn touch(&mut self, guid: &str) -> Option<Arc<CompressedSequence>> {
        self.tick += 1;
        let tick = self.tick;
        self.entries.get_mut(guid).map(|entry| {
            entry.last_used = tick;
            Arc::clone(&entry.seq)
        })
    }

    fn admit(&mut self, guid: String, seq: Arc<CompressedSequence>) {
        self.tick += 1;
        let last_used = self.tick;
        self.entries.insert(guid, CacheEntry { seq, last_used });
    }

    /// Drop least-recently-used entries until at most `capacity` remain.
    /// Entries with outstanding borrows are never evicted; persistence is
    /// write-through, so eviction loses nothing.
    fn evict_to(&mut self, capacity: usize) {
        if self.entries.len() <= capacity {
            return;
        }
        let mut victims: Vec<(u64, String)> = self.entries.iter()
            .filter(|(_, entry)| Arc::strong_count(&entry.seq) == 1)
            .map(|(guid, entry)| (entry.last_used, guid.clone()))
            .collect();
        victims.sort();
        for (_, guid) in victims {
            if self.entries.len() <= capacity {
                break;
            }
            self.entries.remove(&guid);
            debug!("Evicted '{guid}' from the working set");
        }
    }
}

/// Owns every compressed sequence: a durable copy behind the persistence
/// port (single- or double-delta) and a bounded in-RAM working set of
/// expanded forms.
pub struct SeqStore {
    codec    : RefCodec,
    port     : Arc<dyn PersistencePort>,
    capacity : usize,
    index    : RwLock<BTreeMap<String, SeqMeta>>,
    cache    : Mutex<WorkingSet>,
}

impl SeqStore {
    /// Open over an existing (possibly empty) store, rebuilding the guid
    /// index from the `seq/` keyspace.
    pub fn open(codec: RefCodec, port: Arc<dyn PersistencePort>, capacity: usize) -> Result<Self, StoreError> {
        let mut index = BTreeMap::new();
        for key in port.scan(keys::SEQ_PREFIX)? {
            let guid = key[keys::SEQ_PREFIX.len()..].to_string();
            let bytes = port.get(&key)?.ok_or_else(|| StoreError::MissingRecord { guid: guid.clone() })?;
            let meta = match record::decode::<SeqRecord>(&key, &bytes)? {
                SeqRecord::Single(seq) => SeqMeta {
                    quality: seq.quality(), invalid: seq.is_invalid(), single_delta: true,
                },
                SeqRecord::Delta(delta) => SeqMeta {
                    quality: delta.quality(), invalid: delta.is_invalid(), single_delta: false,
                },
            };
            index.insert(guid, meta);
        }
        if !index.is_empty() {
            info!("Rebuilt sequence index: {} guids", index.len());
        }
        Ok(Self {
            codec,
            port,
            capacity,
            index: RwLock::new(index),
            cache: Mutex::new(WorkingSet::default()),
        })
    }

    #[must_use]
    pub fn codec(&self) -> &RefCodec {
        &self.codec
    }

    /// Compress a masked consensus and commit it: durable record (double-
    /// delta where it pays off), metadata bag, working set entry.
    pub fn insert(
        &self,
        guid   : &str,
        masked : &str,
        meta   : &BTreeMap<String, Value>,
    ) -> Result<Arc<CompressedSequence>, StoreError> {
        if !keys::valid_guid(guid) {
            return Err(StoreError::InvalidGuid(guid.to_string()));
        }
        if self.exists(guid) {
            return Err(StoreError::DuplicateGuid(guid.to_string()));
        }
        let compressed = self.codec.compress(masked)?;

        let (seq_record, single_delta) = match self.deltify(&compressed)? {
            Some((anchor_guid, delta)) => {
                debug!("Storing '{guid}' as double-delta against '{anchor_guid}'");
                (SeqRecord::Delta(delta), false)
            }
            None => (SeqRecord::Single(compressed.clone()), true),
        };

        let seq_key = keys::seq_key(guid);
        let meta_key = keys::meta_key(guid);
        self.port.atomic_batch(vec![
            BatchOp::put(&seq_key, record::encode(&seq_key, &seq_record)?),
            BatchOp::put(&meta_key, record::encode(&meta_key, meta)?),
        ])?;

        let seq_meta = SeqMeta {
            quality: compressed.quality(),
            invalid: compressed.is_invalid(),
            single_delta,
        };
        self.index.write().insert(guid.to_string(), seq_meta);

        let shared = Arc::new(compressed);
        let mut cache = self.cache.lock();
        cache.admit(guid.to_string(), Arc::clone(&shared));
        cache.evict_to(self.capacity);
        Ok(shared)
    }

    /// Try to re-encode against an anchor drawn from the single-delta
    /// population. `None` when no candidate saves enough.
    fn deltify(&self, compressed: &CompressedSequence) -> Result<Option<(String, DeltaSequence)>, StoreError> {
        let eligible: Vec<String> = self.index.read().iter()
            .filter(|(_, meta)| meta.single_delta && !meta.invalid)
            .map(|(guid, _)| guid.clone())
            .collect();
        let sample: Vec<String> = if eligible.len() > ANCHOR_SAMPLE {
            fastrand::choose_multiple(eligible.into_iter(), ANCHOR_SAMPLE)
        } else {
            eligible
        };

        let mut anchors = Vec::with_capacity(sample.len());
        for guid in sample {
            let seq = self.get(&guid)?;
            anchors.push((guid, seq));
        }
        let candidates = anchors.iter().map(|(guid, seq)| (guid.as_str(), seq.as_ref()));
        Ok(self.codec.best_anchor(compressed, candidates))
    }

    /// Fetch the expanded form, rehydrating from persistence on a working
    /// set miss. Double-delta records are expanded through their anchor
    /// (exactly one hop).
    pub fn get(&self, guid: &str) -> Result<Arc<CompressedSequence>, StoreError> {
        if let Some(hit) = self.cache.lock().touch(guid) {
            return Ok(hit);
        }
        if !self.exists(guid) {
            return Err(StoreError::UnknownGuid(guid.to_string()));
        }

        let seq = match self.load_record(guid)? {
            SeqRecord::Single(seq) => seq,
            SeqRecord::Delta(delta) => {
                let anchor_guid = delta.anchor().to_string();
                let anchor = if let Some(hit) = self.cache.lock().touch(&anchor_guid) {
                    hit
                } else {
                    match self.load_record(&anchor_guid)? {
                        SeqRecord::Single(anchor) => {
                            let anchor = Arc::new(anchor);
                            self.admit(&anchor_guid, Arc::clone(&anchor));
                            anchor
                        }
                        SeqRecord::Delta(_) => return Err(StoreError::AnchorChain {
                            guid: guid.to_string(),
                            anchor: anchor_guid,
                        }),
                    }
                };
                self.codec.expand(delta, &anchor)
            }
        };

        let shared = Arc::new(seq);
        self.admit(guid, Arc::clone(&shared));
        Ok(shared)
    }

    fn load_record(&self, guid: &str) -> Result<SeqRecord, StoreError> {
        let key = keys::seq_key(guid);
        let bytes = self.port.get(&key)?
            .ok_or_else(|| StoreError::MissingRecord { guid: guid.to_string() })?;
        Ok(record::decode(&key, &bytes)?)
    }

    fn admit(&self, guid: &str, seq: Arc<CompressedSequence>) {
        let mut cache = self.cache.lock();
        cache.admit(guid.to_string(), seq);
        cache.evict_to(self.capacity);
    }

    #[must_use]
    pub fn exists(&self, guid: &str) -> bool {
        self.index.read().contains_key(guid)
    }

    /// Number of stored sequences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Sequences currently expanded in RAM.
    #[must_use]
    pub fn working_set_len(&self) -> usize {
        self.cache.lock().entries.len()
    }

    /// All guids, lexicographically ascending.
    #[must_use]
    pub fn guids(&self) -> Vec<String> {
        self.index.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn guids_beginning_with(&self, prefix: &str) -> Vec<String> {
        self.index.read().keys()
            .filter(|guid| guid.starts_with(prefix))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn guids_with_quality_over(&self, cutoff: f64) -> Vec<String> {
        self.index.read().iter()
            .filter(|(_, meta)| !meta.invalid && meta.quality >= cutoff)
            .map(|(guid, _)| guid.clone())
            .collect()
    }

    pub fn quality(&self, guid: &str) -> Result<f64, StoreError> {
        self.index.read().get(guid)
            .map(|meta| meta.quality)
            .ok_or_else(|| StoreError::UnknownGuid(guid.to_string()))
    }

    pub fn is_invalid(&self, guid: &str) -> Result<bool, StoreError> {
        self.index.read().get(guid)
            .map(|meta| meta.invalid)
            .ok_or_else(|| StoreError::UnknownGuid(guid.to_string()))
    }

    /// Guids eligible for comparison: stored, and not flagged invalid.
    #[must_use]
    pub fn comparable_guids(&self) -> Vec<String> {
        self.index.read().iter()
            .filter(|(_, meta)| !meta.invalid)
            .map(|(guid, _)| guid.clone())
            .collect()
    }

    /// Reconstruct the masked consensus string.
    pub fn sequence(&self, guid: &str) -> Result<String, StoreError> {
        let compressed = self.get(guid)?;
        Ok(self.codec.uncompress(&compressed))
    }

    /// Caller-supplied metadata bag, opaque to the core.
    pub fn annotation(&self, guid: &str) -> Result<BTreeMap<String, Value>, StoreError> {
        if !self.exists(guid) {
            return Err(StoreError::UnknownGuid(guid.to_string()));
        }
        let key = keys::meta_key(guid);
        match self.port.get(&key)? {
            Some(bytes) => Ok(record::decode(&key, &bytes)?),
            None        => Ok(BTreeMap::new()),
        }
    }

    /// Drop every sequence and metadata record, durable copies included.
    pub fn reset(&self) -> Result<(), StoreError> {
        let mut ops = Vec::new();
        for prefix in [keys::SEQ_PREFIX, keys::META_PREFIX] {
            for key in self.port.scan(prefix)? {
                ops.push(BatchOp::delete(key));
            }
        }
        self.port.atomic_batch(ops)?;
        self.index.write().clear();
        *self.cache.lock() = WorkingSet::default();
        info!("Sequence store reset");
        Ok(())
    }
}
