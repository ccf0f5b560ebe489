use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use facegate_embed::{EmbedError, Embedder, ModelConfig};
use facegate_gallery::{Fingerprint, GalleryImage, GalleryStore};
use facegate_kv::{BatchOp, KVStore};
use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

use crate::keys::{entry_prefix, failure_prefix, meta_key};
use crate::persist;
use crate::{
    CacheEntry, CacheError, RebuildReport, SkipReason, SkippedImage, ValidityToken, compute_token,
};

/// Controls cache behavior.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// KV key prefix for all cache rows.
    /// Default: "facegate:cache".
    pub prefix: String,

    /// Maximum embedder calls in flight during a rebuild.
    /// Default: 4.
    pub concurrency: usize,

    /// Rebuild passes before giving up on a gallery that keeps changing.
    /// Default: 3.
    pub max_attempts: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: "facegate:cache".into(),
            concurrency: 4,
            max_attempts: 3,
        }
    }
}

impl CacheConfig {
    fn with_defaults(mut self) -> Self {
        let d = Self::default();
        if self.prefix.is_empty() {
            self.prefix = d.prefix;
        }
        if self.concurrency == 0 {
            self.concurrency = d.concurrency;
        }
        if self.max_attempts == 0 {
            self.max_attempts = d.max_attempts;
        }
        self
    }
}

/// What [`EmbeddingCache::open`] found in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// Nothing persisted yet.
    Empty,
    /// Rows loaded. `token` is false if the cache was invalidated before it
    /// was last persisted.
    Loaded { entries: usize, token: bool },
    /// The store could not be read or decoded; started empty.
    Corrupt(String),
}

/// Entries that are valid for the gallery at the time of the call.
#[derive(Debug, Clone)]
pub struct Fresh {
    /// Sorted by (identity, fingerprint).
    pub entries: Arc<Vec<CacheEntry>>,
    /// Present if this call had to rebuild.
    pub rebuilt: Option<RebuildReport>,
}

struct CacheState {
    /// Model the entries were embedded with.
    model: Option<ModelConfig>,
    /// None while invalid.
    token: Option<ValidityToken>,
    entries: Arc<Vec<CacheEntry>>,
    /// Permanent per-fingerprint failures under `model`.
    failures: BTreeMap<Fingerprint, SkipReason>,
    /// Bumped by every invalidation; a rebuild commits only if unchanged.
    generation: u64,
}

impl CacheState {
    fn empty() -> Self {
        Self {
            model: None,
            token: None,
            entries: Arc::new(Vec::new()),
            failures: BTreeMap::new(),
            generation: 0,
        }
    }
}

/// Persisted embedding cache.
///
/// Thread-safe: all methods can be called concurrently.
pub struct EmbeddingCache {
    cfg: CacheConfig,
    store: Box<dyn KVStore>,
    state: RwLock<CacheState>,
    rebuild_lock: tokio::sync::Mutex<()>,
    load_state: LoadState,
}

fn sort_entries(entries: &mut [CacheEntry]) {
    entries.sort_by(|a, b| {
        a.identity
            .cmp(&b.identity)
            .then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
}

impl EmbeddingCache {
    /// Opens the cache persisted in `store`.
    ///
    /// Never fails: an unreadable or corrupt store is logged and the cache
    /// starts empty and invalid.
    pub fn open(store: Box<dyn KVStore>, cfg: CacheConfig) -> Self {
        let cfg = cfg.with_defaults();
        let (state, load_state) = match persist::load(&*store, &cfg.prefix) {
            Ok(None) => (CacheState::empty(), LoadState::Empty),
            Ok(Some(loaded)) => {
                let mut entries = loaded.entries;
                sort_entries(&mut entries);
                let load_state = LoadState::Loaded {
                    entries: entries.len(),
                    token: loaded.token.is_some(),
                };
                debug!(
                    "embedcache: loaded {} entries for model {}",
                    entries.len(),
                    loaded.model.model
                );
                let state = CacheState {
                    model: Some(loaded.model),
                    token: loaded.token,
                    entries: Arc::new(entries),
                    failures: loaded.failures,
                    generation: 0,
                };
                (state, load_state)
            }
            Err(e) => {
                warn!("embedcache: discarding unreadable cache, full rebuild required: {e}");
                (CacheState::empty(), LoadState::Corrupt(e.to_string()))
            }
        };

        Self {
            cfg,
            store,
            state: RwLock::new(state),
            rebuild_lock: tokio::sync::Mutex::new(()),
            load_state,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns what was found in the store at open time.
    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    /// Returns the stored token, or None while invalid.
    pub fn token(&self) -> Option<ValidityToken> {
        self.read_state().token.clone()
    }

    /// Number of entries currently held (valid or not).
    pub fn len(&self) -> usize {
        self.read_state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Computes the token the cache must hold to be valid right now.
    pub fn current_token(
        &self,
        gallery: &dyn GalleryStore,
        model: &ModelConfig,
    ) -> Result<ValidityToken, CacheError> {
        Ok(compute_token(model, &gallery.snapshot()?))
    }

    /// Reports whether the cache matches the gallery and model.
    pub fn is_valid(
        &self,
        gallery: &dyn GalleryStore,
        model: &ModelConfig,
    ) -> Result<bool, CacheError> {
        let current = self.current_token(gallery, model)?;
        Ok(self.read_state().token.as_ref() == Some(&current))
    }

    /// Returns the entries if they are valid for the gallery, None otherwise.
    pub fn valid_entries(
        &self,
        gallery: &dyn GalleryStore,
        model: &ModelConfig,
    ) -> Result<Option<Arc<Vec<CacheEntry>>>, CacheError> {
        let current = self.current_token(gallery, model)?;
        let st = self.read_state();
        if st.token.as_ref() == Some(&current) {
            Ok(Some(st.entries.clone()))
        } else {
            Ok(None)
        }
    }

    /// Marks the cache stale. Vectors are kept as reuse candidates for the
    /// next rebuild.
    ///
    /// The in-memory token is cleared under one lock. Clearing the persisted
    /// token is best effort: a stale persisted token is still caught on the
    /// next open because it no longer matches the gallery.
    pub fn invalidate(&self) {
        let mut st = self.write_state();
        st.token = None;
        st.generation += 1;
        if let Err(e) = persist::store_invalidated(&*self.store, &self.cfg.prefix, st.model.as_ref())
        {
            warn!("embedcache: failed to persist invalidation: {e}");
        }
        debug!("embedcache: invalidated (generation {})", st.generation);
    }

    /// Deletes every persisted row and forgets all vectors, forcing the next
    /// rebuild to embed the whole gallery.
    pub fn purge(&self) -> Result<(), CacheError> {
        let mut st = self.write_state();
        let mut ops: Vec<BatchOp> = Vec::new();
        for prefix in [entry_prefix(&self.cfg.prefix), failure_prefix(&self.cfg.prefix)] {
            ops.extend(
                self.store
                    .scan(&prefix)?
                    .into_iter()
                    .map(|(k, _)| BatchOp::Delete(k)),
            );
        }
        ops.push(BatchOp::Delete(meta_key(&self.cfg.prefix)));
        self.store.apply(&ops)?;

        let generation = st.generation + 1;
        *st = CacheState::empty();
        st.generation = generation;
        info!("embedcache: purged {} rows", ops.len() - 1);
        Ok(())
    }

    /// Returns valid entries, rebuilding first if needed.
    ///
    /// If another rebuild is already running this waits for it and, when it
    /// leaves the cache valid, returns its result without embedding anything.
    pub async fn ensure_fresh(
        &self,
        gallery: &dyn GalleryStore,
        embedder: &dyn Embedder,
    ) -> Result<Fresh, CacheError> {
        let model = embedder.model();
        if let Some(entries) = self.valid_entries(gallery, model)? {
            return Ok(Fresh {
                entries,
                rebuilt: None,
            });
        }

        let _guard = self.rebuild_lock.lock().await;
        if let Some(entries) = self.valid_entries(gallery, model)? {
            debug!("embedcache: joined a concurrent rebuild");
            return Ok(Fresh {
                entries,
                rebuilt: None,
            });
        }

        let (report, entries) = self.rebuild_locked(gallery, embedder).await?;
        Ok(Fresh {
            entries,
            rebuilt: Some(report),
        })
    }

    /// Re-embeds the gallery, reusing vectors for unchanged fingerprints.
    pub async fn rebuild(
        &self,
        gallery: &dyn GalleryStore,
        embedder: &dyn Embedder,
    ) -> Result<RebuildReport, CacheError> {
        let _guard = self.rebuild_lock.lock().await;
        let (report, _) = self.rebuild_locked(gallery, embedder).await?;
        Ok(report)
    }

    async fn rebuild_locked(
        &self,
        gallery: &dyn GalleryStore,
        embedder: &dyn Embedder,
    ) -> Result<(RebuildReport, Arc<Vec<CacheEntry>>), CacheError> {
        let model = embedder.model().clone();

        // Results from passes that could not commit; still valid vectors.
        let mut fresh: HashMap<Fingerprint, Vec<f32>> = HashMap::new();
        let mut fresh_failures: HashMap<Fingerprint, SkipReason> = HashMap::new();
        let mut calls = 0usize;

        for attempt in 1..=self.cfg.max_attempts {
            let (generation, prior, remembered, same_model) = {
                let st = self.read_state();
                let same_model = st.model.as_ref() == Some(&model);
                if same_model {
                    (st.generation, st.entries.clone(), st.failures.clone(), true)
                } else {
                    (st.generation, Arc::new(Vec::new()), BTreeMap::new(), false)
                }
            };
            let pool: HashMap<&Fingerprint, &[f32]> = prior
                .iter()
                .map(|e| (&e.fingerprint, e.vector.as_slice()))
                .collect();

            let images = gallery.snapshot()?;
            let token = compute_token(&model, &images);

            let mut queued: HashSet<&Fingerprint> = HashSet::new();
            let jobs: Vec<&GalleryImage> = images
                .iter()
                .filter(|img| {
                    let fp = &img.fingerprint;
                    !pool.contains_key(fp)
                        && !fresh.contains_key(fp)
                        && !fresh_failures.contains_key(fp)
                        && !remembered.contains_key(fp)
                        && queued.insert(fp)
                })
                .collect();

            if !jobs.is_empty() {
                debug!(
                    "embedcache: embedding {} images (attempt {attempt})",
                    jobs.len()
                );
            }

            let results: Vec<(&GalleryImage, Result<Vec<f32>, SkipReason>, bool)> =
                stream::iter(jobs)
                    .map(|img| {
                        let dim = model.dimension;
                        async move {
                            let bytes = match gallery.read(img) {
                                Ok(b) => b,
                                Err(e) => {
                                    return (img, Err(SkipReason::Unreadable(e.to_string())), false);
                                }
                            };
                            let res = match embedder.embed(&bytes).await {
                                Ok(v) if v.len() != dim => Err(SkipReason::from_embed(
                                    &EmbedError::DimensionMismatch {
                                        expected: dim,
                                        got: v.len(),
                                    },
                                )),
                                Ok(v) => Ok(v),
                                Err(e) => Err(SkipReason::from_embed(&e)),
                            };
                            (img, res, true)
                        }
                    })
                    .buffer_unordered(self.cfg.concurrency)
                    .collect()
                    .await;

            let mut transient: HashMap<Fingerprint, SkipReason> = HashMap::new();
            for (img, res, called) in results {
                if called {
                    calls += 1;
                }
                match res {
                    Ok(v) => {
                        fresh.insert(img.fingerprint.clone(), v);
                    }
                    Err(reason) => {
                        warn!(
                            "embedcache: skipping {}/{}: {reason}",
                            img.identity, img.name
                        );
                        if reason.is_permanent() {
                            fresh_failures.insert(img.fingerprint.clone(), reason);
                        } else {
                            transient.insert(img.fingerprint.clone(), reason);
                        }
                    }
                }
            }

            let mut entries = Vec::with_capacity(images.len());
            let mut skipped = Vec::new();
            let mut failures = BTreeMap::new();
            let mut reused = 0usize;
            let mut pairs: HashSet<(&str, &Fingerprint)> = HashSet::new();
            for img in &images {
                let fp = &img.fingerprint;
                if !pairs.insert((img.identity.as_str(), fp)) {
                    continue;
                }
                let vector = if let Some(v) = fresh.get(fp) {
                    Some(v.clone())
                } else if let Some(v) = pool.get(fp) {
                    reused += 1;
                    Some(v.to_vec())
                } else {
                    None
                };
                if let Some(vector) = vector {
                    entries.push(CacheEntry {
                        identity: img.identity.clone(),
                        fingerprint: fp.clone(),
                        vector,
                    });
                    continue;
                }

                let (reason, was_remembered) = if let Some(r) = fresh_failures.get(fp) {
                    (r.clone(), false)
                } else if let Some(r) = remembered.get(fp) {
                    (r.clone(), true)
                } else if let Some(r) = transient.get(fp) {
                    (r.clone(), false)
                } else {
                    // Every queued fingerprint lands in one of the maps above.
                    continue;
                };
                if reason.is_permanent() {
                    failures.insert(fp.clone(), reason.clone());
                }
                skipped.push(SkippedImage {
                    image: img.clone(),
                    reason,
                    remembered: was_remembered,
                });
            }
            sort_entries(&mut entries);

            // Commit only if nothing moved underneath us.
            if self.current_token(gallery, &model)? != token {
                debug!("embedcache: gallery changed during rebuild (attempt {attempt}), retrying");
                continue;
            }
            let mut st = self.write_state();
            if st.generation != generation {
                debug!("embedcache: invalidated during rebuild (attempt {attempt}), retrying");
                continue;
            }

            // Transient skips must be retried, so such a pass stays invalid.
            let committed = transient.is_empty().then(|| token.clone());
            let ops = persist::commit_batch(
                &*self.store,
                &self.cfg.prefix,
                &model,
                committed.as_ref(),
                &entries,
                &failures,
                same_model,
            )?;
            self.store.apply(&ops)?;

            let report = RebuildReport {
                images: images.len(),
                entries: entries.len(),
                embedded: calls,
                reused,
                skipped,
                attempts: attempt,
            };
            let entries = Arc::new(entries);
            st.model = Some(model);
            st.token = committed;
            st.entries = entries.clone();
            st.failures = failures;

            info!(
                "embedcache: committed {} entries ({} embedded, {} reused, {} skipped), token {}",
                report.entries,
                report.embedded,
                report.reused,
                report.skipped.len(),
                token
            );
            if !transient.is_empty() {
                warn!(
                    "embedcache: {} images failed transiently, cache stays stale until they are retried",
                    transient.len()
                );
            }
            return Ok((report, entries));
        }

        Err(CacheError::GalleryUnstable {
            attempts: self.cfg.max_attempts,
        })
    }
}
