use std::collections::{BTreeMap, HashSet};

use facegate_embed::ModelConfig;
use facegate_gallery::Fingerprint;
use facegate_kv::{BatchOp, KVStore};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::keys::{entry_key, entry_prefix, failure_key, failure_prefix, meta_key};
use crate::{CacheEntry, CacheError, SkipReason, ValidityToken};

/// Bump when the stored row layout changes; older rows are then treated as
/// corrupt and rebuilt.
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct StoredMeta {
    pub version: u32,
    pub model: ModelConfig,
    /// None once invalidated.
    pub token: Option<ValidityToken>,
}

/// Everything read back from the store.
pub(crate) struct Loaded {
    pub model: ModelConfig,
    pub token: Option<ValidityToken>,
    pub entries: Vec<CacheEntry>,
    pub failures: BTreeMap<Fingerprint, SkipReason>,
}

fn encode<T: Serialize>(v: &T) -> Result<Vec<u8>, CacheError> {
    rmp_serde::to_vec_named(v).map_err(|e| CacheError::Storage(format!("encode: {e}")))
}

fn decode<T: DeserializeOwned>(key: &str, data: &[u8]) -> Result<T, CacheError> {
    rmp_serde::from_slice(data).map_err(|e| CacheError::Corrupt(format!("{key}: {e}")))
}

/// Reads the persisted cache. `Ok(None)` means nothing was ever committed.
/// Any undecodable or inconsistent row fails the whole load.
pub(crate) fn load(store: &dyn KVStore, prefix: &str) -> Result<Option<Loaded>, CacheError> {
    let mkey = meta_key(prefix);
    let Some(raw) = store.get(&mkey)? else {
        return Ok(None);
    };
    let meta: StoredMeta = decode(&mkey, &raw)?;
    if meta.version != FORMAT_VERSION {
        return Err(CacheError::Corrupt(format!(
            "unsupported format version {} (want {FORMAT_VERSION})",
            meta.version
        )));
    }

    let mut entries = Vec::new();
    for (key, data) in store.scan(&entry_prefix(prefix))? {
        let entry: CacheEntry = decode(&key, &data)?;
        if key != entry_key(prefix, entry.fingerprint.as_str(), &entry.identity) {
            return Err(CacheError::Corrupt(format!("{key}: row does not match its key")));
        }
        if entry.vector.len() != meta.model.dimension {
            return Err(CacheError::Corrupt(format!(
                "{key}: vector has {} dimensions, model has {}",
                entry.vector.len(),
                meta.model.dimension
            )));
        }
        entries.push(entry);
    }

    let fprefix = failure_prefix(prefix);
    let mut failures = BTreeMap::new();
    for (key, data) in store.scan(&fprefix)? {
        let reason: SkipReason = decode(&key, &data)?;
        let fp = Fingerprint::from_hex(&key[fprefix.len()..]);
        failures.insert(fp, reason);
    }

    Ok(Some(Loaded {
        model: meta.model,
        token: meta.token,
        entries,
        failures,
    }))
}

/// Builds the single batch that replaces the persisted cache with the given
/// contents. When `rows_current` is true, rows already present are assumed
/// to hold the same vectors and are not rewritten. A `None` token stores the
/// rows without marking them valid.
pub(crate) fn commit_batch(
    store: &dyn KVStore,
    prefix: &str,
    model: &ModelConfig,
    token: Option<&ValidityToken>,
    entries: &[CacheEntry],
    failures: &BTreeMap<Fingerprint, SkipReason>,
    rows_current: bool,
) -> Result<Vec<BatchOp>, CacheError> {
    let mut existing: HashSet<String> = store
        .scan(&entry_prefix(prefix))?
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    existing.extend(
        store
            .scan(&failure_prefix(prefix))?
            .into_iter()
            .map(|(k, _)| k),
    );

    let mut ops = Vec::new();
    let mut keep = HashSet::with_capacity(entries.len() + failures.len());

    for entry in entries {
        let key = entry_key(prefix, entry.fingerprint.as_str(), &entry.identity);
        if !(rows_current && existing.contains(&key)) {
            ops.push(BatchOp::Put(key.clone(), encode(entry)?));
        }
        keep.insert(key);
    }
    for (fp, reason) in failures {
        let key = failure_key(prefix, fp.as_str());
        if !(rows_current && existing.contains(&key)) {
            ops.push(BatchOp::Put(key.clone(), encode(reason)?));
        }
        keep.insert(key);
    }

    let mut stale: Vec<String> = existing.into_iter().filter(|k| !keep.contains(k)).collect();
    stale.sort();
    ops.extend(stale.into_iter().map(BatchOp::Delete));

    let meta = StoredMeta {
        version: FORMAT_VERSION,
        model: model.clone(),
        token: token.cloned(),
    };
    ops.push(BatchOp::Put(meta_key(prefix), encode(&meta)?));
    Ok(ops)
}

/// Clears the persisted token, leaving rows in place as reuse candidates.
pub(crate) fn store_invalidated(
    store: &dyn KVStore,
    prefix: &str,
    model: Option<&ModelConfig>,
) -> Result<(), CacheError> {
    match model {
        Some(model) => {
            let meta = StoredMeta {
                version: FORMAT_VERSION,
                model: model.clone(),
                token: None,
            };
            store.set(&meta_key(prefix), &encode(&meta)?)?;
        }
        None => store.delete(&meta_key(prefix))?,
    }
    Ok(())
}
