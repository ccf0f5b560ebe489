//! End-to-end enrollment and check-in against in-memory and on-disk stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use facegate_audit::{AuditLog, CsvLog, MemoryLog, Status, UNKNOWN};
use facegate_embed::{EmbedError, Embedder, ModelConfig};
use facegate_embedcache::{CacheConfig, EmbeddingCache};
use facegate_gallery::{DirStore, GalleryStore, MemoryStore as GalleryMemory};
use facegate_gate::{Gate, GateConfig, GateError, Outcome};
use facegate_kv::{MemoryStore as KvMemory, RedbStore};
use facegate_matcher::{MatchDecision, MatcherConfig, Metric};

/// Embedder with a fixed image -> vector table. Unknown images have no face;
/// `boom` fails like an unreachable service.
struct TableEmbedder {
    model: ModelConfig,
    table: Mutex<HashMap<Vec<u8>, Vec<f32>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl TableEmbedder {
    fn new() -> Self {
        Self {
            model: ModelConfig::new("table-v1", 2),
            table: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    fn with_delay(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    fn face(self, image: &str, vector: [f32; 2]) -> Self {
        self.table
            .lock()
            .unwrap()
            .insert(image.as_bytes().to_vec(), vector.to_vec());
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Embedder for TableEmbedder {
    async fn embed(&self, image: &[u8]) -> Result<Vec<f32>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if image == b"boom" {
            return Err(EmbedError::Api("HTTP 503".into()));
        }
        self.table
            .lock()
            .unwrap()
            .get(image)
            .cloned()
            .ok_or(EmbedError::NoFace)
    }

    fn model(&self) -> &ModelConfig {
        &self.model
    }
}

struct Env {
    gallery: Arc<GalleryMemory>,
    cache: Arc<EmbeddingCache>,
    embedder: Arc<TableEmbedder>,
    audit: Arc<MemoryLog>,
}

impl Env {
    fn new(embedder: TableEmbedder) -> Self {
        Self {
            gallery: Arc::new(GalleryMemory::new()),
            cache: Arc::new(EmbeddingCache::open(
                Box::new(KvMemory::new()),
                CacheConfig::default(),
            )),
            embedder: Arc::new(embedder),
            audit: Arc::new(MemoryLog::new()),
        }
    }

    fn gate(&self, timeout: Duration) -> Gate {
        Gate::new(GateConfig {
            gallery: self.gallery.clone(),
            cache: self.cache.clone(),
            embedder: self.embedder.clone(),
            audit: self.audit.clone(),
            matcher: MatcherConfig {
                metric: Metric::Euclidean,
                threshold: 0.40,
            },
            timeout,
        })
        .unwrap()
    }
}

fn img(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

#[tokio::test]
async fn exact_match_is_granted_and_logged() {
    let env = Env::new(
        TableEmbedder::new()
            .face("alice-1", [0.3, 0.4])
            .face("alice-q", [0.3, 0.4]),
    );
    let gate = env.gate(Duration::ZERO);
    gate.enroll("Alice", &[img("alice-1")]).unwrap();

    let got = gate.check_in(b"alice-q").await.unwrap();
    assert_eq!(
        got.outcome,
        Outcome::Decided(MatchDecision::Granted {
            identity: "Alice".into(),
            distance: 0.0
        })
    );
    assert!(got.audit_error.is_none());

    let records = env.audit.records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "Alice");
    assert_eq!(records[0].status, Status::AccessGranted);
    assert_eq!(records[0].distance_str(), "0.0000");
}

#[tokio::test]
async fn empty_gallery_has_no_candidates() {
    let env = Env::new(TableEmbedder::new().face("anyone", [1.0, 1.0]));
    let gate = env.gate(Duration::ZERO);

    let got = gate.check_in(b"anyone").await.unwrap();
    assert_eq!(got.outcome, Outcome::Decided(MatchDecision::NoCandidates));
    assert_eq!(got.record.name, UNKNOWN);
    assert_eq!(got.record.status, Status::AccessDenied);
    assert_eq!(got.record.distance, None);
    assert_eq!(env.embedder.calls(), 1);
}

#[tokio::test]
async fn reenrollment_embeds_only_the_new_image() {
    let env = Env::new(
        TableEmbedder::new()
            .face("alice-1", [0.0, 0.0])
            .face("alice-2", [0.1, 0.0])
            .face("q", [0.0, 0.0]),
    );
    let gate = env.gate(Duration::ZERO);

    gate.enroll("Alice", &[img("alice-1")]).unwrap();
    let first = gate.check_in(b"q").await.unwrap();
    assert_eq!(first.rebuilt.as_ref().unwrap().embedded, 1);

    gate.enroll("Alice", &[img("alice-2")]).unwrap();
    assert!(env.cache.token().is_none());

    let second = gate.check_in(b"q").await.unwrap();
    let report = second.rebuilt.unwrap();
    assert_eq!(report.embedded, 1);
    assert_eq!(report.reused, 1);
    assert_eq!(report.entries, 2);
    assert!(second.outcome.is_granted());

    let third = gate.check_in(b"q").await.unwrap();
    assert!(third.rebuilt.is_none());
}

#[tokio::test]
async fn threshold_boundary_flips_decision() {
    let env = Env::new(
        TableEmbedder::new()
            .face("dana-1", [0.0, 0.0])
            .face("near", [0.39, 0.0])
            .face("far", [0.41, 0.0]),
    );
    let gate = env.gate(Duration::ZERO);
    gate.enroll("Dana", &[img("dana-1")]).unwrap();

    let near = gate.check_in(b"near").await.unwrap();
    let far = gate.check_in(b"far").await.unwrap();

    assert!(near.outcome.is_granted());
    assert!(
        matches!(&far.outcome, Outcome::Decided(MatchDecision::Denied { identity, .. }) if identity == "Dana"),
        "{:?}",
        far.outcome
    );
    assert_eq!(far.record.name, "Dana");
    assert_eq!(far.record.status, Status::AccessDenied);
    assert_eq!(far.record.distance_str(), "0.4100");
}

#[tokio::test]
async fn no_face_in_query_is_its_own_outcome() {
    let env = Env::new(TableEmbedder::new().face("alice-1", [0.0, 0.0]));
    let gate = env.gate(Duration::ZERO);
    gate.enroll("Alice", &[img("alice-1")]).unwrap();

    let got = gate.check_in(b"blurry").await.unwrap();
    assert_eq!(got.outcome, Outcome::NoFaceDetected);
    assert!(got.rebuilt.is_none());
    assert_eq!(got.record.status, Status::NoFaceDetected);
    assert_eq!(got.record.name, UNKNOWN);
    assert_eq!(env.audit.records().unwrap().len(), 1);
    // The gallery is not embedded for a query without a face.
    assert_eq!(env.embedder.calls(), 1);
}

#[tokio::test]
async fn embedder_failure_is_an_error_and_not_logged() {
    let env = Env::new(TableEmbedder::new());
    let gate = env.gate(Duration::ZERO);

    let err = gate.check_in(b"boom").await.unwrap_err();
    assert!(matches!(err, GateError::Embedder(_)), "{err}");
    assert_eq!(err.exit_code(), 4);
    assert!(env.audit.records().unwrap().is_empty());

    let err = gate.check_in(b"").await.unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[tokio::test]
async fn audit_failure_keeps_the_decision() {
    let env = Env::new(
        TableEmbedder::new()
            .face("alice-1", [0.0, 0.0])
            .face("q", [0.0, 0.0]),
    );
    let gate = env.gate(Duration::ZERO);
    gate.enroll("Alice", &[img("alice-1")]).unwrap();
    env.audit.set_failing(true);

    let got = gate.check_in(b"q").await.unwrap();
    assert!(got.outcome.is_granted());
    assert!(got.audit_error.is_some());
}

#[tokio::test]
async fn timeout_leaves_cache_untouched() {
    let env = Env::new(
        TableEmbedder::new()
            .with_delay(Duration::from_millis(100))
            .face("alice-1", [0.0, 0.0])
            .face("q", [0.0, 0.0]),
    );
    env.gallery.add_images("Alice", &[img("alice-1")]).unwrap();

    // The query embeds in time; the rebuild does not.
    let gate = env.gate(Duration::from_millis(150));
    let err = gate.check_in(b"q").await.unwrap_err();
    assert!(matches!(err, GateError::Timeout(_)), "{err}");
    assert_eq!(err.exit_code(), 5);
    assert!(env.cache.token().is_none());
    assert!(env.cache.is_empty());
    assert!(env.audit.records().unwrap().is_empty());

    let gate = env.gate(Duration::ZERO);
    assert!(gate.check_in(b"q").await.unwrap().outcome.is_granted());
}

#[tokio::test]
async fn enrollment_invalidates_a_valid_cache() {
    let env = Env::new(
        TableEmbedder::new()
            .face("alice-1", [0.0, 0.0])
            .face("bob-1", [1.0, 1.0])
            .face("q", [1.0, 1.0]),
    );
    let gate = env.gate(Duration::ZERO);
    gate.enroll("Alice", &[img("alice-1")]).unwrap();
    gate.rebuild(false).await.unwrap();
    let model = env.embedder.model().clone();
    assert!(env.cache.is_valid(&*env.gallery, &model).unwrap());

    gate.enroll("Bob", &[img("bob-1")]).unwrap();
    assert!(!env.cache.is_valid(&*env.gallery, &model).unwrap());

    let got = gate.check_in(b"q").await.unwrap();
    assert!(got.outcome.is_granted());
    assert_eq!(got.record.name, "Bob");
    assert!(env.cache.is_valid(&*env.gallery, &model).unwrap());
}

#[tokio::test]
async fn concurrent_check_ins_share_one_rebuild() {
    let env = Env::new(
        TableEmbedder::new()
            .face("alice-1", [0.0, 0.0])
            .face("q", [0.0, 0.0]),
    );
    let gate = env.gate(Duration::ZERO);
    gate.enroll("Alice", &[img("alice-1")]).unwrap();

    let (a, b) = tokio::join!(gate.check_in(b"q"), gate.check_in(b"q"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(a.outcome.is_granted() && b.outcome.is_granted());
    assert_eq!(a.rebuilt.is_some() as u8 + b.rebuilt.is_some() as u8, 1);
    // Two queries plus one gallery image.
    assert_eq!(env.embedder.calls(), 3);
}

#[tokio::test]
async fn identities_and_full_rebuild() {
    let env = Env::new(
        TableEmbedder::new()
            .face("a1", [0.0, 0.0])
            .face("a2", [0.0, 0.1])
            .face("b1", [1.0, 0.0]),
    );
    let gate = env.gate(Duration::ZERO);
    gate.enroll("Bob", &[img("b1")]).unwrap();
    gate.enroll("Alice", &[img("a1"), img("a2"), img("unrecognisable")])
        .unwrap();

    assert_eq!(
        gate.identities().unwrap(),
        vec![("Alice".to_string(), 3), ("Bob".to_string(), 1)]
    );

    let report = gate.rebuild(false).await.unwrap();
    assert_eq!(report.entries, 3);
    assert_eq!(report.skipped.len(), 1);

    // Remembered failures are dropped too, so the faceless image is retried.
    let report = gate.rebuild(true).await.unwrap();
    assert_eq!(report.embedded, 4);
    assert_eq!(report.reused, 0);
}

#[tokio::test]
async fn on_disk_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let gallery_dir = dir.path().join("gallery");
    let db = dir.path().join("cache.redb");
    let log = dir.path().join("log.csv");

    let open = |embedder: Arc<TableEmbedder>| {
        let cache = EmbeddingCache::open(
            Box::new(RedbStore::open(&db).unwrap()),
            CacheConfig::default(),
        );
        Gate::new(GateConfig {
            gallery: Arc::new(DirStore::new(&gallery_dir)),
            cache: Arc::new(cache),
            embedder,
            audit: Arc::new(CsvLog::new(&log)),
            matcher: MatcherConfig::default(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    };
    let table = || {
        TableEmbedder::new()
            .face("alice-1", [0.3, 0.4])
            .face("q", [0.3, 0.4])
    };

    {
        let embedder = Arc::new(table());
        let gate = open(embedder.clone());
        gate.enroll("Alice", &[img("alice-1")]).unwrap();
        assert!(gate.check_in(b"q").await.unwrap().outcome.is_granted());
        assert_eq!(embedder.calls(), 2);
    }

    let embedder = Arc::new(table());
    let gate = open(embedder.clone());
    let got = gate.check_in(b"q").await.unwrap();
    assert!(got.outcome.is_granted());
    assert!(got.rebuilt.is_none());
    assert_eq!(embedder.calls(), 1);

    let records = gate.records().unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.name == "Alice"));
}

#[tokio::test]
async fn unreadable_cache_file_is_rebuilt_from_gallery() {
    let dir = tempfile::tempdir().unwrap();
    let gallery = Arc::new(DirStore::new(dir.path().join("gallery")));
    gallery.add_images("Alice", &[img("alice-1")]).unwrap();
    let db = dir.path().join("cache.redb");
    std::fs::write(&db, b"\x00garbage, not a redb file").unwrap();

    let embedder = Arc::new(
        TableEmbedder::new()
            .face("alice-1", [0.3, 0.4])
            .face("q", [0.3, 0.4]),
    );
    let gate = Gate::new(GateConfig {
        gallery,
        cache: Arc::new(EmbeddingCache::open(
            Box::new(RedbStore::open_or_reset(&db).unwrap()),
            CacheConfig::default(),
        )),
        embedder: embedder.clone(),
        audit: Arc::new(CsvLog::new(dir.path().join("log.csv"))),
        matcher: MatcherConfig::default(),
        timeout: Duration::from_secs(5),
    })
    .unwrap();

    let got = gate.check_in(b"q").await.unwrap();
    assert!(got.outcome.is_granted());
    assert_eq!(got.rebuilt.unwrap().entries, 1);
    assert!(dir.path().join("cache.redb.corrupt").exists());
}
