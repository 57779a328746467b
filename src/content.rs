//! Metadata cache with non-blocking loading
//!
//! Actors request the metadata they need during activation. A request is a
//! suspension point: the activation task yields back to the frame loop and
//! resumes once the decode (on the worker pool, or inline) has delivered.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::channel::oneshot;
use futures::future::Shared;
use serde::{Deserialize, Serialize};

use crate::jobs::ThreadPool;

/// Errors while loading metadata
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContentError {
    #[error("metadata not found: {0}")]
    NotFound(String),
    #[error("failed to read metadata {path}: {message}")]
    Io { path: String, message: String },
    #[error("invalid metadata {path}: {message}")]
    Parse { path: String, message: String },
    #[error("metadata load for {0} was dropped before completing")]
    Canceled(String),
}

type MetadataResult = Result<Arc<Metadata>, ContentError>;

/// Decoded per-actor metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Metadata {
    /// Collision box (width, height) in world units
    #[serde(default)]
    pub bounding_box: (u32, u32),
    /// Animation name -> duration in frames
    #[serde(default)]
    pub animations: BTreeMap<String, f32>,
}

impl Metadata {
    pub fn from_json(path: &str, json: &str) -> Result<Self, ContentError> {
        serde_json::from_str(json).map_err(|e| ContentError::Parse {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    pub fn animation_duration(&self, name: &str) -> Option<f32> {
        self.animations.get(name).copied()
    }
}

/// Where raw metadata comes from
pub trait MetadataSource: Send + Sync {
    fn read(&self, path: &str) -> Result<String, ContentError>;
}

/// Metadata held in memory, keyed by path
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    entries: HashMap<String, String>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, json: &str) -> Self {
        self.insert(path, json);
        self
    }

    pub fn insert(&mut self, path: &str, json: &str) {
        self.entries.insert(path.to_string(), json.to_string());
    }

    /// Metadata for every stock object the activation factory knows
    pub fn stock() -> Self {
        const CRATE: &str = r#"{ "bounding_box": [30, 30], "animations": { "Idle": 1.0, "Destroyed": 20.0 } }"#;
        const BARREL: &str = r#"{ "bounding_box": [28, 28], "animations": { "Idle": 1.0 } }"#;
        const MONITOR: &str = r#"{ "bounding_box": [30, 28], "animations": { "Idle": 1.0, "Destroyed": 24.0 } }"#;
        const PICKUP: &str = r#"{ "bounding_box": [16, 16], "animations": { "Idle": 1.0 } }"#;
        const SHOT: &str = r#"{ "bounding_box": [8, 8], "animations": { "Idle": 1.0 } }"#;

        Self::new()
            .with("Object/CrateAmmo", CRATE)
            .with("Object/CrateContainer", CRATE)
            .with("Object/PushBox", r#"{ "bounding_box": [32, 32], "animations": { "Idle": 1.0 } }"#)
            .with("Object/BarrelAmmo", BARREL)
            .with("Object/BarrelContainer", BARREL)
            .with("Object/PowerUpMonitor", MONITOR)
            .with("Object/Collectible", PICKUP)
            .with("Weapon/Shot", SHOT)
            .with("Weapon/TNT", r#"{ "bounding_box": [12, 12], "animations": { "Idle": 1.0, "Explode": 10.0 } }"#)
            .with("Interactive/Player", r#"{ "bounding_box": [22, 30], "animations": { "Idle": 1.0 } }"#)
    }
}

impl MetadataSource for InMemorySource {
    fn read(&self, path: &str) -> Result<String, ContentError> {
        self.entries
            .get(path)
            .cloned()
            .ok_or_else(|| ContentError::NotFound(path.to_string()))
    }
}

/// Metadata stored as `<root>/<path>.json`
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl MetadataSource for DirectorySource {
    fn read(&self, path: &str) -> Result<String, ContentError> {
        let file = self.root.join(format!("{path}.json"));
        std::fs::read_to_string(&file).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ContentError::NotFound(path.to_string()),
            _ => ContentError::Io {
                path: path.to_string(),
                message: e.to_string(),
            },
        })
    }
}

enum CacheEntry {
    Pending(Shared<oneshot::Receiver<MetadataResult>>),
    Ready(Arc<Metadata>),
    Failed(ContentError),
}

/// Frame-thread owned metadata cache
pub struct ContentResolver {
    source: Arc<dyn MetadataSource>,
    pool: Option<ThreadPool>,
    cache: RefCell<HashMap<String, CacheEntry>>,
}

impl ContentResolver {
    /// Decode on `pool` when given, otherwise inline on the calling thread
    pub fn new(source: impl MetadataSource + 'static, pool: Option<ThreadPool>) -> Self {
        Self {
            source: Arc::new(source),
            pool,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Start loading `path` unless it is already cached or in flight
    pub fn preload_metadata(&self, path: &str) {
        if self.cache.borrow().contains_key(path) {
            return;
        }

        let (tx, rx) = oneshot::channel();
        let source = self.source.clone();
        let owned_path = path.to_string();
        let job = move || {
            let result = source
                .read(&owned_path)
                .and_then(|json| Metadata::from_json(&owned_path, &json))
                .map(Arc::new);
            let _ = tx.send(result);
        };

        match &self.pool {
            Some(pool) => {
                // A refused job drops the sender, so waiters see a cancellation
                if let Err(e) = pool.enqueue(job) {
                    log::warn!("Could not queue metadata load for {}: {}", path, e);
                }
            }
            None => job(),
        }

        self.cache
            .borrow_mut()
            .insert(path.to_string(), CacheEntry::Pending(rx.shared()));
    }

    /// Resolve `path`, suspending the calling task at least once
    pub async fn request_metadata(&self, path: &str) -> MetadataResult {
        self.preload_metadata(path);
        YieldNow { yielded: false }.await;

        let pending = match self.cache.borrow().get(path) {
            Some(CacheEntry::Ready(metadata)) => return Ok(metadata.clone()),
            Some(CacheEntry::Failed(e)) => return Err(e.clone()),
            Some(CacheEntry::Pending(pending)) => pending.clone(),
            None => return Err(ContentError::NotFound(path.to_string())),
        };

        let result = pending
            .await
            .unwrap_or_else(|_| Err(ContentError::Canceled(path.to_string())));

        let entry = match &result {
            Ok(metadata) => CacheEntry::Ready(metadata.clone()),
            Err(e) => {
                log::debug!("Metadata {} failed to load: {}", path, e);
                CacheEntry::Failed(e.clone())
            }
        };
        self.cache.borrow_mut().insert(path.to_string(), entry);
        result
    }

    /// Already decoded metadata, without waiting
    pub fn cached(&self, path: &str) -> Option<Arc<Metadata>> {
        match self.cache.borrow().get(path) {
            Some(CacheEntry::Ready(metadata)) => Some(metadata.clone()),
            Some(CacheEntry::Pending(pending)) => match pending.peek() {
                Some(Ok(Ok(metadata))) => Some(metadata.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_known(&self, path: &str) -> bool {
        self.cache.borrow().contains_key(path)
    }
}

/// Returns `Pending` once after waking itself
struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::{LocalPool, block_on};
    use futures::task::LocalSpawnExt;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        inner: InMemorySource,
        reads: Arc<AtomicUsize>,
    }

    impl MetadataSource for CountingSource {
        fn read(&self, path: &str) -> Result<String, ContentError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(path)
        }
    }

    #[test]
    fn test_request_inline() {
        let resolver = ContentResolver::new(InMemorySource::stock(), None);
        let metadata = block_on(resolver.request_metadata("Object/CrateAmmo")).unwrap();
        assert_eq!(metadata.bounding_box, (30, 30));
        assert_eq!(metadata.animation_duration("Destroyed"), Some(20.0));
        assert!(resolver.cached("Object/CrateAmmo").is_some());
    }

    #[test]
    fn test_missing_metadata() {
        let resolver = ContentResolver::new(InMemorySource::new(), None);
        let result = block_on(resolver.request_metadata("Object/Nope"));
        assert_eq!(result, Err(ContentError::NotFound("Object/Nope".into())));
    }

    #[test]
    fn test_invalid_json() {
        let source = InMemorySource::new().with("Broken", "{ not json");
        let resolver = ContentResolver::new(source, None);
        let result = block_on(resolver.request_metadata("Broken"));
        assert!(matches!(result, Err(ContentError::Parse { .. })));
    }

    #[test]
    fn test_preload_is_idempotent() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: InMemorySource::stock(),
            reads: reads.clone(),
        };
        let resolver = ContentResolver::new(source, None);
        resolver.preload_metadata("Weapon/Shot");
        resolver.preload_metadata("Weapon/Shot");
        block_on(resolver.request_metadata("Weapon/Shot")).unwrap();
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_suspends_at_least_once() {
        let resolver = Rc::new(ContentResolver::new(InMemorySource::stock(), None));
        let done = Rc::new(RefCell::new(false));
        let mut pool = LocalPool::new();
        {
            let resolver = resolver.clone();
            let done = done.clone();
            pool.spawner()
                .spawn_local(async move {
                    resolver.request_metadata("Weapon/TNT").await.unwrap();
                    *done.borrow_mut() = true;
                })
                .unwrap();
        }
        // Spawning alone never runs the task
        assert!(!*done.borrow());
        pool.run();
        assert!(*done.borrow());
    }

    #[test]
    fn test_shared_decode_on_worker_pool() {
        let reads = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            inner: InMemorySource::stock(),
            reads: reads.clone(),
        };
        let resolver = Rc::new(ContentResolver::new(source, Some(ThreadPool::new(2))));
        let finished = Rc::new(RefCell::new(0));
        let mut pool = LocalPool::new();
        for _ in 0..4 {
            let resolver = resolver.clone();
            let finished = finished.clone();
            pool.spawner()
                .spawn_local(async move {
                    let metadata = resolver.request_metadata("Object/PushBox").await.unwrap();
                    assert_eq!(metadata.bounding_box, (32, 32));
                    *finished.borrow_mut() += 1;
                })
                .unwrap();
        }
        pool.run();
        assert_eq!(*finished.borrow(), 4);
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_directory_source_not_found() {
        let source = DirectorySource::new("/nonexistent/jazz-actors");
        assert_eq!(
            source.read("Object/Crate"),
            Err(ContentError::NotFound("Object/Crate".into()))
        );
    }
}
