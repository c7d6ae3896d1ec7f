//! State store adapter.
//!
//! The only component that talks to the persistence layer. The backend is a
//! versioned document store ([`DocumentStore`]); on top of it [`StateStore`]
//! runs optimistic transactions: every document read records its version,
//! and the commit applies all writes only if none of those versions changed.
//! Conflicts are retried with bounded exponential backoff.
//!
//! # Example
//!
//! ```
//! use polis_core::city::CityState;
//! use polis_core::ids::{CityId, PlayerId};
//! use polis_core::math::MapPosition;
//! use polis_core::store::StateStore;
//!
//! let store = StateStore::memory();
//! store
//!     .create_city(CityState::new(CityId(1), PlayerId(1), MapPosition::new(0, 0)))
//!     .unwrap();
//!
//! store
//!     .transact("rename", |tx| {
//!         let mut city = tx.require_city(CityId(1))?;
//!         city.name = "Athens".into();
//!         tx.put_city(city);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(store.city(CityId(1)).unwrap().unwrap().name, "Athens");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::city::{CityState, VillageState};
use crate::error::{GameError, Result, StoreError};
use crate::ids::{CityId, MovementId, ReportId, VillageId};
use crate::movement::Movement;
use crate::report::Report;

/// Collection a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocKind {
    /// Player cities.
    City,
    /// Unaffiliated villages.
    Village,
    /// In-flight movements.
    Movement,
    /// Player-visible reports.
    Report,
}

/// Key of a single document. One key is one aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DocKey {
    /// A city document.
    City(CityId),
    /// A village document.
    Village(VillageId),
    /// A movement document.
    Movement(MovementId),
    /// A report document.
    Report(ReportId),
}

impl DocKey {
    /// Collection of this key.
    #[must_use]
    pub const fn kind(&self) -> DocKind {
        match self {
            Self::City(_) => DocKind::City,
            Self::Village(_) => DocKind::Village,
            Self::Movement(_) => DocKind::Movement,
            Self::Report(_) => DocKind::Report,
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::City(id) => write!(f, "cities/{}", id.0),
            Self::Village(id) => write!(f, "villages/{}", id.0),
            Self::Movement(id) => write!(f, "movements/{}", id.0),
            Self::Report(id) => write!(f, "reports/{}", id.0),
        }
    }
}

/// Stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Document {
    /// City state.
    City(CityState),
    /// Village state.
    Village(VillageState),
    /// Movement record.
    Movement(Movement),
    /// Report record.
    Report(Report),
}

impl Document {
    /// Key under which this document lives.
    #[must_use]
    pub fn key(&self) -> DocKey {
        match self {
            Self::City(c) => DocKey::City(c.id),
            Self::Village(v) => DocKey::Village(v.id),
            Self::Movement(m) => DocKey::Movement(m.id),
            Self::Report(r) => DocKey::Report(r.id),
        }
    }
}

/// A document with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned {
    /// Version stamp, unique per write.
    pub version: u64,
    /// The document.
    pub document: Document,
}

/// All writes of one transaction plus the read versions they depend on.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    /// Keys read, with the version seen (`None` = key was absent).
    pub expected: Vec<(DocKey, Option<u64>)>,
    /// Writes to apply (`None` = delete).
    pub writes: Vec<(DocKey, Option<Document>)>,
}

impl WriteBatch {
    /// Whether the batch writes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// Versioned document store with compare-and-commit semantics.
///
/// `commit` must apply every write of the batch or none of them, and must
/// fail with [`StoreError::Conflict`] if any expected version differs from
/// the stored one.
pub trait DocumentStore: Send + Sync {
    /// Read one document.
    fn get(&self, key: &DocKey) -> std::result::Result<Option<Versioned>, StoreError>;

    /// List every key of a collection.
    fn keys(&self, kind: DocKind) -> std::result::Result<Vec<DocKey>, StoreError>;

    /// Atomically validate and apply a batch.
    fn commit(&self, batch: WriteBatch) -> std::result::Result<(), StoreError>;

    /// Allocate a fresh numeric id for a new document.
    fn allocate_id(&self) -> u64;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    version: u64,
    bytes: Vec<u8>,
}

/// In-process [`DocumentStore`].
///
/// Documents are kept bincode-encoded so a reader never aliases a writer's
/// state, the same way a remote store hands out copies.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<DocKey, StoredEntry>>,
    next_version: AtomicU64,
    next_id: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(BTreeMap::new()),
            next_version: AtomicU64::new(1),
            next_id: AtomicU64::new(1),
        }
    }

    /// Number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.read().map_or(0, |docs| docs.len())
    }

    /// Whether the store holds no documents.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn encode(doc: &Document) -> std::result::Result<Vec<u8>, StoreError> {
        bincode::serialize(doc).map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> std::result::Result<Document, StoreError> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Codec(e.to_string()))
    }

    /// Keep allocated ids ahead of any numeric id already seeded.
    fn bump_id_floor(&self, key: &DocKey) {
        let id = match key {
            DocKey::City(id) => id.0,
            DocKey::Village(id) => id.0,
            DocKey::Movement(id) => id.0,
            DocKey::Report(id) => id.0,
        };
        self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, key: &DocKey) -> std::result::Result<Option<Versioned>, StoreError> {
        let docs = self.docs.read().map_err(|_| StoreError::Poisoned)?;
        docs.get(key)
            .map(|entry| {
                Ok(Versioned {
                    version: entry.version,
                    document: Self::decode(&entry.bytes)?,
                })
            })
            .transpose()
    }

    fn keys(&self, kind: DocKind) -> std::result::Result<Vec<DocKey>, StoreError> {
        let docs = self.docs.read().map_err(|_| StoreError::Poisoned)?;
        Ok(docs.keys().filter(|k| k.kind() == kind).copied().collect())
    }

    fn commit(&self, batch: WriteBatch) -> std::result::Result<(), StoreError> {
        let mut encoded = Vec::with_capacity(batch.writes.len());
        for (key, doc) in &batch.writes {
            let bytes = doc.as_ref().map(Self::encode).transpose()?;
            encoded.push((*key, bytes));
        }

        let mut docs = self.docs.write().map_err(|_| StoreError::Poisoned)?;
        for (key, expected) in &batch.expected {
            let current = docs.get(key).map(|e| e.version);
            if current != *expected {
                return Err(StoreError::Conflict);
            }
        }

        for (key, bytes) in encoded {
            match bytes {
                Some(bytes) => {
                    let version = self.next_version.fetch_add(1, Ordering::SeqCst);
                    self.bump_id_floor(&key);
                    docs.insert(key, StoredEntry { version, bytes });
                }
                None => {
                    docs.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

/// Bounded retry with exponential backoff for conflicting commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts before giving up (at least 1).
    pub max_attempts: u32,
    /// Backoff before the second attempt, doubled for every further one.
    pub base_backoff_ms: u64,
    /// Upper bound on a single backoff.
    pub max_backoff_ms: u64,
}

impl RetryPolicy {
    /// Retry immediately, without sleeping. Used by tests.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Backoff to wait after `failed_attempts` failures.
    #[must_use]
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let shift = failed_attempts.saturating_sub(1).min(16);
        let ms = self
            .base_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 200,
        }
    }
}

/// One optimistic transaction.
///
/// Reads go through a local view so a document written earlier in the same
/// transaction is read back as written.
pub struct Transaction<'a> {
    backend: &'a dyn DocumentStore,
    reads: BTreeMap<DocKey, Option<u64>>,
    view: BTreeMap<DocKey, Option<Document>>,
    writes: BTreeMap<DocKey, Option<Document>>,
}

impl<'a> Transaction<'a> {
    fn new(backend: &'a dyn DocumentStore) -> Self {
        Self {
            backend,
            reads: BTreeMap::new(),
            view: BTreeMap::new(),
            writes: BTreeMap::new(),
        }
    }

    /// Read a document, recording its version for the commit check.
    pub fn load(&mut self, key: DocKey) -> Result<Option<Document>> {
        if let Some(staged) = self.writes.get(&key) {
            return Ok(staged.clone());
        }
        if let Some(seen) = self.view.get(&key) {
            return Ok(seen.clone());
        }
        let fetched = self.backend.get(&key)?;
        self.reads.insert(key, fetched.as_ref().map(|v| v.version));
        let doc = fetched.map(|v| v.document);
        self.view.insert(key, doc.clone());
        Ok(doc)
    }

    /// Stage a write.
    pub fn put(&mut self, doc: Document) {
        self.writes.insert(doc.key(), Some(doc));
    }

    /// Stage a document under a key that must not exist at commit.
    pub fn insert_new(&mut self, doc: Document) {
        let key = doc.key();
        self.reads.entry(key).or_insert(None);
        self.writes.insert(key, Some(doc));
    }

    /// Stage a delete.
    pub fn delete(&mut self, key: DocKey) {
        self.writes.insert(key, None);
    }

    /// Allocate a fresh id from the backend.
    pub fn allocate_id(&self) -> u64 {
        self.backend.allocate_id()
    }

    /// Read a city.
    pub fn city(&mut self, id: CityId) -> Result<Option<CityState>> {
        match self.load(DocKey::City(id))? {
            None => Ok(None),
            Some(Document::City(city)) => Ok(Some(city)),
            Some(_) => Err(mismatch(DocKey::City(id))),
        }
    }

    /// Read a city that must exist.
    pub fn require_city(&mut self, id: CityId) -> Result<CityState> {
        self.city(id)?.ok_or(GameError::CityNotFound(id))
    }

    /// Stage a city write.
    pub fn put_city(&mut self, city: CityState) {
        self.put(Document::City(city));
    }

    /// Read a village.
    pub fn village(&mut self, id: VillageId) -> Result<Option<VillageState>> {
        match self.load(DocKey::Village(id))? {
            None => Ok(None),
            Some(Document::Village(village)) => Ok(Some(village)),
            Some(_) => Err(mismatch(DocKey::Village(id))),
        }
    }

    /// Stage a village write.
    pub fn put_village(&mut self, village: VillageState) {
        self.put(Document::Village(village));
    }

    /// Read a movement.
    pub fn movement(&mut self, id: MovementId) -> Result<Option<Movement>> {
        match self.load(DocKey::Movement(id))? {
            None => Ok(None),
            Some(Document::Movement(movement)) => Ok(Some(movement)),
            Some(_) => Err(mismatch(DocKey::Movement(id))),
        }
    }

    /// Stage a brand-new report.
    pub fn insert_report(&mut self, report: Report) {
        self.insert_new(Document::Report(report));
    }

    fn into_batch(self) -> WriteBatch {
        WriteBatch {
            expected: self.reads.into_iter().collect(),
            writes: self.writes.into_iter().collect(),
        }
    }
}

fn mismatch(key: DocKey) -> GameError {
    GameError::Store(StoreError::Codec(format!(
        "document at {key} has unexpected type"
    )))
}

/// Transactional facade over a [`DocumentStore`]. Cheap to clone.
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
}

impl fmt::Debug for StateStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl StateStore {
    /// Wrap a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn DocumentStore>, retry: RetryPolicy) -> Self {
        Self { backend, retry }
    }

    /// Fresh in-memory store with the default retry policy.
    #[must_use]
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), RetryPolicy::default())
    }

    /// Retry policy in use.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run `body` inside an optimistic transaction.
    ///
    /// The body may run several times; it must derive every mutation from
    /// what it reads through the transaction. Retryable failures are retried
    /// up to the policy's attempt limit, then surface as
    /// [`GameError::TransientFailure`]. Any other error aborts immediately
    /// without writing anything.
    pub fn transact<T, F>(&self, label: &str, mut body: F) -> Result<T>
    where
        F: FnMut(&mut Transaction<'_>) -> Result<T>,
    {
        let attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=attempts {
            let mut tx = Transaction::new(self.backend.as_ref());
            let outcome = match body(&mut tx) {
                Ok(value) => {
                    let batch = tx.into_batch();
                    if batch.is_empty() {
                        return Ok(value);
                    }
                    self.backend
                        .commit(batch)
                        .map(|()| value)
                        .map_err(GameError::from)
                }
                Err(err) => Err(err),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() => {
                    tracing::trace!(label, attempt, "transaction conflict, retrying");
                    if attempt < attempts {
                        let wait = self.retry.backoff(attempt);
                        if !wait.is_zero() {
                            std::thread::sleep(wait);
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }

        tracing::debug!(label, attempts, "transaction retries exhausted");
        Err(GameError::TransientFailure { attempts })
    }

    /// Read one document outside any transaction.
    pub fn get(&self, key: DocKey) -> Result<Option<Document>> {
        Ok(self.backend.get(&key)?.map(|v| v.document))
    }

    /// Read a city outside any transaction.
    pub fn city(&self, id: CityId) -> Result<Option<CityState>> {
        self.transact("read city", |tx| tx.city(id))
    }

    /// Read a village outside any transaction.
    pub fn village(&self, id: VillageId) -> Result<Option<VillageState>> {
        self.transact("read village", |tx| tx.village(id))
    }

    /// Read a movement outside any transaction.
    pub fn movement(&self, id: MovementId) -> Result<Option<Movement>> {
        self.transact("read movement", |tx| tx.movement(id))
    }

    /// Read a report outside any transaction.
    pub fn report(&self, id: ReportId) -> Result<Option<Report>> {
        match self.get(DocKey::Report(id))? {
            None => Ok(None),
            Some(Document::Report(report)) => Ok(Some(report)),
            Some(_) => Err(mismatch(DocKey::Report(id))),
        }
    }

    /// List every key of a collection.
    pub fn keys(&self, kind: DocKind) -> Result<Vec<DocKey>> {
        Ok(self.backend.keys(kind)?)
    }

    /// Create a document that must not exist yet.
    pub fn create(&self, doc: Document) -> Result<()> {
        let key = doc.key();
        self.transact("create", |tx| {
            if tx.load(key)?.is_some() {
                return Err(StoreError::AlreadyExists(key.to_string()).into());
            }
            tx.put(doc.clone());
            Ok(())
        })
    }

    /// Create a city document.
    pub fn create_city(&self, city: CityState) -> Result<()> {
        self.create(Document::City(city))
    }

    /// Create a village document.
    pub fn create_village(&self, village: VillageState) -> Result<()> {
        self.create(Document::Village(village))
    }

    /// Delete a document. Deleting an absent key is a no-op.
    pub fn delete(&self, key: DocKey) -> Result<()> {
        self.transact("delete", |tx| {
            if tx.load(key)?.is_some() {
                tx.delete(key);
            }
            Ok(())
        })
    }

    /// Read-modify-write a single document atomically.
    ///
    /// `update` receives the current document (or `None`) and returns the
    /// replacement (`None` deletes).
    pub fn atomic_update<F>(&self, key: DocKey, mut update: F) -> Result<Option<Document>>
    where
        F: FnMut(Option<Document>) -> Result<Option<Document>>,
    {
        self.transact("atomic update", |tx| {
            let current = tx.load(key)?;
            let next = update(current)?;
            match &next {
                Some(doc) if doc.key() == key => tx.put(doc.clone()),
                Some(doc) => {
                    return Err(GameError::InvalidCommand(format!(
                        "update for {key} returned document for {}",
                        doc.key()
                    )))
                }
                None => tx.delete(key),
            }
            Ok(next)
        })
    }

    /// Allocate a fresh numeric id.
    pub fn allocate_id(&self) -> u64 {
        self.backend.allocate_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::PlayerId;
    use crate::math::MapPosition;
    use std::sync::atomic::AtomicU32;

    fn city(id: u64) -> CityState {
        CityState::new(CityId(id), PlayerId(1), MapPosition::new(0, 0))
    }

    /// Fails the first `failures` commits with a conflict.
    struct FlakyStore {
        inner: MemoryStore,
        failures: AtomicU32,
        commits: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryStore::new(),
                failures: AtomicU32::new(failures),
                commits: AtomicU32::new(0),
            }
        }
    }

    impl DocumentStore for FlakyStore {
        fn get(&self, key: &DocKey) -> std::result::Result<Option<Versioned>, StoreError> {
            self.inner.get(key)
        }

        fn keys(&self, kind: DocKind) -> std::result::Result<Vec<DocKey>, StoreError> {
            self.inner.keys(kind)
        }

        fn commit(&self, batch: WriteBatch) -> std::result::Result<(), StoreError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(StoreError::Conflict);
            }
            self.inner.commit(batch)
        }

        fn allocate_id(&self) -> u64 {
            self.inner.allocate_id()
        }
    }

    #[test]
    fn test_create_and_read_back() {
        let store = StateStore::memory();
        store.create_city(city(1)).unwrap();
        assert_eq!(store.city(CityId(1)).unwrap(), Some(city(1)));
        assert_eq!(store.city(CityId(2)).unwrap(), None);
    }

    #[test]
    fn test_create_rejects_existing() {
        let store = StateStore::memory();
        store.create_city(city(1)).unwrap();
        let err = store.create_city(city(1)).unwrap_err();
        assert!(matches!(err, GameError::Store(StoreError::AlreadyExists(_))));
    }

    #[test]
    fn test_commit_detects_stale_read() {
        let backend = MemoryStore::new();
        backend
            .commit(WriteBatch {
                expected: vec![],
                writes: vec![(DocKey::City(CityId(1)), Some(Document::City(city(1))))],
            })
            .unwrap();
        let seen = backend.get(&DocKey::City(CityId(1))).unwrap().unwrap();

        let mut renamed = city(1);
        renamed.name = "first".into();
        backend
            .commit(WriteBatch {
                expected: vec![(DocKey::City(CityId(1)), Some(seen.version))],
                writes: vec![(DocKey::City(CityId(1)), Some(Document::City(renamed)))],
            })
            .unwrap();

        // Second writer still holds the old version
        let result = backend.commit(WriteBatch {
            expected: vec![(DocKey::City(CityId(1)), Some(seen.version))],
            writes: vec![(DocKey::City(CityId(1)), None)],
        });
        assert_eq!(result, Err(StoreError::Conflict));
        assert!(backend.get(&DocKey::City(CityId(1))).unwrap().is_some());
    }

    #[test]
    fn test_failed_body_writes_nothing() {
        let store = StateStore::memory();
        store.create_city(city(1)).unwrap();

        let result: Result<()> = store.transact("failing", |tx| {
            let mut c = tx.require_city(CityId(1))?;
            c.name = "changed".into();
            tx.put_city(c);
            Err(GameError::InvalidCommand("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(store.city(CityId(1)).unwrap().unwrap().name, "");
    }

    #[test]
    fn test_transaction_reads_own_writes() {
        let store = StateStore::memory();
        store.create_city(city(1)).unwrap();
        store
            .transact("own writes", |tx| {
                let mut c = tx.require_city(CityId(1))?;
                c.name = "staged".into();
                tx.put_city(c);
                assert_eq!(tx.require_city(CityId(1))?.name, "staged");
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_conflicts_are_retried() {
        let backend = Arc::new(FlakyStore::new(2));
        let store = StateStore::new(backend.clone(), RetryPolicy::immediate(5));
        store.create_city(city(1)).unwrap();
        assert_eq!(backend.commits.load(Ordering::SeqCst), 3);
        assert!(store.city(CityId(1)).unwrap().is_some());
    }

    #[test]
    fn test_exhausted_retries_surface_transient_failure() {
        let backend = Arc::new(FlakyStore::new(10));
        let store = StateStore::new(backend.clone(), RetryPolicy::immediate(3));
        let err = store.create_city(city(1)).unwrap_err();
        assert!(matches!(err, GameError::TransientFailure { attempts: 3 }));
        assert_eq!(backend.commits.load(Ordering::SeqCst), 3);
        assert!(store.city(CityId(1)).unwrap().is_none());
    }

    #[test]
    fn test_validation_errors_are_not_retried() {
        let store = StateStore::memory();
        let calls = AtomicU32::new(0);
        let err = store
            .transact("validation", |_| -> Result<()> {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GameError::InvalidCommand("bad".into()))
            })
            .unwrap_err();
        assert!(matches!(err, GameError::InvalidCommand(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_atomic_update_and_delete() {
        let store = StateStore::memory();
        store.create_city(city(1)).unwrap();

        store
            .atomic_update(DocKey::City(CityId(1)), |doc| match doc {
                Some(Document::City(mut c)) => {
                    c.name = "Sparta".into();
                    Ok(Some(Document::City(c)))
                }
                _ => Err(GameError::CityNotFound(CityId(1))),
            })
            .unwrap();
        assert_eq!(store.city(CityId(1)).unwrap().unwrap().name, "Sparta");

        store.delete(DocKey::City(CityId(1))).unwrap();
        assert!(store.city(CityId(1)).unwrap().is_none());
        // Deleting again is a no-op
        store.delete(DocKey::City(CityId(1))).unwrap();
    }

    #[test]
    fn test_keys_by_kind_and_id_allocation() {
        let backend = Arc::new(MemoryStore::new());
        let store = StateStore::new(backend.clone(), RetryPolicy::default());
        store.create_city(city(41)).unwrap();
        store
            .create_village(VillageState::new(VillageId(3), MapPosition::new(1, 1)))
            .unwrap();

        assert_eq!(
            store.keys(DocKind::City).unwrap(),
            vec![DocKey::City(CityId(41))]
        );
        assert_eq!(backend.len(), 2);
        // Allocated ids never collide with seeded ones
        assert!(store.allocate_id() > 41);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_backoff_ms: 10,
            max_backoff_ms: 35,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(10));
        assert_eq!(policy.backoff(2), Duration::from_millis(20));
        assert_eq!(policy.backoff(3), Duration::from_millis(35));
    }
}
