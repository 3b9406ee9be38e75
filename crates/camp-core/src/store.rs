//! File-backed record store.
//!
//! Every clinic (tenant) owns one directory. Records are YAML documents in UUID-sharded
//! collection directories:
//!
//! ```text
//! clinics/<s1>/<s2>/<clinic_id>/
//!   clinic.yaml
//!   patients/<s1>/<s2>/<patient_id>/record.yaml
//!   appointments/...
//! ```
//!
//! ## Writes
//!
//! All writes go through a [`Transaction`]. Opening a transaction takes the tenant's write lock
//! and holds it until the transaction is committed or dropped, so reads performed after
//! `transaction()` observe a state no other writer can change underneath them. Writes are staged
//! in memory and applied together by [`Transaction::commit`]; if any write fails the previous
//! file contents are restored and newly created files and directories are removed. Dropping an
//! uncommitted transaction discards its staged writes.
//!
//! Platform-wide invariants (clinic slug uniqueness) are guarded by a separate platform lock.

use crate::config::CoreConfig;
use crate::constants::RECORD_FILE_NAME;
use crate::{CoreError, CoreResult};
use camp_uuid::ShardableUuid;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A document stored in a tenant collection.
pub trait Record: Serialize + DeserializeOwned {
    /// Collection directory name under the tenant root.
    const COLLECTION: &'static str;

    fn id(&self) -> &ShardableUuid;
}

/// Entry point to on-disk storage. Cheap to clone; clones share locks.
#[derive(Clone, Debug)]
pub struct Storage {
    cfg: Arc<CoreConfig>,
    tenant_locks: Arc<Mutex<HashMap<ShardableUuid, Arc<Mutex<()>>>>>,
    platform_lock: Arc<Mutex<()>>,
}

impl Storage {
    pub fn new(cfg: Arc<CoreConfig>) -> Self {
        Self {
            cfg,
            tenant_locks: Arc::new(Mutex::new(HashMap::new())),
            platform_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn cfg(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn clinic_dir(&self, clinic_id: &ShardableUuid) -> PathBuf {
        clinic_id.sharded_dir(&self.cfg.clinics_dir())
    }

    /// Record store scoped to one clinic.
    pub fn tenant(&self, clinic_id: &ShardableUuid) -> RecordStore {
        let lock = {
            let mut locks = self
                .tenant_locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            locks
                .entry(clinic_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        RecordStore {
            root: self.clinic_dir(clinic_id),
            lock,
        }
    }

    /// Serialises operations that must see every clinic at once.
    pub(crate) fn platform_lock(&self) -> MutexGuard<'_, ()> {
        self.platform_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reads and writes records beneath one clinic directory.
#[derive(Clone, Debug)]
pub struct RecordStore {
    root: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl RecordStore {
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Takes the tenant write lock without staging any record writes.
    ///
    /// Used by writers whose persistence is not a record file (clinical Git commits, uploads).
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens a transaction, blocking until the tenant write lock is free.
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction {
            root: &self.root,
            _guard: self.lock(),
            staged: Vec::new(),
        }
    }

    /// Reads a document at `relative_path` under the tenant root.
    pub fn read_document<T: DeserializeOwned>(&self, relative_path: &Path) -> CoreResult<Option<T>> {
        read_yaml(&self.root.join(relative_path))
    }

    pub fn get<R: Record>(&self, id: &ShardableUuid) -> CoreResult<Option<R>> {
        read_yaml(&record_path::<R>(&self.root, id))
    }

    /// Like [`get`](Self::get) but a missing record is [`CoreError::NotFound`] naming `what`.
    pub fn load<R: Record>(&self, id: &ShardableUuid, what: &str) -> CoreResult<R> {
        self.get(id)?.ok_or_else(|| CoreError::not_found(what))
    }

    /// Lists every record of a collection.
    ///
    /// Records that cannot be read or parsed are logged and skipped.
    pub fn list<R: Record>(&self) -> CoreResult<Vec<R>> {
        let base = self.root.join(R::COLLECTION);
        Ok(scan_sharded(&base, RECORD_FILE_NAME)
            .into_iter()
            .filter_map(|path| match read_yaml::<R>(&path) {
                Ok(Some(record)) => Some(record),
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!("skipping unreadable record {}: {}", path.display(), e);
                    None
                }
            })
            .collect())
    }
}

/// Staged writes under a held tenant lock.
pub struct Transaction<'a> {
    root: &'a Path,
    _guard: MutexGuard<'a, ()>,
    /// `None` content stages a removal.
    staged: Vec<(PathBuf, Option<String>)>,
}

impl Transaction<'_> {
    /// Stages a record write, replacing any earlier staged write of the same record.
    pub fn put<R: Record>(&mut self, record: &R) -> CoreResult<()> {
        let path = record_path::<R>(self.root, record.id());
        self.stage(path, record)
    }

    /// Stages a document write at `relative_path` under the tenant root.
    pub fn put_document<T: Serialize>(&mut self, relative_path: &Path, document: &T) -> CoreResult<()> {
        let path = self.root.join(relative_path);
        self.stage(path, document)
    }

    /// Stages removal of a record.
    pub fn delete<R: Record>(&mut self, id: &ShardableUuid) {
        let path = record_path::<R>(self.root, id);
        self.stage_raw(path, None);
    }

    fn stage<T: Serialize>(&mut self, path: PathBuf, value: &T) -> CoreResult<()> {
        let content = serde_yaml::to_string(value).map_err(CoreError::YamlSerialization)?;
        self.stage_raw(path, Some(content));
        Ok(())
    }

    fn stage_raw(&mut self, path: PathBuf, content: Option<String>) {
        match self.staged.iter_mut().find(|(p, _)| *p == path) {
            Some(entry) => entry.1 = content,
            None => self.staged.push((path, content)),
        }
    }

    /// Number of staged writes.
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Discards staged writes and releases the lock.
    pub fn rollback(self) {
        tracing::debug!(discarded = self.staged.len(), "transaction rolled back");
    }

    /// Applies every staged write, or none of them.
    ///
    /// # Errors
    ///
    /// Returns the first write error after restoring the previous state. If restoring also
    /// fails, [`CoreError::RollbackFailed`] carries both errors.
    pub fn commit(self) -> CoreResult<()> {
        let mut created_dirs: Vec<PathBuf> = Vec::new();
        let mut written: Vec<(PathBuf, Option<String>)> = Vec::new();

        let result: CoreResult<()> = (|| {
            for (path, content) in &self.staged {
                let Some(content) = content else {
                    match fs::read_to_string(path) {
                        Ok(old) => {
                            fs::remove_file(path).map_err(CoreError::FileWrite)?;
                            written.push((path.clone(), Some(old)));
                        }
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(CoreError::FileRead(e)),
                    }
                    continue;
                };

                if let Some(parent) = path.parent() {
                    let mut missing = Vec::new();
                    let mut current = parent;
                    while !current.exists() {
                        missing.push(current.to_path_buf());
                        match current.parent() {
                            Some(p) => current = p,
                            None => break,
                        }
                    }
                    // Shallowest first.
                    for dir in missing.into_iter().rev() {
                        match fs::create_dir(&dir) {
                            Ok(()) => created_dirs.push(dir),
                            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                            Err(e) => return Err(CoreError::StorageDirCreation(e)),
                        }
                    }
                }

                let old_content = match fs::read_to_string(path) {
                    Ok(s) => Some(s),
                    Err(e) if e.kind() == ErrorKind::NotFound => None,
                    Err(e) => return Err(CoreError::FileRead(e)),
                };

                fs::write(path, content).map_err(CoreError::FileWrite)?;
                written.push((path.clone(), old_content));
            }
            Ok(())
        })();

        let commit_error = match result {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        tracing::warn!("transaction commit failed, rolling back: {}", commit_error);

        for (path, old_content) in written.iter().rev() {
            let restored = match old_content {
                Some(contents) => fs::write(path, contents),
                None => fs::remove_file(path),
            };
            if let Err(rollback_error) = restored {
                return Err(CoreError::RollbackFailed {
                    path: path.clone(),
                    commit_error: Box::new(commit_error),
                    rollback_error,
                });
            }
        }

        for dir in created_dirs.iter().rev() {
            let _ = fs::remove_dir(dir);
        }

        Err(commit_error)
    }
}

fn record_path<R: Record>(root: &Path, id: &ShardableUuid) -> PathBuf {
    id.sharded_dir(&root.join(R::COLLECTION))
        .join(RECORD_FILE_NAME)
}

pub(crate) fn read_yaml<T: DeserializeOwned>(path: &Path) -> CoreResult<Option<T>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CoreError::FileRead(e)),
    };
    serde_yaml::from_str(&raw)
        .map(Some)
        .map_err(CoreError::YamlDeserialization)
}

/// Finds `<base>/<s1>/<s2>/<id>/<file_name>` for every canonical id directory.
pub(crate) fn scan_sharded(base: &Path, file_name: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();

    let s1_iter = match fs::read_dir(base) {
        Ok(it) => it,
        Err(_) => return found,
    };
    for s1 in s1_iter.flatten() {
        let s1_path = s1.path();
        if !s1_path.is_dir() {
            continue;
        }

        let s2_iter = match fs::read_dir(&s1_path) {
            Ok(it) => it,
            Err(_) => continue,
        };
        for s2 in s2_iter.flatten() {
            let s2_path = s2.path();
            if !s2_path.is_dir() {
                continue;
            }

            let id_iter = match fs::read_dir(&s2_path) {
                Ok(it) => it,
                Err(_) => continue,
            };
            for id_ent in id_iter.flatten() {
                let id_path = id_ent.path();
                let canonical = id_path
                    .file_name()
                    .and_then(|os| os.to_str())
                    .is_some_and(ShardableUuid::is_canonical);
                if !canonical {
                    continue;
                }

                let file = id_path.join(file_name);
                if file.is_file() {
                    found.push(file);
                }
            }
        }
    }

    found
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::NotificationSettings;
    use serde::Deserialize;
    use tempfile::TempDir;

    pub(crate) const TEST_SECRET: &str = "test-secret-test-secret-test-secret";

    pub(crate) fn test_storage(temp: &TempDir) -> Storage {
        let cfg = CoreConfig::new(
            temp.path().to_path_buf(),
            TEST_SECRET,
            12,
            4,
            1024 * 1024,
            NotificationSettings::default(),
        )
        .expect("valid test config");
        Storage::new(Arc::new(cfg))
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: ShardableUuid,
        text: String,
    }

    impl Record for Note {
        const COLLECTION: &'static str = "notes";

        fn id(&self) -> &ShardableUuid {
            &self.id
        }
    }

    fn note(text: &str) -> Note {
        Note {
            id: ShardableUuid::new(),
            text: text.into(),
        }
    }

    #[test]
    fn committed_records_can_be_read_back() {
        let temp = TempDir::new().unwrap();
        let store = test_storage(&temp).tenant(&ShardableUuid::new());
        let first = note("first");
        let second = note("second");

        let mut tx = store.transaction();
        tx.put(&first).unwrap();
        tx.put(&second).unwrap();
        assert_eq!(tx.len(), 2);
        tx.commit().unwrap();

        assert_eq!(store.get::<Note>(&first.id).unwrap(), Some(first.clone()));
        let mut all = store.list::<Note>().unwrap();
        all.sort_by(|a, b| a.text.cmp(&b.text));
        assert_eq!(all, vec![first, second]);
    }

    #[test]
    fn dropped_transaction_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let store = test_storage(&temp).tenant(&ShardableUuid::new());
        let n = note("never");

        let mut tx = store.transaction();
        tx.put(&n).unwrap();
        tx.rollback();

        assert_eq!(store.get::<Note>(&n.id).unwrap(), None);
        assert!(!store.root().exists());
    }

    #[test]
    fn failed_commit_restores_previous_state() {
        let temp = TempDir::new().unwrap();
        let store = test_storage(&temp).tenant(&ShardableUuid::new());
        let mut existing = note("original");

        let mut tx = store.transaction();
        tx.put(&existing).unwrap();
        tx.commit().unwrap();

        // A directory where the second document should go makes its write fail.
        let blocked = Path::new("blocked.yaml");
        fs::create_dir_all(store.root().join(blocked)).unwrap();

        existing.text = "changed".into();
        let fresh = note("fresh");
        let mut tx = store.transaction();
        tx.put(&existing).unwrap();
        tx.put(&fresh).unwrap();
        tx.put_document(blocked, &"x").unwrap();
        assert!(tx.commit().is_err());

        let reread = store.get::<Note>(&existing.id).unwrap().unwrap();
        assert_eq!(reread.text, "original");
        assert_eq!(store.get::<Note>(&fresh.id).unwrap(), None);
        assert!(!fresh.id.sharded_dir(&store.root().join("notes")).exists());
    }

    #[test]
    fn delete_removes_record_and_failed_commit_restores_it() {
        let temp = TempDir::new().unwrap();
        let store = test_storage(&temp).tenant(&ShardableUuid::new());
        let n = note("doomed");
        let mut tx = store.transaction();
        tx.put(&n).unwrap();
        tx.commit().unwrap();

        let blocked = Path::new("blocked.yaml");
        fs::create_dir_all(store.root().join(blocked)).unwrap();
        let mut tx = store.transaction();
        tx.delete::<Note>(&n.id);
        tx.put_document(blocked, &"x").unwrap();
        assert!(tx.commit().is_err());
        assert_eq!(store.get::<Note>(&n.id).unwrap(), Some(n.clone()));

        let mut tx = store.transaction();
        tx.delete::<Note>(&n.id);
        tx.commit().unwrap();
        assert_eq!(store.get::<Note>(&n.id).unwrap(), None);
        assert!(store.list::<Note>().unwrap().is_empty());
    }

    #[test]
    fn list_skips_unparsable_records() {
        let temp = TempDir::new().unwrap();
        let store = test_storage(&temp).tenant(&ShardableUuid::new());
        let good = note("good");
        let mut tx = store.transaction();
        tx.put(&good).unwrap();
        tx.commit().unwrap();

        let bad_dir = ShardableUuid::new().sharded_dir(&store.root().join("notes"));
        fs::create_dir_all(&bad_dir).unwrap();
        fs::write(bad_dir.join(RECORD_FILE_NAME), "not: [valid").unwrap();

        assert_eq!(store.list::<Note>().unwrap(), vec![good]);
    }

    #[test]
    fn tenants_share_locks_by_clinic() {
        let temp = TempDir::new().unwrap();
        let storage = test_storage(&temp);
        let clinic = ShardableUuid::new();

        let a = storage.tenant(&clinic);
        let b = storage.tenant(&clinic);
        assert!(Arc::ptr_eq(&a.lock, &b.lock));
        assert!(!Arc::ptr_eq(&a.lock, &storage.tenant(&ShardableUuid::new()).lock));
    }
}
