//! Key lifecycle management: generation, activation, rotation and cleanup
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::backend::{MemoryKeyStore, StoreBackend};
use crate::error::{KeyError, KeyResult};
use crate::key_store::KeyStore;
use crate::key_types::{derive_key_id, KeyId, KeyMetadata, SigningAlgorithm};
use crate::local_store::LocalKeyStore;
use crate::secret::{generate_secret, validate_secret, MIN_SECRET_LENGTH};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Result of [`KeyManager::cleanup`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// Number of keys removed
    Removed(usize),
    /// Keys that would be removed (dry run)
    Preview(Vec<KeyId>),
}

/// Snapshot of the rotation state
#[derive(Debug, Clone, PartialEq)]
pub struct KeyStatus {
    pub active_key_id: Option<KeyId>,
    pub active_key_age: Option<Duration>,
    pub total_keys: usize,
    pub inactive_keys: usize,
    /// Rotation count of the active key
    pub rotation_count: u32,
    pub last_used: Option<DateTime<Utc>>,
}

impl KeyStatus {
    pub fn active_key_age_hours(&self) -> Option<f64> {
        self.active_key_age
            .map(|age| age.num_seconds() as f64 / 3600.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationUrgency {
    Low,
    Medium,
    High,
}

/// Recommended next step for the active key
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RotationPlan {
    /// No active key yet
    Initialize,
    Rotate {
        age_days: f64,
        urgency: RotationUrgency,
    },
    Wait {
        days_until_rotation: f64,
        urgency: RotationUrgency,
    },
}

impl RotationPlan {
    pub fn message(&self) -> String {
        match self {
            RotationPlan::Initialize => {
                "No active key found. Initialize key management first.".to_string()
            }
            RotationPlan::Rotate { age_days, .. } => {
                format!("Key is {:.1} days old. Rotation recommended.", age_days)
            }
            RotationPlan::Wait {
                days_until_rotation,
                ..
            } => format!("Key rotation scheduled in {:.1} days", days_until_rotation),
        }
    }
}

/// Manages signing key metadata over a [`KeyStore`].
///
/// At most one key is active at a time, and once any key has been activated
/// exactly one is. Every mutation computes the complete next key map and
/// persists it in a single write; if the write fails nothing changes in
/// memory.
///
/// Mutating methods take `&mut self`: callers sharing a manager across
/// threads serialize writers through [`crate::SharedKeyManager`].
#[derive(Debug)]
pub struct KeyManager {
    store: KeyStore,
}

impl KeyManager {
    pub fn new(mut store: KeyStore) -> Self {
        if let Some(keys) = single_active(store.keys()) {
            store.set_unpersisted(keys);
        }
        Self { store }
    }

    /// Manager over the JSON document at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        Self::with_backend(Box::new(LocalKeyStore::new(path)))
    }

    /// Manager that never touches the filesystem
    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(MemoryKeyStore::new()))
    }

    pub fn with_backend(backend: Box<dyn StoreBackend>) -> Self {
        Self::new(KeyStore::open(backend))
    }

    /// Generate a new, inactive key.
    ///
    /// Returns the secret together with its key id. The secret itself is not
    /// stored; the caller is responsible for keeping it.
    pub fn generate(
        &mut self,
        algorithm: SigningAlgorithm,
        length: usize,
    ) -> KeyResult<(String, KeyId)> {
        let (secret, metadata) = new_key(algorithm, length)?;
        let key_id = metadata.key_id.clone();

        let mut next = self.store.keys().clone();
        next.insert(key_id.clone(), metadata);
        self.store.replace(next)?;

        info!(key_id = %key_id, algorithm = %algorithm, "Generated new key");
        Ok((secret, key_id))
    }

    /// Register an existing secret's metadata as an inactive key.
    ///
    /// Re-importing a known secret leaves its metadata untouched.
    pub fn import(&mut self, secret: &str, algorithm: SigningAlgorithm) -> KeyResult<KeyId> {
        validate_secret(secret, MIN_SECRET_LENGTH)?;
        let key_id = derive_key_id(secret);
        if self.store.contains(&key_id) {
            debug!(key_id = %key_id, "Key already registered");
            return Ok(key_id);
        }

        let metadata = KeyMetadata::new(key_id.clone(), algorithm, secret.chars().count());
        let mut next = self.store.keys().clone();
        next.insert(key_id.clone(), metadata);
        self.store.replace(next)?;

        info!(key_id = %key_id, algorithm = %algorithm, "Imported key");
        Ok(key_id)
    }

    /// Make `key_id` the only active key
    pub fn activate(&mut self, key_id: &str) -> KeyResult<()> {
        if !self.store.contains(key_id) {
            return Err(KeyError::NotFound(key_id.to_string()));
        }

        let mut next = self.store.keys().clone();
        assign_active(&mut next, key_id, Utc::now());
        self.store.replace(next)?;

        info!(key_id = %key_id, "Activated key");
        Ok(())
    }

    pub fn active_key_id(&self) -> Option<&str> {
        self.store
            .keys()
            .values()
            .find(|m| m.is_active)
            .map(|m| m.key_id.as_str())
    }

    pub fn key_metadata(&self, key_id: &str) -> Option<&KeyMetadata> {
        self.store.get(key_id)
    }

    pub fn contains_key(&self, key_id: &str) -> bool {
        self.store.contains(key_id)
    }

    /// All keys, or only the active one
    pub fn list_keys(&self, include_inactive: bool) -> Vec<&KeyMetadata> {
        self.store
            .keys()
            .values()
            .filter(|m| include_inactive || m.is_active)
            .collect()
    }

    /// Generate a new key and make it active.
    ///
    /// The previously active key gets its rotation count bumped and stays in
    /// the store so tokens it signed keep verifying until it is cleaned up.
    pub fn rotate(
        &mut self,
        algorithm: SigningAlgorithm,
        length: usize,
    ) -> KeyResult<(String, KeyId)> {
        let (secret, metadata) = new_key(algorithm, length)?;
        let new_key_id = metadata.key_id.clone();
        if self.store.contains(&new_key_id) {
            return Err(KeyError::Rotation(format!(
                "generated key {} already exists",
                new_key_id
            )));
        }

        let previous = self.active_key_id().map(str::to_string);

        let mut next = self.store.keys().clone();
        if let Some(previous_id) = &previous {
            if let Some(old) = next.get_mut(previous_id) {
                old.rotation_count += 1;
            }
        }
        next.insert(new_key_id.clone(), metadata);
        assign_active(&mut next, &new_key_id, Utc::now());
        self.store.replace(next)?;

        info!(
            new_key_id = %new_key_id,
            previous_key_id = previous.as_deref().unwrap_or("none"),
            "Rotated signing key"
        );
        Ok((secret, new_key_id))
    }

    /// Remove inactive keys created more than `max_age_days` ago.
    ///
    /// The active key is never a candidate. With `dry_run` the candidates are
    /// returned and nothing is removed. An age reaching past the earliest
    /// representable date selects no keys.
    pub fn cleanup(&mut self, max_age_days: u32, dry_run: bool) -> KeyResult<CleanupOutcome> {
        let cutoff = Duration::try_days(i64::from(max_age_days))
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let candidates: Vec<KeyId> = self
            .store
            .keys()
            .values()
            .filter(|m| !m.is_active && m.created_at < cutoff)
            .map(|m| m.key_id.clone())
            .collect();

        if dry_run {
            debug!(candidates = candidates.len(), "Cleanup dry run");
            return Ok(CleanupOutcome::Preview(candidates));
        }

        if candidates.is_empty() {
            return Ok(CleanupOutcome::Removed(0));
        }

        let mut next = self.store.keys().clone();
        for key_id in &candidates {
            next.remove(key_id);
        }
        self.store.replace(next)?;

        info!(removed = candidates.len(), max_age_days, "Cleaned up old keys");
        Ok(CleanupOutcome::Removed(candidates.len()))
    }

    pub fn status(&self) -> KeyStatus {
        let now = Utc::now();
        let keys = self.store.keys();
        let active = keys.values().find(|m| m.is_active);

        KeyStatus {
            active_key_id: active.map(|m| m.key_id.clone()),
            active_key_age: active.map(|m| m.age(now)),
            total_keys: keys.len(),
            inactive_keys: keys.values().filter(|m| !m.is_active).count(),
            rotation_count: active.map(|m| m.rotation_count).unwrap_or(0),
            last_used: active.and_then(|m| m.last_used),
        }
    }

    /// Recommend whether the active key should be rotated given a rotation interval
    pub fn rotation_plan(&self, rotation_interval_days: u32) -> RotationPlan {
        let status = self.status();
        let Some(age) = status.active_key_age else {
            return RotationPlan::Initialize;
        };

        let interval = f64::from(rotation_interval_days);
        let age_days = age.num_seconds() as f64 / 86_400.0;
        if age_days >= interval {
            let urgency = if age_days > interval * 1.5 {
                RotationUrgency::High
            } else {
                RotationUrgency::Medium
            };
            RotationPlan::Rotate { age_days, urgency }
        } else {
            RotationPlan::Wait {
                days_until_rotation: interval - age_days,
                urgency: RotationUrgency::Low,
            }
        }
    }

    pub fn location(&self) -> String {
        self.store.location()
    }
}

fn new_key(algorithm: SigningAlgorithm, length: usize) -> KeyResult<(String, KeyMetadata)> {
    let secret = generate_secret(length)?;
    validate_secret(&secret, MIN_SECRET_LENGTH)?;
    let metadata = KeyMetadata::new(derive_key_id(&secret), algorithm, secret.chars().count());
    Ok((secret, metadata))
}

/// Mark `key_id` active and every other key inactive in one pass
fn assign_active(keys: &mut BTreeMap<KeyId, KeyMetadata>, key_id: &str, now: DateTime<Utc>) {
    for metadata in keys.values_mut() {
        metadata.is_active = metadata.key_id == key_id;
        if metadata.is_active {
            metadata.last_used = Some(now);
        }
    }
}

/// Collapse a loaded map with several active keys down to the most recently activated one
fn single_active(keys: &BTreeMap<KeyId, KeyMetadata>) -> Option<BTreeMap<KeyId, KeyMetadata>> {
    let active: Vec<&KeyMetadata> = keys.values().filter(|m| m.is_active).collect();
    if active.len() <= 1 {
        return None;
    }

    let keep = active
        .iter()
        .max_by_key(|m| (m.last_used, m.created_at))
        .map(|m| m.key_id.clone())?;
    warn!(
        active_keys = active.len(),
        keeping = %keep,
        "Key store has more than one active key, keeping the most recent"
    );

    let mut next = keys.clone();
    for metadata in next.values_mut() {
        metadata.is_active = metadata.key_id == keep;
    }
    Some(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::KeyDocument;
    use crate::secret::{DEFAULT_SECRET_LENGTH, MAX_SECRET_LENGTH};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn active_count(manager: &KeyManager) -> usize {
        manager.list_keys(true).iter().filter(|m| m.is_active).count()
    }

    fn aged_key(key_id: &str, days: i64, is_active: bool) -> KeyMetadata {
        KeyMetadata {
            key_id: key_id.to_string(),
            created_at: Utc::now() - Duration::days(days),
            algorithm: SigningAlgorithm::HS256,
            key_length: 64,
            is_active,
            rotation_count: 0,
            last_used: None,
        }
    }

    fn manager_with(keys: Vec<KeyMetadata>) -> KeyManager {
        let mut document = KeyDocument::default();
        for key in keys {
            document.keys.insert(key.key_id.clone(), key);
        }
        KeyManager::with_backend(Box::new(MemoryKeyStore::with_document(document)))
    }

    /// Backend whose saves start failing once `fail` is set
    struct FlakyBackend {
        inner: MemoryKeyStore,
        fail: Arc<AtomicBool>,
    }

    impl StoreBackend for FlakyBackend {
        fn load(&self) -> KeyResult<Option<KeyDocument>> {
            self.inner.load()
        }

        fn save(&self, document: &KeyDocument) -> KeyResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(KeyError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.save(document)
        }

        fn describe(&self) -> String {
            "flaky".to_string()
        }
    }

    #[test]
    fn test_generate_creates_inactive_key() {
        let mut manager = KeyManager::in_memory();
        let (secret, key_id) = manager.generate(SigningAlgorithm::HS256, 64).unwrap();

        assert_eq!(key_id, derive_key_id(&secret));
        let metadata = manager.key_metadata(&key_id).unwrap();
        assert!(!metadata.is_active);
        assert_eq!(metadata.key_length, 64);
        assert_eq!(metadata.rotation_count, 0);
        assert!(manager.active_key_id().is_none());
    }

    #[test]
    fn test_generate_rejects_short_length() {
        let mut manager = KeyManager::in_memory();
        let err = manager.generate(SigningAlgorithm::HS256, 8).unwrap_err();
        assert!(matches!(err, KeyError::WeakSecret(_)));
        assert_eq!(manager.status().total_keys, 0);
    }

    #[test]
    fn test_generate_rejects_length_beyond_policy() {
        let mut manager = KeyManager::in_memory();
        let err = manager
            .generate(SigningAlgorithm::HS256, MAX_SECRET_LENGTH + 32)
            .unwrap_err();
        assert!(matches!(err, KeyError::WeakSecret(_)));
        assert_eq!(manager.status().total_keys, 0);

        let (secret, _) = manager
            .generate(SigningAlgorithm::HS256, MAX_SECRET_LENGTH)
            .unwrap();
        assert_eq!(secret.len(), MAX_SECRET_LENGTH);
    }

    #[test]
    fn test_activate_leaves_exactly_one_active() {
        let mut manager = KeyManager::in_memory();
        let (_, first) = manager.generate(SigningAlgorithm::HS256, 64).unwrap();
        let (_, second) = manager.generate(SigningAlgorithm::HS256, 64).unwrap();

        manager.activate(&first).unwrap();
        assert_eq!(active_count(&manager), 1);
        assert_eq!(manager.active_key_id(), Some(first.as_str()));

        manager.activate(&second).unwrap();
        assert_eq!(active_count(&manager), 1);
        assert_eq!(manager.active_key_id(), Some(second.as_str()));
        assert!(manager.key_metadata(&second).unwrap().last_used.is_some());
    }

    #[test]
    fn test_activate_unknown_key() {
        let mut manager = KeyManager::in_memory();
        let err = manager.activate("ffffffffffffffff").unwrap_err();
        assert!(matches!(err, KeyError::NotFound(id) if id == "ffffffffffffffff"));
    }

    #[test]
    fn test_rotate_bumps_previous_rotation_count() {
        let mut manager = KeyManager::in_memory();
        let (_, first) = manager.generate(SigningAlgorithm::HS256, 64).unwrap();
        manager.activate(&first).unwrap();

        let (secret, second) = manager.rotate(SigningAlgorithm::HS256, 64).unwrap();
        assert_eq!(second, derive_key_id(&secret));
        assert_eq!(manager.active_key_id(), Some(second.as_str()));
        assert_eq!(manager.key_metadata(&first).unwrap().rotation_count, 1);
        assert_eq!(manager.key_metadata(&second).unwrap().rotation_count, 0);
        assert!(!manager.key_metadata(&first).unwrap().is_active);
        assert_eq!(active_count(&manager), 1);
    }

    #[test]
    fn test_rotate_without_active_key() {
        let mut manager = KeyManager::in_memory();
        let (_, key_id) = manager.rotate(SigningAlgorithm::HS256, 64).unwrap();
        assert_eq!(manager.active_key_id(), Some(key_id.as_str()));
        assert_eq!(manager.status().total_keys, 1);
    }

    #[test]
    fn test_cleanup_keeps_active_key_regardless_of_age() {
        let mut manager = manager_with(vec![
            aged_key("aaaaaaaaaaaaaaaa", 400, true),
            aged_key("bbbbbbbbbbbbbbbb", 45, false),
            aged_key("cccccccccccccccc", 5, false),
        ]);

        let outcome = manager.cleanup(30, false).unwrap();
        assert_eq!(outcome, CleanupOutcome::Removed(1));
        assert!(manager.contains_key("aaaaaaaaaaaaaaaa"));
        assert!(!manager.contains_key("bbbbbbbbbbbbbbbb"));
        assert!(manager.contains_key("cccccccccccccccc"));
    }

    #[test]
    fn test_cleanup_with_unbounded_age_selects_nothing() {
        let mut manager = manager_with(vec![
            aged_key("aaaaaaaaaaaaaaaa", 1, true),
            aged_key("bbbbbbbbbbbbbbbb", 4000, false),
        ]);

        assert_eq!(
            manager.cleanup(u32::MAX, true).unwrap(),
            CleanupOutcome::Preview(Vec::new())
        );
        assert_eq!(
            manager.cleanup(u32::MAX, false).unwrap(),
            CleanupOutcome::Removed(0)
        );
        assert_eq!(manager.status().total_keys, 2);
    }

    #[test]
    fn test_cleanup_dry_run_previews_only() {
        let mut manager = manager_with(vec![
            aged_key("aaaaaaaaaaaaaaaa", 1, true),
            aged_key("bbbbbbbbbbbbbbbb", 90, false),
        ]);

        let outcome = manager.cleanup(30, true).unwrap();
        assert_eq!(
            outcome,
            CleanupOutcome::Preview(vec!["bbbbbbbbbbbbbbbb".to_string()])
        );
        assert_eq!(manager.status().total_keys, 2);
    }

    #[test]
    fn test_status_reports_active_key() {
        let mut manager = KeyManager::in_memory();
        assert_eq!(manager.status().active_key_id, None);
        assert_eq!(manager.status().rotation_count, 0);

        manager.rotate(SigningAlgorithm::HS256, 64).unwrap();
        let (_, current) = manager.rotate(SigningAlgorithm::HS256, 64).unwrap();

        let status = manager.status();
        assert_eq!(status.active_key_id.as_deref(), Some(current.as_str()));
        assert_eq!(status.total_keys, 2);
        assert_eq!(status.inactive_keys, 1);
        assert!(status.last_used.is_some());
        assert!(status.active_key_age_hours().unwrap() >= 0.0);
    }

    #[test]
    fn test_failed_persist_leaves_state_untouched() {
        let fail = Arc::new(AtomicBool::new(false));
        let backend = FlakyBackend {
            inner: MemoryKeyStore::new(),
            fail: fail.clone(),
        };
        let mut manager = KeyManager::with_backend(Box::new(backend));
        let (_, first) = manager.generate(SigningAlgorithm::HS256, 64).unwrap();
        manager.activate(&first).unwrap();

        fail.store(true, Ordering::SeqCst);
        assert!(manager.rotate(SigningAlgorithm::HS256, 64).is_err());

        assert_eq!(manager.status().total_keys, 1);
        assert_eq!(manager.active_key_id(), Some(first.as_str()));
        assert_eq!(manager.key_metadata(&first).unwrap().rotation_count, 0);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys.json");

        let (first, second) = {
            let mut manager = KeyManager::open(&path);
            let (_, first) = manager.generate(SigningAlgorithm::HS256, 64).unwrap();
            manager.activate(&first).unwrap();
            let (_, second) = manager.rotate(SigningAlgorithm::HS256, DEFAULT_SECRET_LENGTH).unwrap();
            (first, second)
        };

        let manager = KeyManager::open(&path);
        assert_eq!(manager.active_key_id(), Some(second.as_str()));
        assert_eq!(manager.key_metadata(&first).unwrap().rotation_count, 1);
    }

    #[test]
    fn test_corrupt_store_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, "]]").unwrap();

        let mut manager = KeyManager::open(&path);
        assert_eq!(manager.status().total_keys, 0);

        manager.generate(SigningAlgorithm::HS256, 64).unwrap();
        assert_eq!(KeyManager::open(&path).status().total_keys, 1);
    }

    #[test]
    fn test_multiple_active_keys_collapsed_on_load() {
        let mut older = aged_key("aaaaaaaaaaaaaaaa", 10, true);
        older.last_used = Some(Utc::now() - Duration::days(10));
        let mut newer = aged_key("bbbbbbbbbbbbbbbb", 2, true);
        newer.last_used = Some(Utc::now() - Duration::days(2));

        let manager = manager_with(vec![older, newer]);
        assert_eq!(active_count(&manager), 1);
        assert_eq!(manager.active_key_id(), Some("bbbbbbbbbbbbbbbb"));
    }

    #[test]
    fn test_import_registers_existing_secret() {
        let mut manager = KeyManager::in_memory();
        let secret = generate_secret(64).unwrap();
        let key_id = manager.import(&secret, SigningAlgorithm::HS256).unwrap();
        assert_eq!(key_id, derive_key_id(&secret));
        assert_eq!(manager.import(&secret, SigningAlgorithm::HS256).unwrap(), key_id);
        assert_eq!(manager.status().total_keys, 1);

        assert!(manager.import("password", SigningAlgorithm::HS256).is_err());
    }

    #[test]
    fn test_rotation_plan() {
        let manager = KeyManager::in_memory();
        assert_eq!(manager.rotation_plan(30), RotationPlan::Initialize);

        let manager = manager_with(vec![aged_key("aaaaaaaaaaaaaaaa", 50, true)]);
        assert!(matches!(
            manager.rotation_plan(30),
            RotationPlan::Rotate { urgency: RotationUrgency::High, .. }
        ));

        let manager = manager_with(vec![aged_key("aaaaaaaaaaaaaaaa", 35, true)]);
        assert!(matches!(
            manager.rotation_plan(30),
            RotationPlan::Rotate { urgency: RotationUrgency::Medium, .. }
        ));

        let manager = manager_with(vec![aged_key("aaaaaaaaaaaaaaaa", 10, true)]);
        match manager.rotation_plan(30) {
            RotationPlan::Wait { days_until_rotation, urgency } => {
                assert_eq!(urgency, RotationUrgency::Low);
                assert!((days_until_rotation - 20.0).abs() < 0.01);
            }
            other => panic!("unexpected plan: {:?}", other),
        }
    }
}
