//! Service integration helpers for sharing a key manager across call sites
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


use crate::manager::KeyManager;
use std::env;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Handle to a manager shared between the token codec and operator tooling
pub type SharedKeyManager = Arc<RwLock<KeyManager>>;

/// Environment variable naming the key metadata document
pub const KEY_STORAGE_PATH_ENV: &str = "JWT_KEY_STORAGE_PATH";

/// Default key metadata document
pub const DEFAULT_KEY_STORAGE_PATH: &str = ".jwt_keys.json";

/// Resolve the metadata path: explicit argument, then environment, then default
pub fn resolve_storage_path(storage_path: Option<&str>) -> PathBuf {
    storage_path
        .map(|p| p.to_string())
        .or_else(|| env::var(KEY_STORAGE_PATH_ENV).ok())
        .unwrap_or_else(|| DEFAULT_KEY_STORAGE_PATH.to_string())
        .into()
}

/// Initialize a key manager for a service
pub fn init_key_manager(storage_path: Option<&str>) -> SharedKeyManager {
    let path = resolve_storage_path(storage_path);
    info!(path = %path.display(), "Initializing key manager");
    Arc::new(RwLock::new(KeyManager::open(&path)))
}

/// Owner-held cell that constructs the key manager at most once.
///
/// The first call to [`KeyManagerCell::get_or_init`] builds the manager
/// while holding the cell's lock; concurrent and later callers receive the
/// same handle. Hold the cell in application state rather than a static.
#[derive(Default)]
pub struct KeyManagerCell {
    inner: Mutex<Option<SharedKeyManager>>,
}

impl KeyManagerCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the manager, building it from `storage_path` on first use.
    ///
    /// `storage_path` is ignored once the manager exists.
    pub fn get_or_init(&self, storage_path: Option<&str>) -> SharedKeyManager {
        self.get_or_init_with(|| init_key_manager(storage_path))
    }

    pub fn get_or_init_with<F>(&self, build: F) -> SharedKeyManager
    where
        F: FnOnce() -> SharedKeyManager,
    {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = guard.as_ref() {
            debug!("Reusing existing key manager");
            return existing.clone();
        }
        let manager = build();
        *guard = Some(manager.clone());
        manager
    }

    pub fn get(&self) -> Option<SharedKeyManager> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
