//! In-memory key map backed by a persistence backend
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


use crate::backend::{KeyDocument, StoreBackend};
use crate::error::KeyResult;
use crate::key_types::{KeyId, KeyMetadata};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Map of key id to metadata.
///
/// Loaded once when the store is opened and written back in full by
/// [`KeyStore::replace`]. Holds no business rules of its own.
pub struct KeyStore {
    backend: Box<dyn StoreBackend>,
    keys: BTreeMap<KeyId, KeyMetadata>,
}

impl KeyStore {
    /// Open a store over `backend`.
    ///
    /// A backend that fails to load (unreadable or corrupt document) yields
    /// an empty store; the failure is logged, never returned.
    pub fn open(backend: Box<dyn StoreBackend>) -> Self {
        let keys = match backend.load() {
            Ok(Some(document)) => document.keys,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!(
                    location = %backend.describe(),
                    error = %e,
                    "Failed to load key metadata, starting with an empty store"
                );
                BTreeMap::new()
            }
        };

        debug!(location = %backend.describe(), keys = keys.len(), "Key store opened");
        Self { backend, keys }
    }

    pub fn keys(&self) -> &BTreeMap<KeyId, KeyMetadata> {
        &self.keys
    }

    pub fn get(&self, key_id: &str) -> Option<&KeyMetadata> {
        self.keys.get(key_id)
    }

    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn location(&self) -> String {
        self.backend.describe()
    }

    /// Replace the full key map.
    ///
    /// `next` is persisted first and only adopted in memory once the write
    /// succeeded, so a failed save leaves the store unchanged.
    pub fn replace(&mut self, next: BTreeMap<KeyId, KeyMetadata>) -> KeyResult<()> {
        let document = KeyDocument { keys: next };
        self.backend.save(&document)?;
        self.keys = document.keys;
        Ok(())
    }

    /// Swap the in-memory map without persisting.
    ///
    /// Used when normalising a freshly loaded document; the next mutation writes it out.
    pub(crate) fn set_unpersisted(&mut self, keys: BTreeMap<KeyId, KeyMetadata>) {
        self.keys = keys;
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("location", &self.backend.describe())
            .field("keys", &self.keys.len())
            .finish()
    }
}
