//! Persistence interface for the key metadata document
//!
//! The key store keeps the full key map in memory and hands the whole
//! document to a backend after every mutation. Backends:
//! - Local JSON file (`LocalKeyStore`)
//! - In-memory (`MemoryKeyStore`), for tests and ephemeral tooling
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


use crate::error::KeyResult;
use crate::key_types::{KeyId, KeyMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// On-disk shape: `{"keys": {<key_id>: {...}}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyDocument {
    #[serde(default)]
    pub keys: BTreeMap<KeyId, KeyMetadata>,
}

/// Trait for key metadata persistence backends
pub trait StoreBackend: Send + Sync {
    /// Load the stored document, `None` if nothing has been written yet
    fn load(&self) -> KeyResult<Option<KeyDocument>>;

    /// Replace the stored document in full
    fn save(&self, document: &KeyDocument) -> KeyResult<()>;

    /// Human-readable location, used in logs
    fn describe(&self) -> String;
}

/// Backend that keeps the document in process memory
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    document: Mutex<Option<KeyDocument>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing document
    pub fn with_document(document: KeyDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
        }
    }
}

impl StoreBackend for MemoryKeyStore {
    fn load(&self) -> KeyResult<Option<KeyDocument>> {
        let guard = self.document.lock().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }

    fn save(&self, document: &KeyDocument) -> KeyResult<()> {
        let mut guard = self.document.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Some(document.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
