//! Local JSON file key metadata storage
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
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key metadata document stored as a single JSON file.
///
/// The file is rewritten in full on every save: the new content goes to a
/// sibling temp file which is then renamed over the target, so readers see
/// either the old or the new document. Access from several processes at
/// once is not coordinated.
#[derive(Debug, Clone)]
pub struct LocalKeyStore {
    /// Path of the metadata document
    path: PathBuf,
}

impl LocalKeyStore {
    /// Create a store for the document at `path`; nothing is read or written yet
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl StoreBackend for LocalKeyStore {
    fn load(&self) -> KeyResult<Option<KeyDocument>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No key metadata file yet");
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        let document: KeyDocument = serde_json::from_str(&content)?;
        debug!(
            path = %self.path.display(),
            keys = document.keys.len(),
            "Loaded key metadata"
        );
        Ok(Some(document))
    }

    fn save(&self, document: &KeyDocument) -> KeyResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(document)?;
        let temp = self.temp_path();
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;

        debug!(
            path = %self.path.display(),
            keys = document.keys.len(),
            "Saved key metadata"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
