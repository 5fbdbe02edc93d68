//! Signing-secret management for keyward
//!
//! Provides secret strength validation, a file-backed key metadata store,
//! and the key manager that drives generation, activation, rotation and
//! cleanup of signing keys.
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


pub mod backend;
pub mod error;
pub mod key_store;
pub mod key_types;
pub mod local_store;
pub mod manager;
pub mod secret;
pub mod service_integration;

pub use backend::{KeyDocument, MemoryKeyStore, StoreBackend};
pub use error::{KeyError, KeyResult};
pub use key_store::KeyStore;
pub use key_types::{derive_key_id, KeyId, KeyMetadata, SigningAlgorithm};
pub use local_store::LocalKeyStore;
pub use manager::{CleanupOutcome, KeyManager, KeyStatus, RotationPlan, RotationUrgency};
pub use secret::{
    generate_secret, shannon_entropy, validate_secret, SecretViolation, WeakSecret,
    DEFAULT_SECRET_LENGTH, MAX_SECRET_LENGTH, MIN_SECRET_ENTROPY, MIN_SECRET_LENGTH,
};
pub use service_integration::{
    init_key_manager, resolve_storage_path, KeyManagerCell, SharedKeyManager,
    DEFAULT_KEY_STORAGE_PATH, KEY_STORAGE_PATH_ENV,
};
