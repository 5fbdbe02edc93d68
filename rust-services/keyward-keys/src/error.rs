//! Error types for key management
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


use crate::secret::WeakSecret;
use thiserror::Error;

/// Key management errors
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Key not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    WeakSecret(#[from] WeakSecret),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Key rotation error: {0}")]
    Rotation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for key operations
pub type KeyResult<T> = Result<T, KeyError>;
