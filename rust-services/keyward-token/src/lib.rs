//! Bearer token issuance and verification for keyward
//!
//! Tokens are compact JWTs (HS256 or RS256), optionally wrapped in a
//! `dir`/`A256GCM` JWE envelope. Verification tries the current key and,
//! while a rotation is in progress, the previous one.
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


pub mod claims;
pub mod codec;
pub mod error;
pub mod guard;
pub mod jwe;

pub use claims::Claims;
pub use codec::{IssuedToken, RotationStatus, TokenCodec};
pub use error::{InvalidKind, InvalidToken, TokenError, TokenResult};
pub use guard::{bearer_token, AuthFailure, Authenticator, Principal};
